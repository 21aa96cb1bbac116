//! Rust backend.
//!
//! Every named type becomes a `struct` or `enum` implementing the generated `Wire`
//! trait (`encode_into`, `encoded_len`, `decode`, plus a provided `encode`). Sized types
//! also get `BYTE_LENGTH` and `byte_length()`. The emitted module depends on `std` only.

use super::{Backend, CodeWriter, DriverCase, GeneratedSource, GenerationError};
use crate::ir::{DefKind, Definition, FieldDef, Scalar, Ty};
use crate::layout::{discriminant_width, Layout, LENGTH_PREFIX};
use crate::name::{Name, NameError};
use crate::registry::{Registry, SchemaError};
use crate::value::Value;

const BACKEND: &str = "rust";

/// Type names the generated module (or the std prelude it relies on) already uses.
const RESERVED_TYPES: &[&str] = &[
    "Wire", "DecodeError", "Self", "Vec", "String", "Option", "Result", "Box", "Some", "None",
    "Ok", "Err",
];

/// Keywords that cannot be used even as raw identifiers.
const NOT_RAW: &[&str] = &["self", "super", "crate", "Self"];

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where",
    "while", "abstract", "become", "box", "do", "final", "macro", "override", "priv", "try",
    "typeof", "unsized", "virtual", "yield",
];

const PRELUDE: &str = r#"// Generated by wiregen. Do not edit.
//
// Wire format: little-endian scalars, u32 count prefix for vectors and strings,
// struct fields in declaration order, variants as discriminant + member payload.

#![allow(dead_code, unused_mut, unused_variables, clippy::all)]

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof { needed: usize, available: usize },
    BadDiscriminant { type_name: &'static str, value: u32 },
    InvalidUtf8,
    ArrayLength,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnexpectedEof { needed, available } => {
                write!(f, "unexpected end of input: needed {needed} bytes, {available} available")
            }
            DecodeError::BadDiscriminant { type_name, value } => {
                write!(f, "{type_name}: bad discriminant {value}")
            }
            DecodeError::InvalidUtf8 => f.write_str("invalid UTF-8 in string"),
            DecodeError::ArrayLength => f.write_str("array length mismatch"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Codec contract implemented by every generated type.
pub trait Wire: Sized {
    fn encode_into(&self, out: &mut Vec<u8>);

    fn encoded_len(&self) -> usize;

    /// Decode from the front of `buf`; returns the value and the number of bytes consumed.
    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError>;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }
}

pub fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], DecodeError> {
    let available = buf.len() - *pos;
    if available < len {
        return Err(DecodeError::UnexpectedEof { needed: len, available });
    }
    let bytes = &buf[*pos..*pos + len];
    *pos += len;
    Ok(bytes)
}

pub fn get<T: Wire>(buf: &[u8], pos: &mut usize) -> Result<T, DecodeError> {
    let (value, used) = T::decode(&buf[*pos..])?;
    *pos += used;
    Ok(value)
}

pub fn get_len(buf: &[u8], pos: &mut usize) -> Result<usize, DecodeError> {
    Ok(get_u32(buf, pos)? as usize)
}

pub fn put_len(out: &mut Vec<u8>, len: usize) {
    debug_assert!(len <= u32::MAX as usize, "length does not fit the u32 prefix");
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

macro_rules! scalar_readers {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(buf: &[u8], pos: &mut usize) -> Result<$ty, DecodeError> {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(take(buf, pos, std::mem::size_of::<$ty>())?);
                Ok(<$ty>::from_le_bytes(raw))
            }
        )*
    };
}

scalar_readers!(
    get_u8: u8,
    get_u16: u16,
    get_u32: u32,
    get_u64: u64,
    get_i8: i8,
    get_i16: i16,
    get_i32: i32,
    get_i64: i64,
    get_f32: f32,
    get_f64: f64,
);"#;

const DRIVER_CHECK: &str = r#"fn check<T: Wire + PartialEq + std::fmt::Debug>(
    label: &str,
    index: usize,
    value: T,
    expected: Option<&[u8]>,
    fixed: Option<usize>,
) -> bool {
    let mut problems: Vec<String> = Vec::new();
    let encoded = value.encode();
    if encoded.len() != value.encoded_len() {
        problems.push(format!(
            "encoded_len() is {} but encode() wrote {} bytes",
            value.encoded_len(),
            encoded.len()
        ));
    }
    if let Some(size) = fixed {
        if encoded.len() != size {
            problems.push(format!("fixed length is {} but encode() wrote {} bytes", size, encoded.len()));
        }
    }
    if let Some(expected) = expected {
        if encoded.as_slice() != expected {
            problems.push(format!("encoded {:02x?}, expected {:02x?}", encoded, expected));
        }
        match T::decode(expected) {
            Ok((decoded, used)) => {
                if decoded != value {
                    problems.push(format!("decode(expected) gave {:?}", decoded));
                }
                if used != expected.len() {
                    problems.push(format!("decode(expected) consumed {} of {} bytes", used, expected.len()));
                }
            }
            Err(err) => problems.push(format!("decode(expected) failed: {}", err)),
        }
    }
    match T::decode(&encoded) {
        Ok((decoded, used)) => {
            if decoded != value {
                problems.push(format!("round trip gave {:?}", decoded));
            }
            if used != encoded.len() {
                problems.push(format!("round trip consumed {} of {} bytes", used, encoded.len()));
            }
        }
        Err(err) => problems.push(format!("round trip decode failed: {}", err)),
    }
    if problems.is_empty() {
        println!("PASS {} {}", label, index);
        true
    } else {
        println!("FAIL {} {} {}", label, index, problems.join("; "));
        false
    }
}"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        RustBackend
    }

    fn unrepresentable(ty: &Name, reason: impl Into<String>) -> GenerationError {
        GenerationError::Unrepresentable {
            backend: BACKEND,
            ty: ty.key(),
            reason: reason.into(),
        }
    }

    pub fn type_ident(&self, name: &Name) -> Result<String, GenerationError> {
        let ident = name.upper_camel();
        if RESERVED_TYPES.contains(&ident.as_str()) {
            return Err(Self::unrepresentable(
                name,
                format!("type name `{ident}` collides with a name the generated module uses"),
            ));
        }
        Ok(ident)
    }

    pub fn field_ident(&self, owner: &Name, field: &Name) -> Result<String, GenerationError> {
        let ident = field.snake();
        if NOT_RAW.contains(&ident.as_str()) {
            return Err(Self::unrepresentable(
                owner,
                format!("field `{ident}` is a keyword that cannot be a raw identifier"),
            ));
        }
        if KEYWORDS.contains(&ident.as_str()) {
            return Ok(format!("r#{ident}"));
        }
        Ok(ident)
    }

    fn case_ident(&self, owner: &Name, member: &Name) -> Result<String, GenerationError> {
        let ident = member.upper_camel();
        if NOT_RAW.contains(&ident.as_str()) {
            return Err(Self::unrepresentable(
                owner,
                format!("member `{ident}` cannot name an enum case"),
            ));
        }
        Ok(ident)
    }

    pub fn rust_type(&self, ty: &Ty) -> String {
        match ty {
            Ty::Scalar(s) => s.as_str().to_string(),
            Ty::Array(elem, len) => format!("[{}; {}]", self.rust_type(elem), len),
            Ty::Vector(elem) => format!("Vec<{}>", self.rust_type(elem)),
            Ty::String => "String".to_string(),
            Ty::Named(name) => name.upper_camel(),
        }
    }

    fn emit_struct(
        &self,
        def: &Definition,
        ident: &str,
        fields: &[FieldDef],
        registry: &Registry,
        w: &mut CodeWriter,
    ) -> Result<(), GenerationError> {
        let idents = fields
            .iter()
            .map(|f| self.field_ident(&def.name, &f.name))
            .collect::<Result<Vec<_>, _>>()?;

        emit_doc(def, w);
        w.line("#[derive(Clone, Debug, PartialEq)]");
        if fields.is_empty() {
            w.line(format!("pub struct {ident} {{}}"));
        } else {
            w.open(format!("pub struct {ident} {{"));
            for (f, field) in fields.iter().zip(&idents) {
                w.line(format!("pub {field}: {},", self.rust_type(&f.ty)));
            }
            w.close("}");
        }
        emit_sized_consts(def, ident, w);

        w.blank();
        w.open(format!("impl Wire for {ident} {{"));

        w.open("fn encode_into(&self, out: &mut Vec<u8>) {");
        w.reset_locals();
        for (f, field) in fields.iter().zip(&idents) {
            self.emit_encode(w, &f.ty, &format!("self.{field}"));
        }
        w.close("}");
        w.blank();

        w.open("fn encoded_len(&self) -> usize {");
        w.reset_locals();
        if def.is_sized() {
            w.line("Self::BYTE_LENGTH");
        } else {
            let mut fixed = 0usize;
            let mut terms = Vec::new();
            for (f, field) in fields.iter().zip(&idents) {
                match registry.layout(&f.ty)? {
                    Layout::Sized(n) => fixed += n,
                    Layout::Unsized => terms.push(self.len_expr(w, &f.ty, &format!("self.{field}"), registry)?),
                }
            }
            terms.insert(0, fixed.to_string());
            w.line(terms.join(" + "));
        }
        w.close("}");
        w.blank();

        w.open("fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {");
        w.reset_locals();
        w.line("let mut pos = 0usize;");
        for f in fields {
            let expr = self.emit_decode(w, &f.ty, registry)?;
            w.line(format!("let field_{} = {expr};", f.name.snake()));
        }
        let inits: Vec<String> = fields
            .iter()
            .zip(&idents)
            .map(|(f, field)| format!("{field}: field_{}", f.name.snake()))
            .collect();
        if inits.is_empty() {
            w.line("Ok((Self {}, pos))");
        } else {
            w.line(format!("Ok((Self {{ {} }}, pos))", inits.join(", ")));
        }
        w.close("}");

        w.close("}");
        Ok(())
    }

    fn emit_variant(
        &self,
        def: &Definition,
        ident: &str,
        members: &[FieldDef],
        registry: &Registry,
        w: &mut CodeWriter,
    ) -> Result<(), GenerationError> {
        let cases = members
            .iter()
            .map(|m| self.case_ident(&def.name, &m.name))
            .collect::<Result<Vec<_>, _>>()?;
        let tag = match discriminant_width(members.len()) {
            1 => "u8",
            2 => "u16",
            _ => "u32",
        };

        emit_doc(def, w);
        w.line("#[derive(Clone, Debug, PartialEq)]");
        w.open(format!("pub enum {ident} {{"));
        for (m, case) in members.iter().zip(&cases) {
            w.line(format!("{case}({}),", self.rust_type(&m.ty)));
        }
        w.close("}");
        emit_sized_consts(def, ident, w);

        w.blank();
        w.open(format!("impl Wire for {ident} {{"));

        w.open("fn encode_into(&self, out: &mut Vec<u8>) {");
        w.reset_locals();
        if def.is_sized() {
            w.line("let start = out.len();");
        }
        w.open("match self {");
        for (i, (m, case)) in members.iter().zip(&cases).enumerate() {
            w.open(format!("Self::{case}(payload) => {{"));
            w.line(format!("out.extend_from_slice(&{i}{tag}.to_le_bytes());"));
            self.emit_encode(w, &m.ty, "payload");
            w.close("}");
        }
        w.close("}");
        if def.is_sized() {
            w.line("out.resize(start + Self::BYTE_LENGTH, 0);");
        }
        w.close("}");
        w.blank();

        w.open("fn encoded_len(&self) -> usize {");
        w.reset_locals();
        if def.is_sized() {
            w.line("Self::BYTE_LENGTH");
        } else {
            let width = discriminant_width(members.len());
            w.open("match self {");
            for (m, case) in members.iter().zip(&cases) {
                let len = self.len_expr(w, &m.ty, "payload", registry)?;
                w.line(format!("Self::{case}(payload) => {width} + {len},"));
            }
            w.close("}");
        }
        w.close("}");
        w.blank();

        w.open("fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {");
        w.reset_locals();
        if def.is_sized() {
            w.open("if buf.len() < Self::BYTE_LENGTH {");
            w.line("return Err(DecodeError::UnexpectedEof { needed: Self::BYTE_LENGTH, available: buf.len() });");
            w.close("}");
        }
        w.line("let mut pos = 0usize;");
        w.line(format!("let tag = get_{tag}(buf, &mut pos)?;"));
        w.open("let value = match tag {");
        for (i, (m, case)) in members.iter().zip(&cases).enumerate() {
            w.open(format!("{i} => {{"));
            let expr = self.emit_decode(w, &m.ty, registry)?;
            w.line(format!("Self::{case}({expr})"));
            w.close("}");
        }
        w.open("other => {");
        w.line(format!(
            "return Err(DecodeError::BadDiscriminant {{ type_name: {:?}, value: other as u32 }});",
            def.name.key()
        ));
        w.close("}");
        w.close("};");
        if def.is_sized() {
            // Padding is skipped, never inspected.
            w.line("pos = Self::BYTE_LENGTH;");
        }
        w.line("Ok((value, pos))");
        w.close("}");

        w.close("}");
        Ok(())
    }

    /// Statements appending the encoding of `expr` (a place or a reference) to `out`.
    fn emit_encode(&self, w: &mut CodeWriter, ty: &Ty, expr: &str) {
        match ty {
            Ty::Scalar(_) => w.line(format!("out.extend_from_slice(&{expr}.to_le_bytes());")),
            Ty::String => {
                w.line(format!("put_len(out, {expr}.len());"));
                w.line(format!("out.extend_from_slice({expr}.as_bytes());"));
            }
            Ty::Named(_) => w.line(format!("{expr}.encode_into(out);")),
            Ty::Array(elem, _) | Ty::Vector(elem) => {
                if matches!(ty, Ty::Vector(_)) {
                    w.line(format!("put_len(out, {expr}.len());"));
                }
                if **elem == Ty::Scalar(Scalar::U8) {
                    w.line(format!("out.extend_from_slice(&{expr}[..]);"));
                    return;
                }
                let item = w.fresh("item");
                w.open(format!("for {item} in {expr}.iter() {{"));
                self.emit_encode(w, elem, &item);
                w.close("}");
            }
        }
    }

    /// Emit the statements decoding one `ty` at `buf[pos..]`; returns the value expression.
    fn emit_decode(&self, w: &mut CodeWriter, ty: &Ty, registry: &Registry) -> Result<String, GenerationError> {
        Ok(match ty {
            Ty::Scalar(s) => format!("get_{}(buf, &mut pos)?", s.as_str()),
            Ty::Named(name) => format!("get::<{}>(buf, &mut pos)?", self.type_ident(name)?),
            Ty::String => {
                let len = w.fresh("len");
                let text = w.fresh("text");
                w.line(format!("let {len} = get_len(buf, &mut pos)?;"));
                w.line(format!(
                    "let {text} = String::from_utf8(take(buf, &mut pos, {len})?.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?;"
                ));
                text
            }
            Ty::Array(elem, len) => {
                let array = w.fresh("array");
                if **elem == Ty::Scalar(Scalar::U8) {
                    w.line(format!("let mut {array} = [0u8; {len}];"));
                    w.line(format!("{array}.copy_from_slice(take(buf, &mut pos, {len})?);"));
                    return Ok(array);
                }
                let items = w.fresh("items");
                w.line(format!("let mut {items} = Vec::with_capacity({len});"));
                w.open(format!("for _ in 0..{len} {{"));
                let value = self.emit_decode(w, elem, registry)?;
                w.line(format!("{items}.push({value});"));
                w.close("}");
                w.line(format!(
                    "let {array}: [{}; {len}] = {items}.try_into().map_err(|_| DecodeError::ArrayLength)?;",
                    self.rust_type(elem)
                ));
                array
            }
            Ty::Vector(elem) => {
                let count = w.fresh("count");
                let items = w.fresh("items");
                w.line(format!("let {count} = get_len(buf, &mut pos)?;"));
                if **elem == Ty::Scalar(Scalar::U8) {
                    w.line(format!("let {items} = take(buf, &mut pos, {count})?.to_vec();"));
                    return Ok(items);
                }
                w.line(format!(
                    "let mut {items}: Vec<{}> = Vec::with_capacity({count}.min(buf.len() - pos));",
                    self.rust_type(elem)
                ));
                w.open(format!("for _ in 0..{count} {{"));
                let value = self.emit_decode(w, elem, registry)?;
                w.line(format!("{items}.push({value});"));
                w.close("}");
                items
            }
        })
    }

    /// Expression for the encoded length of `expr`.
    fn len_expr(
        &self,
        w: &mut CodeWriter,
        ty: &Ty,
        expr: &str,
        registry: &Registry,
    ) -> Result<String, GenerationError> {
        if let Layout::Sized(n) = registry.layout(ty)? {
            return Ok(n.to_string());
        }
        Ok(match ty {
            Ty::Scalar(s) => s.size().to_string(),
            Ty::String => format!("{LENGTH_PREFIX} + {expr}.len()"),
            Ty::Named(_) => format!("{expr}.encoded_len()"),
            Ty::Vector(elem) => match registry.layout(elem)? {
                Layout::Sized(1) => format!("{LENGTH_PREFIX} + {expr}.len()"),
                Layout::Sized(k) => format!("{LENGTH_PREFIX} + {expr}.len() * {k}"),
                Layout::Unsized => {
                    let item = w.fresh("item");
                    let inner = self.len_expr(w, elem, &item, registry)?;
                    format!("{LENGTH_PREFIX} + {expr}.iter().map(|{item}| {inner}).sum::<usize>()")
                }
            },
            Ty::Array(elem, _) => {
                let item = w.fresh("item");
                let inner = self.len_expr(w, elem, &item, registry)?;
                format!("{expr}.iter().map(|{item}| {inner}).sum::<usize>()")
            }
        })
    }

    fn literal_error(ty: &Ty, reason: impl Into<String>) -> GenerationError {
        GenerationError::Literal {
            backend: BACKEND,
            ty: ty.to_string(),
            reason: reason.into(),
        }
    }

    fn scalar_literal(&self, ty: &Ty, s: Scalar, v: &Value) -> Result<String, GenerationError> {
        Ok(match (s, v) {
            (Scalar::U8, Value::U8(x)) => format!("{x}u8"),
            (Scalar::U16, Value::U16(x)) => format!("{x}u16"),
            (Scalar::U32, Value::U32(x)) => format!("{x}u32"),
            (Scalar::U64, Value::U64(x)) => format!("{x}u64"),
            (Scalar::I8, Value::I8(x)) => signed_literal(*x as i64, *x == i8::MIN, "i8"),
            (Scalar::I16, Value::I16(x)) => signed_literal(*x as i64, *x == i16::MIN, "i16"),
            (Scalar::I32, Value::I32(x)) => signed_literal(*x as i64, *x == i32::MIN, "i32"),
            (Scalar::I64, Value::I64(x)) => signed_literal(*x, *x == i64::MIN, "i64"),
            (Scalar::F32, Value::F32(x)) => format!("f32::from_bits({:#010x})", x.to_bits()),
            (Scalar::F64, Value::F64(x)) => format!("f64::from_bits({:#018x})", x.to_bits()),
            (s, other) => {
                return Err(Self::literal_error(
                    ty,
                    format!("expected {}, got {}", s.as_str(), other.kind()),
                ))
            }
        })
    }
}

impl Backend for RustBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn file_extension(&self) -> &'static str {
        "rs"
    }

    fn prelude(&self, w: &mut CodeWriter) {
        for line in PRELUDE.lines() {
            w.line(line);
        }
    }

    fn definition(
        &self,
        def: &Definition,
        registry: &Registry,
        w: &mut CodeWriter,
    ) -> Result<(), GenerationError> {
        let ident = self.type_ident(&def.name)?;
        match &def.kind {
            DefKind::Struct { fields } => self.emit_struct(def, &ident, fields, registry, w),
            DefKind::Variant { members, .. } => self.emit_variant(def, &ident, members, registry, w),
        }
    }

    fn literal(&self, ty: &Ty, value: &Value, registry: &Registry) -> Result<String, GenerationError> {
        match (ty, value) {
            (Ty::Scalar(s), v) => self.scalar_literal(ty, *s, v),
            (Ty::String, Value::Str(s)) => Ok(format!("String::from({s:?})")),
            (Ty::Array(elem, len), Value::List(items)) => {
                if items.len() != *len {
                    return Err(Self::literal_error(
                        ty,
                        format!("array needs {len} elements, got {}", items.len()),
                    ));
                }
                let parts = items
                    .iter()
                    .map(|item| self.literal(elem, item, registry))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("[{}]", parts.join(", ")))
            }
            (Ty::Vector(elem), Value::List(items)) => {
                let parts = items
                    .iter()
                    .map(|item| self.literal(elem, item, registry))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("vec![{}]", parts.join(", ")))
            }
            (Ty::Named(name), v) => {
                let def = registry.resolve(name)?;
                let ident = self.type_ident(name)?;
                match (&def.kind, v) {
                    (DefKind::Struct { fields }, Value::Struct(map)) => {
                        if let Some(extra) = map.keys().find(|k| !fields.iter().any(|f| &f.name.key() == *k)) {
                            return Err(Self::literal_error(ty, format!("unknown field {extra}")));
                        }
                        let mut parts = Vec::with_capacity(fields.len());
                        for f in fields {
                            let fv = map
                                .get(&f.name.key())
                                .ok_or_else(|| Self::literal_error(ty, format!("missing field {}", f.name)))?;
                            parts.push(format!(
                                "{}: {}",
                                self.field_ident(name, &f.name)?,
                                self.literal(&f.ty, fv, registry)?
                            ));
                        }
                        if parts.is_empty() {
                            Ok(format!("{ident} {{}}"))
                        } else {
                            Ok(format!("{ident} {{ {} }}", parts.join(", ")))
                        }
                    }
                    (DefKind::Variant { members, .. }, Value::Variant(member, payload)) => {
                        let m = members
                            .iter()
                            .find(|m| &m.name.key() == member)
                            .ok_or_else(|| Self::literal_error(ty, format!("unknown member {member}")))?;
                        Ok(format!(
                            "{ident}::{}({})",
                            self.case_ident(name, &m.name)?,
                            self.literal(&m.ty, payload, registry)?
                        ))
                    }
                    (_, other) => Err(Self::literal_error(ty, format!("got {} value", other.kind()))),
                }
            }
            (_, other) => Err(Self::literal_error(ty, format!("got {} value", other.kind()))),
        }
    }

    fn driver(
        &self,
        module: &str,
        cases: &[DriverCase<'_>],
        registry: &Registry,
    ) -> Result<GeneratedSource, GenerationError> {
        let mut w = CodeWriter::new();
        w.line("// Verification driver generated by wiregen. Do not edit.");
        w.blank();
        w.line(format!("mod {module};"));
        w.blank();
        w.line("#[allow(unused_imports)]");
        w.line(format!("use {module}::*;"));

        // Anonymous roots are checked through a one-field wrapper; a struct with a
        // single field has exactly that field's wire format.
        let mut wrappers = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            if matches!(case.ty, Ty::Named(_)) {
                wrappers.push(None);
                continue;
            }
            let def = wrapper_definition(i, case.ty, registry)?;
            w.blank();
            self.definition(&def, registry, &mut w)?;
            wrappers.push(Some(self.type_ident(&def.name)?));
        }

        w.blank();
        for line in DRIVER_CHECK.lines() {
            w.line(line);
        }
        w.blank();
        w.open("fn main() {");
        w.line("let mut failed = 0usize;");
        for (case, wrapper) in cases.iter().zip(&wrappers) {
            let fixed = match registry.layout(case.ty)? {
                Layout::Sized(n) => format!("Some({n})"),
                Layout::Unsized => "None".to_string(),
            };
            for v in &case.vectors {
                let literal = self.literal(case.ty, v.value, registry)?;
                let value = match wrapper {
                    Some(wrapper) => format!("{wrapper} {{ value: {literal} }}"),
                    None => literal,
                };
                let expected = match v.expected {
                    Some(bytes) => format!("Some(&{}[..])", bytes_literal(bytes)),
                    None => "None".to_string(),
                };
                w.open(format!(
                    "if !check({:?}, {}, {value}, {expected}, {fixed}) {{",
                    case.label, v.index
                ));
                w.line("failed += 1;");
                w.close("}");
            }
        }
        w.line("println!(\"DONE {}\", failed);");
        w.open("if failed > 0 {");
        w.line("std::process::exit(1);");
        w.close("}");
        w.close("}");

        Ok(GeneratedSource {
            file_name: "main.rs".to_string(),
            contents: w.finish(),
        })
    }
}

fn emit_doc(def: &Definition, w: &mut CodeWriter) {
    match def.layout {
        Layout::Sized(n) => w.line(format!("/// Wire type `{}`: sized, {n} bytes.", def.name)),
        Layout::Unsized => w.line(format!("/// Wire type `{}`: unsized.", def.name)),
    }
}

fn emit_sized_consts(def: &Definition, ident: &str, w: &mut CodeWriter) {
    if let Layout::Sized(n) = def.layout {
        w.blank();
        w.open(format!("impl {ident} {{"));
        w.line(format!("pub const BYTE_LENGTH: usize = {n};"));
        w.blank();
        w.open("pub const fn byte_length() -> usize {");
        w.line("Self::BYTE_LENGTH");
        w.close("}");
        w.close("}");
    }
}

fn signed_literal(value: i64, is_min: bool, ty: &str) -> String {
    if is_min {
        format!("{ty}::MIN")
    } else {
        format!("{value}{ty}")
    }
}

fn bytes_literal(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "[0u8; 0]".to_string();
    }
    let parts: Vec<String> = bytes.iter().map(|b| format!("{b:#04x}")).collect();
    format!("[{}u8{}]", parts[0], parts[1..].iter().map(|p| format!(", {p}")).collect::<String>())
}

fn wrapper_definition(index: usize, ty: &Ty, registry: &Registry) -> Result<Definition, GenerationError> {
    let wrap = |e: NameError| GenerationError::Schema(SchemaError::Name(e));
    let name = Name::new(["harness".to_string(), format!("root{index}")]).map_err(wrap)?;
    if registry.contains(&name) {
        return Err(RustBackend::unrepresentable(
            &name,
            "type name is taken by the driver's wrapper for an anonymous root",
        ));
    }
    let value = Name::new(["value"]).map_err(wrap)?;
    Ok(Definition {
        name,
        kind: DefKind::Struct {
            fields: vec![FieldDef {
                name: value,
                ty: ty.clone(),
            }],
        },
        layout: registry.layout(ty)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{Generator, GeneratorConfig};
    use crate::schema::{Field, Sizedness, Type};

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn generate(reg: &Registry) -> String {
        Generator::new(RustBackend, GeneratorConfig::default())
            .generate(&reg.full_closure())
            .unwrap()
            .contents
    }

    #[test]
    fn sized_struct_gets_byte_length() {
        let mut reg = Registry::new();
        reg.register(Type::structure(
            n("pair"),
            vec![Field::new(n("a"), Type::u8()), Field::new(n("b"), Type::u16())],
        ))
        .unwrap();
        let src = generate(&reg);
        assert!(src.contains("pub struct Pair {"));
        assert!(src.contains("pub const BYTE_LENGTH: usize = 3;"));
        assert!(src.contains("out.extend_from_slice(&self.b.to_le_bytes());"));
        assert!(src.contains("let field_b = get_u16(buf, &mut pos)?;"));
        assert!(src.contains("Ok((Self { a: field_a, b: field_b }, pos))"));
    }

    #[test]
    fn keyword_fields_become_raw_identifiers() {
        let mut reg = Registry::new();
        reg.register(Type::structure(n("msg"), vec![Field::new(n("type"), Type::u8())]))
            .unwrap();
        let src = generate(&reg);
        assert!(src.contains("pub r#type: u8,"));
        assert!(src.contains("r#type: field_type"));
    }

    #[test]
    fn unrepresentable_identifiers_are_generation_errors() {
        let mut reg = Registry::new();
        reg.register(Type::structure(n("msg"), vec![Field::new(n("self"), Type::u8())]))
            .unwrap();
        let err = Generator::new(RustBackend, GeneratorConfig::default())
            .generate(&reg.full_closure())
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unrepresentable { backend: "rust", ref ty, .. } if ty == "msg"));

        let mut reg = Registry::new();
        reg.register(Type::structure(n("string"), vec![])).unwrap();
        let err = Generator::new(RustBackend, GeneratorConfig::default())
            .generate(&reg.full_closure())
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unrepresentable { ref ty, .. } if ty == "string"));
    }

    #[test]
    fn sized_variant_pads_and_skips_padding() {
        let mut reg = Registry::new();
        let unit = reg.register(Type::structure(n("unit"), vec![])).unwrap();
        reg.register(Type::variant(
            n("choice"),
            vec![Field::new(n("empty"), unit), Field::new(n("value"), Type::i32())],
            Sizedness::Sized,
        ))
        .unwrap();
        let src = generate(&reg);
        assert!(src.contains("Empty(Unit),"));
        assert!(src.contains("out.extend_from_slice(&1u8.to_le_bytes());"));
        assert!(src.contains("out.resize(start + Self::BYTE_LENGTH, 0);"));
        assert!(src.contains("pos = Self::BYTE_LENGTH;"));
        assert!(src.contains("Self::Empty(get::<Unit>(buf, &mut pos)?)"));
    }

    #[test]
    fn literals_render_bit_exact() {
        let reg = Registry::new();
        let b = RustBackend;
        let f = b
            .literal(&Ty::Scalar(Scalar::F32), &Value::F32(1.5), &reg)
            .unwrap();
        assert_eq!(f, "f32::from_bits(0x3fc00000)");
        let min = b
            .literal(&Ty::Scalar(Scalar::I16), &Value::I16(i16::MIN), &reg)
            .unwrap();
        assert_eq!(min, "i16::MIN");
        let v = b
            .literal(
                &Ty::Vector(Box::new(Ty::Scalar(Scalar::I32))),
                &Value::list([Value::I32(7), Value::I32(-1)]),
                &reg,
            )
            .unwrap();
        assert_eq!(v, "vec![7i32, -1i32]");
        assert!(b.literal(&Ty::String, &Value::U8(1), &reg).is_err());
    }

    #[test]
    fn wrapper_name_taken_by_schema_type_is_rejected() {
        let mut reg = Registry::new();
        reg.register(Type::structure(n("harness_root0"), vec![])).unwrap();
        let ty = Ty::Vector(Box::new(Ty::Scalar(Scalar::I32)));
        let cases = [crate::generator::DriverCase {
            label: ty.to_string(),
            ty: &ty,
            vectors: vec![],
        }];
        let err = RustBackend.driver("proto", &cases, &reg).unwrap_err();
        assert!(matches!(err, GenerationError::Unrepresentable { ref ty, .. } if ty == "harness_root0"));

        // Named roots need no wrapper, so the same schema is fine for them.
        let named = Ty::Named(n("harness_root0"));
        let cases = [crate::generator::DriverCase {
            label: "harness_root0".to_string(),
            ty: &named,
            vectors: vec![],
        }];
        assert!(RustBackend.driver("proto", &cases, &reg).is_ok());
    }

    #[test]
    fn scalar_readers_size_the_read_from_the_type() {
        let src = generate(&Registry::new());
        assert!(src.contains("raw.copy_from_slice(take(buf, pos, std::mem::size_of::<$ty>())?);"));
        assert!(!src.contains("raw.len()"));
    }

    #[test]
    fn expected_bytes_literal_is_typed() {
        assert_eq!(bytes_literal(&[1, 0x2c, 1]), "[0x01u8, 0x2c, 0x01]");
        assert_eq!(bytes_literal(&[]), "[0u8; 0]");
    }
}
