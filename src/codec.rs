//! Reference codec: encodes and decodes [`Value`]s by interpreting registered types.
//!
//! This is the wire format the generated code must match byte for byte:
//! little-endian scalars, `u32` count prefix for vectors and strings, struct fields
//! back-to-back in declaration order, and variants as a discriminant followed by the
//! member payload (zero-padded to the widest member when the variant is sized).
//! The verification harness uses it to produce expected bytes for test vectors.

use crate::ir::{DefKind, Definition, FieldDef, Scalar, Ty};
use crate::layout::{discriminant_width, Layout};
use crate::name::Name;
use crate::registry::Registry;
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    #[error("{ty}: expected {expected} value, got {found}")]
    Mismatch {
        ty: String,
        expected: String,
        found: &'static str,
    },
    #[error("Unknown type: {0}")]
    UnknownType(String),
    #[error("{ty}: missing field {field}")]
    MissingField { ty: String, field: String },
    #[error("{ty}: unknown field {field}")]
    UnknownField { ty: String, field: String },
    #[error("{ty}: unknown member {member}")]
    UnknownMember { ty: String, member: String },
    #[error("{ty}: array needs {expected} elements, got {found}")]
    ArrayLength {
        ty: String,
        expected: usize,
        found: usize,
    },
    #[error("{ty}: bad discriminant {value}")]
    BadDiscriminant { ty: String, value: u32 },
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Length {0} does not fit the u32 length prefix")]
    TooLong(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct Codec<'r> {
    registry: &'r Registry,
}

impl<'r> Codec<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Codec { registry }
    }

    pub fn encode(&self, ty: &Ty, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode_value(&mut out, ty, value)?;
        Ok(out)
    }

    pub fn encode_named(&self, name: &Name, value: &Value) -> Result<Vec<u8>, CodecError> {
        self.encode(&Ty::Named(name.clone()), value)
    }

    /// Decode one value from the front of `bytes`; returns the value and bytes consumed.
    pub fn decode(&self, ty: &Ty, bytes: &[u8]) -> Result<(Value, usize), CodecError> {
        let mut cursor = Cursor::new(bytes);
        let value = self.decode_value(&mut cursor, ty)?;
        Ok((value, cursor.position() as usize))
    }

    pub fn decode_named(&self, name: &Name, bytes: &[u8]) -> Result<(Value, usize), CodecError> {
        self.decode(&Ty::Named(name.clone()), bytes)
    }

    fn definition(&self, name: &Name) -> Result<&'r Definition, CodecError> {
        self.registry
            .get(&name.key())
            .ok_or_else(|| CodecError::UnknownType(name.key()))
    }

    fn encode_value(&self, w: &mut Vec<u8>, ty: &Ty, v: &Value) -> Result<(), CodecError> {
        match ty {
            Ty::Scalar(s) => self.encode_scalar(w, *s, v),
            Ty::String => match v {
                Value::Str(s) => {
                    write_len(w, s.len())?;
                    w.extend_from_slice(s.as_bytes());
                    Ok(())
                }
                other => Err(mismatch(ty, "string", other)),
            },
            Ty::Array(elem, len) => {
                let items = v.as_list().ok_or_else(|| mismatch(ty, "list", v))?;
                if items.len() != *len {
                    return Err(CodecError::ArrayLength {
                        ty: ty.to_string(),
                        expected: *len,
                        found: items.len(),
                    });
                }
                for item in items {
                    self.encode_value(w, elem, item)?;
                }
                Ok(())
            }
            Ty::Vector(elem) => {
                let items = v.as_list().ok_or_else(|| mismatch(ty, "list", v))?;
                write_len(w, items.len())?;
                for item in items {
                    self.encode_value(w, elem, item)?;
                }
                Ok(())
            }
            Ty::Named(name) => {
                let def = self.definition(name)?;
                self.encode_definition(w, def, v)
            }
        }
    }

    fn encode_scalar(&self, w: &mut Vec<u8>, s: Scalar, v: &Value) -> Result<(), CodecError> {
        match (s, v) {
            (Scalar::U8, Value::U8(x)) => w.write_u8(*x)?,
            (Scalar::U16, Value::U16(x)) => w.write_u16::<LittleEndian>(*x)?,
            (Scalar::U32, Value::U32(x)) => w.write_u32::<LittleEndian>(*x)?,
            (Scalar::U64, Value::U64(x)) => w.write_u64::<LittleEndian>(*x)?,
            (Scalar::I8, Value::I8(x)) => w.write_i8(*x)?,
            (Scalar::I16, Value::I16(x)) => w.write_i16::<LittleEndian>(*x)?,
            (Scalar::I32, Value::I32(x)) => w.write_i32::<LittleEndian>(*x)?,
            (Scalar::I64, Value::I64(x)) => w.write_i64::<LittleEndian>(*x)?,
            (Scalar::F32, Value::F32(x)) => w.write_f32::<LittleEndian>(*x)?,
            (Scalar::F64, Value::F64(x)) => w.write_f64::<LittleEndian>(*x)?,
            (s, other) => return Err(mismatch(&Ty::Scalar(s), s.as_str(), other)),
        }
        Ok(())
    }

    fn encode_definition(&self, w: &mut Vec<u8>, def: &Definition, v: &Value) -> Result<(), CodecError> {
        let ty = def.name.key();
        match &def.kind {
            DefKind::Struct { fields } => {
                let map = v.as_struct().ok_or_else(|| CodecError::Mismatch {
                    ty: ty.clone(),
                    expected: "struct".to_string(),
                    found: v.kind(),
                })?;
                check_field_names(&ty, fields, map)?;
                for f in fields {
                    let key = f.name.key();
                    let fv = map.get(&key).ok_or_else(|| CodecError::MissingField {
                        ty: ty.clone(),
                        field: key.clone(),
                    })?;
                    self.encode_value(w, &f.ty, fv)?;
                }
                Ok(())
            }
            DefKind::Variant { members, .. } => {
                let (member, payload) = match v {
                    Value::Variant(m, p) => (m, p),
                    other => {
                        return Err(CodecError::Mismatch {
                            ty,
                            expected: "variant".to_string(),
                            found: other.kind(),
                        })
                    }
                };
                let index = members
                    .iter()
                    .position(|m| &m.name.key() == member)
                    .ok_or_else(|| CodecError::UnknownMember {
                        ty: ty.clone(),
                        member: member.clone(),
                    })?;
                let start = w.len();
                write_discriminant(w, discriminant_width(members.len()), index)?;
                self.encode_value(w, &members[index].ty, payload)?;
                if let Layout::Sized(total) = def.layout {
                    // Padding policy: zero-fill up to the widest member.
                    w.resize(start + total, 0);
                }
                Ok(())
            }
        }
    }

    fn decode_value(&self, r: &mut Cursor<&[u8]>, ty: &Ty) -> Result<Value, CodecError> {
        match ty {
            Ty::Scalar(s) => self.decode_scalar(r, *s),
            Ty::String => {
                let n = read_len(r)?;
                let mut buf = vec![0u8; n];
                r.read_exact(&mut buf)?;
                Ok(Value::Str(String::from_utf8(buf)?))
            }
            Ty::Array(elem, len) => {
                let mut list = Vec::with_capacity(*len);
                for _ in 0..*len {
                    list.push(self.decode_value(r, elem)?);
                }
                Ok(Value::List(list))
            }
            Ty::Vector(elem) => {
                let n = r.read_u32::<LittleEndian>()? as usize;
                let mut list = Vec::with_capacity(n.min(remaining(r)));
                for _ in 0..n {
                    list.push(self.decode_value(r, elem)?);
                }
                Ok(Value::List(list))
            }
            Ty::Named(name) => {
                let def = self.definition(name)?;
                self.decode_definition(r, def)
            }
        }
    }

    fn decode_scalar(&self, r: &mut Cursor<&[u8]>, s: Scalar) -> Result<Value, CodecError> {
        Ok(match s {
            Scalar::U8 => Value::U8(r.read_u8()?),
            Scalar::U16 => Value::U16(r.read_u16::<LittleEndian>()?),
            Scalar::U32 => Value::U32(r.read_u32::<LittleEndian>()?),
            Scalar::U64 => Value::U64(r.read_u64::<LittleEndian>()?),
            Scalar::I8 => Value::I8(r.read_i8()?),
            Scalar::I16 => Value::I16(r.read_i16::<LittleEndian>()?),
            Scalar::I32 => Value::I32(r.read_i32::<LittleEndian>()?),
            Scalar::I64 => Value::I64(r.read_i64::<LittleEndian>()?),
            Scalar::F32 => Value::F32(r.read_f32::<LittleEndian>()?),
            Scalar::F64 => Value::F64(r.read_f64::<LittleEndian>()?),
        })
    }

    fn decode_definition(&self, r: &mut Cursor<&[u8]>, def: &Definition) -> Result<Value, CodecError> {
        match &def.kind {
            DefKind::Struct { fields } => {
                let mut out = HashMap::new();
                for f in fields {
                    out.insert(f.name.key(), self.decode_value(r, &f.ty)?);
                }
                Ok(Value::Struct(out))
            }
            DefKind::Variant { members, .. } => {
                let start = r.position() as usize;
                let raw = read_discriminant(r, discriminant_width(members.len()))?;
                let member = members
                    .get(raw as usize)
                    .ok_or_else(|| CodecError::BadDiscriminant {
                        ty: def.name.key(),
                        value: raw,
                    })?;
                let payload = self.decode_value(r, &member.ty)?;
                if let Layout::Sized(total) = def.layout {
                    // Skip the padding without looking at it.
                    let end = start + total;
                    if end > r.get_ref().len() {
                        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                    }
                    r.set_position(end as u64);
                }
                Ok(Value::Variant(member.name.key(), Box::new(payload)))
            }
        }
    }
}

fn mismatch(ty: &Ty, expected: &str, found: &Value) -> CodecError {
    CodecError::Mismatch {
        ty: ty.to_string(),
        expected: expected.to_string(),
        found: found.kind(),
    }
}

fn check_field_names(ty: &str, fields: &[FieldDef], map: &HashMap<String, Value>) -> Result<(), CodecError> {
    for key in map.keys() {
        if !fields.iter().any(|f| &f.name.key() == key) {
            return Err(CodecError::UnknownField {
                ty: ty.to_string(),
                field: key.clone(),
            });
        }
    }
    Ok(())
}

fn remaining(r: &Cursor<&[u8]>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

fn write_len(w: &mut Vec<u8>, len: usize) -> Result<(), CodecError> {
    let n = u32::try_from(len).map_err(|_| CodecError::TooLong(len))?;
    w.write_u32::<LittleEndian>(n)?;
    Ok(())
}

/// Byte count prefix, checked against the remaining input before anything is allocated.
fn read_len(r: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
    let n = r.read_u32::<LittleEndian>()? as usize;
    if n > remaining(r) {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(n)
}

fn write_discriminant(w: &mut Vec<u8>, width: usize, index: usize) -> Result<(), CodecError> {
    match width {
        1 => w.write_u8(index as u8)?,
        2 => w.write_u16::<LittleEndian>(index as u16)?,
        _ => w.write_u32::<LittleEndian>(index as u32)?,
    }
    Ok(())
}

fn read_discriminant(r: &mut Cursor<&[u8]>, width: usize) -> Result<u32, CodecError> {
    Ok(match width {
        1 => r.read_u8()? as u32,
        2 => r.read_u16::<LittleEndian>()? as u32,
        _ => r.read_u32::<LittleEndian>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Sizedness, Type};

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn rejects_value_of_wrong_kind() {
        let reg = Registry::new();
        let codec = Codec::new(&reg);
        let err = codec.encode(&Ty::Scalar(Scalar::U8), &Value::U16(1)).unwrap_err();
        assert!(matches!(err, CodecError::Mismatch { found: "u16", .. }));
        let err = codec
            .encode(
                &Ty::Array(Box::new(Ty::Scalar(Scalar::U8)), 2),
                &Value::list([Value::U8(1)]),
            )
            .unwrap_err();
        assert!(matches!(err, CodecError::ArrayLength { expected: 2, found: 1, .. }));
    }

    #[test]
    fn struct_fields_must_match_declaration() {
        let mut reg = Registry::new();
        reg.register(Type::structure(n("s"), vec![Field::new(n("a"), Type::u8())]))
            .unwrap();
        let codec = Codec::new(&reg);
        let missing = codec.encode_named(&n("s"), &Value::unit()).unwrap_err();
        assert!(matches!(missing, CodecError::MissingField { .. }));
        let extra = codec
            .encode_named(&n("s"), &Value::structure([("a", Value::U8(1)), ("b", Value::U8(2))]))
            .unwrap_err();
        assert!(matches!(extra, CodecError::UnknownField { field, .. } if field == "b"));
    }

    #[test]
    fn bad_discriminant_and_truncation() {
        let mut reg = Registry::new();
        reg.register(Type::variant(
            n("v"),
            vec![Field::new(n("a"), Type::u8()), Field::new(n("b"), Type::u16())],
            Sizedness::Sized,
        ))
        .unwrap();
        let codec = Codec::new(&reg);
        let err = codec.decode_named(&n("v"), &[7, 0, 0]).unwrap_err();
        assert!(matches!(err, CodecError::BadDiscriminant { value: 7, .. }));
        // Member `a` fits in the data but the padded slot does not.
        let err = codec.decode_named(&n("v"), &[0, 9]).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }

    #[test]
    fn huge_string_prefix_fails_without_allocating() {
        let reg = Registry::new();
        let codec = Codec::new(&reg);
        let err = codec.decode(&Ty::String, &[0xff, 0xff, 0xff, 0xff, b'a']).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
