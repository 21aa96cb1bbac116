//! Registered form of the type algebra.
//!
//! After registration every inline struct or variant has been hoisted into the
//! registry, so a [`Ty`] only ever points at named types through [`Ty::Named`].

use crate::layout::Layout;
use crate::name::Name;
use crate::schema::Sizedness;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Scalar {
    pub fn from_int(bits: u32, signed: bool) -> Option<Scalar> {
        Some(match (bits, signed) {
            (8, false) => Scalar::U8,
            (16, false) => Scalar::U16,
            (32, false) => Scalar::U32,
            (64, false) => Scalar::U64,
            (8, true) => Scalar::I8,
            (16, true) => Scalar::I16,
            (32, true) => Scalar::I32,
            (64, true) => Scalar::I64,
            _ => return None,
        })
    }

    pub fn from_float(bits: u32) -> Option<Scalar> {
        match bits {
            32 => Some(Scalar::F32),
            64 => Some(Scalar::F64),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Scalar::U8 | Scalar::I8 => 1,
            Scalar::U16 | Scalar::I16 => 2,
            Scalar::U32 | Scalar::I32 | Scalar::F32 => 4,
            Scalar::U64 | Scalar::I64 | Scalar::F64 => 8,
        }
    }

    /// Short name, shared by the Rust backend and diagnostics (`u8`, `i32`, `f64`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Scalar::U8 => "u8",
            Scalar::U16 => "u16",
            Scalar::U32 => "u32",
            Scalar::U64 => "u64",
            Scalar::I8 => "i8",
            Scalar::I16 => "i16",
            Scalar::I32 => "i32",
            Scalar::I64 => "i64",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Scalar(Scalar),
    Array(Box<Ty>, usize),
    Vector(Box<Ty>),
    String,
    Named(Name),
}

impl fmt::Display for Ty {
    /// Compact, whitespace-free spelling used as a label for anonymous types.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Scalar(s) => f.write_str(s.as_str()),
            Ty::Array(elem, len) => write!(f, "array<{elem},{len}>"),
            Ty::Vector(elem) => write!(f, "vector<{elem}>"),
            Ty::String => f.write_str("string"),
            Ty::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: Name,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefKind {
    Struct {
        fields: Vec<FieldDef>,
    },
    Variant {
        members: Vec<FieldDef>,
        /// As written by the schema author; the resolved choice is the definition's layout.
        declared: Sizedness,
    },
}

/// A named type as stored in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: Name,
    pub kind: DefKind,
    pub layout: Layout,
}

impl Definition {
    /// Types referenced by this definition's fields or members, in declaration order.
    pub fn slots(&self) -> &[FieldDef] {
        match &self.kind {
            DefKind::Struct { fields } => fields,
            DefKind::Variant { members, .. } => members,
        }
    }

    pub fn is_sized(&self) -> bool {
        self.layout.is_sized()
    }
}
