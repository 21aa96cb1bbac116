//! Schema authoring surface: the type algebra as built by schema-definition code.
//!
//! Composite types own the inline sub-types they embed. A type that was already
//! registered is referenced by name through [`Type::Named`], which is what
//! [`Registry::register`](crate::registry::Registry::register) hands back.

use crate::name::Name;

/// How a variant lays out its payload slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizedness {
    /// Fixed slot as large as the largest member; every member must be sized.
    Sized,
    /// Slot is exactly the chosen member's encoding.
    Unsized,
    /// `Sized` if every member is sized, `Unsized` otherwise.
    Auto,
}

/// Named slot inside a struct or a variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Name,
    pub ty: Type,
}

impl Field {
    pub fn new(name: Name, ty: Type) -> Self {
        Field { name, ty }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub name: Name,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantType {
    pub name: Name,
    pub members: Vec<Field>,
    pub sizedness: Sizedness,
}

/// Wire-representable type constructors.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Two's-complement integer; `bits` must be 8, 16, 32 or 64.
    Int { bits: u32, signed: bool },
    /// IEEE-754 float; `bits` must be 32 or 64.
    Float { bits: u32 },
    Array(Box<Type>, usize),
    Vector(Box<Type>),
    String,
    Struct(StructType),
    Variant(VariantType),
    Named(Name),
}

impl Type {
    pub fn int(bits: u32, signed: bool) -> Self {
        Type::Int { bits, signed }
    }

    pub fn float(bits: u32) -> Self {
        Type::Float { bits }
    }

    pub fn u8() -> Self {
        Type::int(8, false)
    }

    pub fn u16() -> Self {
        Type::int(16, false)
    }

    pub fn u32() -> Self {
        Type::int(32, false)
    }

    pub fn u64() -> Self {
        Type::int(64, false)
    }

    pub fn i8() -> Self {
        Type::int(8, true)
    }

    pub fn i16() -> Self {
        Type::int(16, true)
    }

    pub fn i32() -> Self {
        Type::int(32, true)
    }

    pub fn i64() -> Self {
        Type::int(64, true)
    }

    pub fn f32() -> Self {
        Type::float(32)
    }

    pub fn f64() -> Self {
        Type::float(64)
    }

    pub fn array(element: Type, len: usize) -> Self {
        Type::Array(Box::new(element), len)
    }

    pub fn vector(element: Type) -> Self {
        Type::Vector(Box::new(element))
    }

    pub fn string() -> Self {
        Type::String
    }

    pub fn structure(name: Name, fields: Vec<Field>) -> Self {
        Type::Struct(StructType { name, fields })
    }

    pub fn variant(name: Name, members: Vec<Field>, sizedness: Sizedness) -> Self {
        Type::Variant(VariantType {
            name,
            members,
            sizedness,
        })
    }

    /// The declared name of a struct, variant or reference; `None` for anonymous types.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Type::Struct(s) => Some(&s.name),
            Type::Variant(v) => Some(&v.name),
            Type::Named(n) => Some(n),
            _ => None,
        }
    }
}
