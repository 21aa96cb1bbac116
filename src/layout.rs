//! Layout resolution: decides whether a type has a fixed encoded length.
//!
//! Rules, by structural recursion:
//!
//! | Type | Layout |
//! |------|--------|
//! | integer / float | sized, `bits / 8` bytes |
//! | `Array(e, n)` | sized iff `e` is sized, `n * len(e)`; unsized `e` is an error |
//! | `Vector(e)`, `String` | unsized (`u32` count prefix + elements) |
//! | struct | sized iff every field is; only the last field may be unsized |
//! | variant | discriminant + payload slot, see [`Sizedness`] |
//!
//! Named types are resolved once, when registered, and memoized by key, so resolving
//! a whole schema is linear in its size.

use crate::ir::{DefKind, FieldDef, Ty};
use crate::name::Name;
use crate::registry::SchemaError;
use crate::schema::Sizedness;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Every value encodes to exactly this many bytes.
    Sized(usize),
    /// Encoded length depends on the value.
    Unsized,
}

impl Layout {
    pub fn is_sized(self) -> bool {
        matches!(self, Layout::Sized(_))
    }

    pub fn size(self) -> Option<usize> {
        match self {
            Layout::Sized(n) => Some(n),
            Layout::Unsized => None,
        }
    }
}

/// Width in bytes of the vector/string element count.
pub const LENGTH_PREFIX: usize = 4;

/// Smallest discriminant width (1, 2 or 4 bytes) that can index `members` members.
pub fn discriminant_width(members: usize) -> usize {
    if members <= 1 << 8 {
        1
    } else if members <= 1 << 16 {
        2
    } else {
        4
    }
}

#[derive(Debug, Default, Clone)]
pub struct LayoutResolver {
    memo: HashMap<String, Layout>,
}

impl LayoutResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized layout of a registered type.
    pub fn get(&self, name: &Name) -> Option<Layout> {
        self.memo.get(&name.key()).copied()
    }

    pub fn insert(&mut self, name: &Name, layout: Layout) {
        self.memo.insert(name.key(), layout);
    }

    pub fn remove(&mut self, name: &Name) {
        self.memo.remove(&name.key());
    }

    /// Layout of a type appearing inside `owner` (used to name the culprit on error).
    pub fn ty(&self, ty: &Ty, owner: &str) -> Result<Layout, SchemaError> {
        match ty {
            Ty::Scalar(s) => Ok(Layout::Sized(s.size())),
            Ty::Vector(_) | Ty::String => Ok(Layout::Unsized),
            Ty::Array(elem, len) => {
                if *len == 0 {
                    return Err(SchemaError::ZeroLengthArray {
                        owner: owner.to_string(),
                    });
                }
                match self.ty(elem, owner)? {
                    Layout::Sized(n) => n
                        .checked_mul(*len)
                        .map(Layout::Sized)
                        .ok_or_else(|| too_large(owner)),
                    Layout::Unsized => Err(SchemaError::UnsizedArrayElement {
                        owner: owner.to_string(),
                        element: elem.to_string(),
                    }),
                }
            }
            Ty::Named(name) => self.get(name).ok_or_else(|| SchemaError::UnknownReference {
                owner: owner.to_string(),
                target: name.key(),
            }),
        }
    }

    /// Resolve a definition about to be registered under `name`.
    pub fn definition(&self, name: &Name, kind: &DefKind) -> Result<Layout, SchemaError> {
        let owner = name.key();
        match kind {
            DefKind::Struct { fields } => self.structure(&owner, fields),
            DefKind::Variant { members, declared } => self.variant(&owner, members, *declared),
        }
    }

    fn structure(&self, owner: &str, fields: &[FieldDef]) -> Result<Layout, SchemaError> {
        let mut total = 0usize;
        let mut sized = true;
        for (i, field) in fields.iter().enumerate() {
            match self.ty(&field.ty, owner)? {
                Layout::Sized(n) => {
                    total = total.checked_add(n).ok_or_else(|| too_large(owner))?;
                }
                Layout::Unsized if i + 1 == fields.len() => sized = false,
                Layout::Unsized => {
                    return Err(SchemaError::UnsizedField {
                        owner: owner.to_string(),
                        field: field.name.key(),
                    })
                }
            }
        }
        Ok(if sized { Layout::Sized(total) } else { Layout::Unsized })
    }

    fn variant(
        &self,
        owner: &str,
        members: &[FieldDef],
        declared: Sizedness,
    ) -> Result<Layout, SchemaError> {
        if members.is_empty() {
            return Err(SchemaError::EmptyVariant {
                name: owner.to_string(),
            });
        }
        let mut widest = 0usize;
        let mut first_unsized = None;
        for member in members {
            match self.ty(&member.ty, owner)? {
                Layout::Sized(n) => widest = widest.max(n),
                Layout::Unsized if first_unsized.is_none() => first_unsized = Some(member),
                Layout::Unsized => {}
            }
        }
        let tag = discriminant_width(members.len());
        match (declared, first_unsized) {
            (Sizedness::Sized, Some(member)) => Err(SchemaError::UnsizedMember {
                owner: owner.to_string(),
                member: member.name.key(),
            }),
            (Sizedness::Sized, None) | (Sizedness::Auto, None) => tag
                .checked_add(widest)
                .map(Layout::Sized)
                .ok_or_else(|| too_large(owner)),
            (Sizedness::Unsized, _) | (Sizedness::Auto, Some(_)) => Ok(Layout::Unsized),
        }
    }
}

fn too_large(owner: &str) -> SchemaError {
    SchemaError::TooLarge {
        owner: owner.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Scalar;

    fn field(name: &str, ty: Ty) -> FieldDef {
        FieldDef {
            name: Name::parse(name).unwrap(),
            ty,
        }
    }

    #[test]
    fn scalars_and_arrays() {
        let r = LayoutResolver::new();
        assert_eq!(r.ty(&Ty::Scalar(Scalar::U16), "t").unwrap(), Layout::Sized(2));
        let arr = Ty::Array(Box::new(Ty::Scalar(Scalar::F32)), 2);
        assert_eq!(r.ty(&arr, "t").unwrap(), Layout::Sized(8));
        assert_eq!(r.ty(&Ty::String, "t").unwrap(), Layout::Unsized);
    }

    #[test]
    fn array_of_unsized_is_rejected() {
        let r = LayoutResolver::new();
        let arr = Ty::Array(Box::new(Ty::String), 3);
        assert!(matches!(
            r.ty(&arr, "holder"),
            Err(SchemaError::UnsizedArrayElement { owner, .. }) if owner == "holder"
        ));
        let empty = Ty::Array(Box::new(Ty::Scalar(Scalar::U8)), 0);
        assert!(matches!(r.ty(&empty, "holder"), Err(SchemaError::ZeroLengthArray { .. })));
    }

    #[test]
    fn struct_allows_only_trailing_unsized() {
        let r = LayoutResolver::new();
        let name = Name::parse("s").unwrap();
        let ok = DefKind::Struct {
            fields: vec![field("a", Ty::Scalar(Scalar::U8)), field("b", Ty::String)],
        };
        assert_eq!(r.definition(&name, &ok).unwrap(), Layout::Unsized);
        let bad = DefKind::Struct {
            fields: vec![field("a", Ty::String), field("b", Ty::Scalar(Scalar::U8))],
        };
        assert!(matches!(
            r.definition(&name, &bad),
            Err(SchemaError::UnsizedField { field, .. }) if field == "a"
        ));
    }

    #[test]
    fn variant_sizedness() {
        let mut r = LayoutResolver::new();
        let unit = Name::parse("unit").unwrap();
        r.insert(&unit, Layout::Sized(0));
        let sized_members = vec![
            field("empty", Ty::Named(unit.clone())),
            field("value", Ty::Scalar(Scalar::I32)),
        ];
        let name = Name::parse("v").unwrap();
        for declared in [Sizedness::Sized, Sizedness::Auto] {
            let kind = DefKind::Variant {
                members: sized_members.clone(),
                declared,
            };
            assert_eq!(r.definition(&name, &kind).unwrap(), Layout::Sized(5));
        }
        let kind = DefKind::Variant {
            members: sized_members,
            declared: Sizedness::Unsized,
        };
        assert_eq!(r.definition(&name, &kind).unwrap(), Layout::Unsized);

        let mixed = vec![
            field("value", Ty::Scalar(Scalar::I32)),
            field("vector", Ty::Vector(Box::new(Ty::Scalar(Scalar::I32)))),
        ];
        let auto = DefKind::Variant {
            members: mixed.clone(),
            declared: Sizedness::Auto,
        };
        assert_eq!(r.definition(&name, &auto).unwrap(), Layout::Unsized);
        let sized = DefKind::Variant {
            members: mixed,
            declared: Sizedness::Sized,
        };
        assert!(matches!(
            r.definition(&name, &sized),
            Err(SchemaError::UnsizedMember { member, .. }) if member == "vector"
        ));
        let empty = DefKind::Variant {
            members: vec![],
            declared: Sizedness::Auto,
        };
        assert!(matches!(r.definition(&name, &empty), Err(SchemaError::EmptyVariant { .. })));
    }

    #[test]
    fn discriminant_grows_with_member_count() {
        assert_eq!(discriminant_width(1), 1);
        assert_eq!(discriminant_width(256), 1);
        assert_eq!(discriminant_width(257), 2);
        assert_eq!(discriminant_width(65536), 2);
        assert_eq!(discriminant_width(65537), 4);
    }
}
