//! Type registry: the append-only store of named types for one compiler run.
//!
//! Registration lowers an authoring [`Type`] into its registered form, hoisting inline
//! structs and variants into their own entries, and resolves its layout. A reference
//! must point at a type that is already registered, which keeps the type graph acyclic.

use crate::ir::{DefKind, Definition, FieldDef, Scalar, Ty};
use crate::layout::{Layout, LayoutResolver};
use crate::name::{Name, NameError};
use crate::schema::{Field, Type};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid name: {0}")]
    Name(#[from] NameError),
    #[error("duplicate type name: {name}")]
    DuplicateName { name: String },
    #[error("{owner}: duplicate field or member {field}")]
    DuplicateField { owner: String, field: String },
    #[error("{owner}: reference to unregistered type {target}")]
    UnknownReference { owner: String, target: String },
    #[error("only structs and variants can be registered (got anonymous {kind})")]
    Anonymous { kind: &'static str },
    #[error("{owner}: unsupported integer width {bits}")]
    IntWidth { owner: String, bits: u32 },
    #[error("{owner}: unsupported float width {bits}")]
    FloatWidth { owner: String, bits: u32 },
    #[error("{owner}: array length must be positive")]
    ZeroLengthArray { owner: String },
    #[error("{owner}: array element {element} is unsized")]
    UnsizedArrayElement { owner: String, element: String },
    #[error("{owner}: unsized field {field} is not the last field")]
    UnsizedField { owner: String, field: String },
    #[error("{owner}: sized variant has unsized member {member}")]
    UnsizedMember { owner: String, member: String },
    #[error("{owner}: encoded size does not fit in usize")]
    TooLarge { owner: String },
    #[error("{name}: inline definition differs from the registered type")]
    ConflictingDefinition { name: String },
    #[error("{name}: variant has no members")]
    EmptyVariant { name: String },
}

#[derive(Debug, Default)]
pub struct Registry {
    defs: Vec<Definition>,
    by_key: HashMap<String, usize>,
    layouts: LayoutResolver,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a struct or variant (and any inline named types it embeds).
    ///
    /// Returns a [`Type::Named`] reference for use in later definitions. On error the
    /// registry is left as it was before the call.
    pub fn register(&mut self, ty: Type) -> Result<Type, SchemaError> {
        let mark = self.defs.len();
        match self.register_owned(ty) {
            Ok(name) => Ok(Type::Named(name)),
            Err(e) => {
                for def in self.defs.drain(mark..) {
                    self.by_key.remove(&def.name.key());
                    self.layouts.remove(&def.name);
                }
                Err(e)
            }
        }
    }

    pub fn resolve(&self, name: &Name) -> Result<&Definition, SchemaError> {
        self.get(&name.key())
            .ok_or_else(|| SchemaError::UnknownReference {
                owner: "<registry>".to_string(),
                target: name.key(),
            })
    }

    pub fn get(&self, key: &str) -> Option<&Definition> {
        self.by_key.get(key).map(|&i| &self.defs[i])
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.by_key.contains_key(&name.key())
    }

    /// All definitions in registration order (which is already leaves-first).
    pub fn definitions(&self) -> &[Definition] {
        &self.defs
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Layout of a registered-form type.
    pub fn layout(&self, ty: &Ty) -> Result<Layout, SchemaError> {
        self.layouts.ty(ty, &ty.to_string())
    }

    /// Convert an authoring type into registered form without registering anything.
    ///
    /// Inline structs and variants are accepted only if a type of that name is
    /// already registered with the same definition.
    pub fn lower(&self, ty: &Type) -> Result<Ty, SchemaError> {
        let lowered = self.lower_ref(ty, "<root>")?;
        self.layout(&lowered)?;
        Ok(lowered)
    }

    /// Every named type reachable from `roots`, each once, leaves first.
    pub fn closure(&self, roots: &[Type]) -> Result<Closure<'_>, SchemaError> {
        let roots = roots
            .iter()
            .map(|r| self.lower(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.closure_of(roots))
    }

    /// Closure over every registered type.
    pub fn full_closure(&self) -> Closure<'_> {
        let roots = self.defs.iter().map(|d| Ty::Named(d.name.clone())).collect();
        self.closure_of(roots)
    }

    fn closure_of(&self, roots: Vec<Ty>) -> Closure<'_> {
        let mut visited = vec![false; self.defs.len()];
        let mut order = Vec::new();
        for root in &roots {
            self.visit_ty(root, &mut visited, &mut order);
        }
        Closure {
            registry: self,
            roots,
            order,
        }
    }

    fn visit_ty(&self, ty: &Ty, visited: &mut [bool], order: &mut Vec<usize>) {
        match ty {
            Ty::Scalar(_) | Ty::String => {}
            Ty::Array(elem, _) | Ty::Vector(elem) => self.visit_ty(elem, visited, order),
            Ty::Named(name) => {
                if let Some(&idx) = self.by_key.get(&name.key()) {
                    if visited[idx] {
                        return;
                    }
                    visited[idx] = true;
                    for slot in self.defs[idx].slots() {
                        self.visit_ty(&slot.ty, visited, order);
                    }
                    order.push(idx);
                }
            }
        }
    }

    fn register_owned(&mut self, ty: Type) -> Result<Name, SchemaError> {
        match ty {
            Type::Struct(s) => {
                self.ensure_free(&s.name)?;
                let fields = self.lower_slots(&s.name, s.fields)?;
                self.insert(s.name, DefKind::Struct { fields })
            }
            Type::Variant(v) => {
                self.ensure_free(&v.name)?;
                let members = self.lower_slots(&v.name, v.members)?;
                self.insert(
                    v.name,
                    DefKind::Variant {
                        members,
                        declared: v.sizedness,
                    },
                )
            }
            Type::Named(name) if self.contains(&name) => {
                Err(SchemaError::DuplicateName { name: name.key() })
            }
            Type::Named(name) => Err(SchemaError::UnknownReference {
                owner: "<registry>".to_string(),
                target: name.key(),
            }),
            Type::Int { .. } => Err(SchemaError::Anonymous { kind: "integer" }),
            Type::Float { .. } => Err(SchemaError::Anonymous { kind: "float" }),
            Type::Array(..) => Err(SchemaError::Anonymous { kind: "array" }),
            Type::Vector(_) => Err(SchemaError::Anonymous { kind: "vector" }),
            Type::String => Err(SchemaError::Anonymous { kind: "string" }),
        }
    }

    fn ensure_free(&self, name: &Name) -> Result<(), SchemaError> {
        if self.contains(name) {
            return Err(SchemaError::DuplicateName { name: name.key() });
        }
        Ok(())
    }

    fn insert(&mut self, name: Name, kind: DefKind) -> Result<Name, SchemaError> {
        self.ensure_free(&name)?;
        let layout = self.layouts.definition(&name, &kind)?;
        debug!(name = %name, ?layout, "registered type");
        self.layouts.insert(&name, layout);
        self.by_key.insert(name.key(), self.defs.len());
        self.defs.push(Definition {
            name: name.clone(),
            kind,
            layout,
        });
        Ok(name)
    }

    fn lower_slots(&mut self, owner: &Name, slots: Vec<Field>) -> Result<Vec<FieldDef>, SchemaError> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            if !seen.insert(slot.name.key()) {
                return Err(SchemaError::DuplicateField {
                    owner: owner.key(),
                    field: slot.name.key(),
                });
            }
            let ty = self.lower_owned(slot.ty, owner)?;
            out.push(FieldDef { name: slot.name, ty });
        }
        Ok(out)
    }

    /// Lower a type owned by `owner`, registering inline named types on the way.
    fn lower_owned(&mut self, ty: Type, owner: &Name) -> Result<Ty, SchemaError> {
        Ok(match ty {
            Type::Array(elem, len) => Ty::Array(Box::new(self.lower_owned(*elem, owner)?), len),
            Type::Vector(elem) => Ty::Vector(Box::new(self.lower_owned(*elem, owner)?)),
            Type::Struct(_) | Type::Variant(_) => Ty::Named(self.register_owned(ty)?),
            other => self.lower_ref(&other, &owner.key())?,
        })
    }

    fn lower_ref(&self, ty: &Type, owner: &str) -> Result<Ty, SchemaError> {
        Ok(match ty {
            Type::Int { bits, signed } => Ty::Scalar(Scalar::from_int(*bits, *signed).ok_or_else(
                || SchemaError::IntWidth {
                    owner: owner.to_string(),
                    bits: *bits,
                },
            )?),
            Type::Float { bits } => Ty::Scalar(Scalar::from_float(*bits).ok_or_else(|| {
                SchemaError::FloatWidth {
                    owner: owner.to_string(),
                    bits: *bits,
                }
            })?),
            Type::Array(elem, len) => Ty::Array(Box::new(self.lower_ref(elem, owner)?), *len),
            Type::Vector(elem) => Ty::Vector(Box::new(self.lower_ref(elem, owner)?)),
            Type::String => Ty::String,
            Type::Named(name) => Ty::Named(self.registered(name, owner)?.name.clone()),
            Type::Struct(st) => {
                let def = self.registered(&st.name, owner)?;
                let fields = self.lower_ref_slots(&st.fields, &st.name)?;
                if def.kind != (DefKind::Struct { fields }) {
                    return Err(SchemaError::ConflictingDefinition { name: st.name.key() });
                }
                Ty::Named(st.name.clone())
            }
            Type::Variant(v) => {
                let def = self.registered(&v.name, owner)?;
                let members = self.lower_ref_slots(&v.members, &v.name)?;
                let inline = DefKind::Variant {
                    members,
                    declared: v.sizedness,
                };
                if def.kind != inline {
                    return Err(SchemaError::ConflictingDefinition { name: v.name.key() });
                }
                Ty::Named(v.name.clone())
            }
        })
    }

    fn registered(&self, name: &Name, owner: &str) -> Result<&Definition, SchemaError> {
        self.get(&name.key())
            .ok_or_else(|| SchemaError::UnknownReference {
                owner: owner.to_string(),
                target: name.key(),
            })
    }

    /// Lower the slots of an inline type that must match its registered definition.
    fn lower_ref_slots(&self, slots: &[Field], owner: &Name) -> Result<Vec<FieldDef>, SchemaError> {
        let owner = owner.key();
        slots
            .iter()
            .map(|slot| {
                Ok(FieldDef {
                    name: slot.name.clone(),
                    ty: self.lower_ref(&slot.ty, &owner)?,
                })
            })
            .collect()
    }
}

/// Named types reachable from a set of roots, ordered so that every type follows the
/// types it references.
#[derive(Debug, Clone)]
pub struct Closure<'r> {
    registry: &'r Registry,
    roots: Vec<Ty>,
    order: Vec<usize>,
}

impl<'r> Closure<'r> {
    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn roots(&self) -> &[Ty] {
        &self.roots
    }

    pub fn definitions(&self) -> impl Iterator<Item = &'r Definition> + '_ {
        let registry = self.registry;
        self.order.iter().map(move |&i| &registry.defs[i])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.definitions().any(|d| &d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Sizedness;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn inline_named_types_are_hoisted_first() {
        let mut reg = Registry::new();
        reg.register(Type::structure(
            n("outer"),
            vec![Field::new(
                n("inner"),
                Type::structure(n("inner_struct"), vec![Field::new(n("x"), Type::u8())]),
            )],
        ))
        .unwrap();
        let keys: Vec<String> = reg.definitions().iter().map(|d| d.name.key()).collect();
        assert_eq!(keys, ["inner_struct", "outer"]);
        let outer = reg.resolve(&n("outer")).unwrap();
        assert_eq!(outer.slots()[0].ty, Ty::Named(n("inner_struct")));
        assert_eq!(outer.layout, Layout::Sized(1));
    }

    #[test]
    fn failed_registration_rolls_back() {
        let mut reg = Registry::new();
        let err = reg
            .register(Type::structure(
                n("outer"),
                vec![
                    Field::new(
                        n("inner"),
                        Type::structure(n("inner_struct"), vec![Field::new(n("x"), Type::u8())]),
                    ),
                    Field::new(n("y"), Type::int(24, false)),
                ],
            ))
            .unwrap_err();
        assert!(matches!(err, SchemaError::IntWidth { bits: 24, .. }));
        assert!(reg.is_empty());
        assert!(!reg.contains(&n("inner_struct")));
    }

    #[test]
    fn auto_variant_resolves_at_registration() {
        let mut reg = Registry::new();
        reg.register(Type::variant(
            n("v"),
            vec![Field::new(n("a"), Type::u8()), Field::new(n("b"), Type::u32())],
            Sizedness::Auto,
        ))
        .unwrap();
        assert_eq!(reg.resolve(&n("v")).unwrap().layout, Layout::Sized(5));
    }

    #[test]
    fn anonymous_registration_is_rejected() {
        let mut reg = Registry::new();
        assert_eq!(
            reg.register(Type::vector(Type::u8())),
            Err(SchemaError::Anonymous { kind: "vector" })
        );
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let mut reg = Registry::new();
        let err = reg
            .register(Type::structure(
                n("s"),
                vec![Field::new(n("a"), Type::u8()), Field::new(n("a"), Type::u16())],
            ))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { field, .. } if field == "a"));
    }
}
