//! Registry integration tests: registration rules, layout resolution, closures.

use wiregen::{Field, Layout, Name, Registry, SchemaError, Sizedness, Ty, Type};

fn n(s: &str) -> Name {
    Name::parse(s).expect("name")
}

fn f(name: &str, ty: Type) -> Field {
    Field::new(n(name), ty)
}

#[test]
fn test_struct_layout_is_sum_of_fields() {
    let mut reg = Registry::new();
    let pair = reg
        .register(Type::structure(n("pair"), vec![f("a", Type::u8()), f("b", Type::u16())]))
        .expect("register");
    let ty = reg.lower(&pair).expect("lower");
    assert_eq!(reg.layout(&ty).expect("layout"), Layout::Sized(3));

    let arr = reg.lower(&Type::array(pair, 4)).expect("lower");
    assert_eq!(reg.layout(&arr).expect("layout"), Layout::Sized(12));
}

#[test]
fn test_duplicate_name_is_rejected() {
    let mut reg = Registry::new();
    reg.register(Type::structure(n("thing"), vec![])).expect("first");
    let err = reg
        .register(Type::structure(n("thing"), vec![f("x", Type::u8())]))
        .unwrap_err();
    assert_eq!(err, SchemaError::DuplicateName { name: "thing".to_string() });
    assert_eq!(reg.len(), 1);
}

#[test]
fn test_duplicate_inline_name_is_rejected() {
    let mut reg = Registry::new();
    reg.register(Type::structure(n("inner"), vec![])).expect("inner");
    let err = reg
        .register(Type::structure(
            n("outer"),
            vec![f("a", Type::structure(n("inner"), vec![f("x", Type::u8())]))],
        ))
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateName { ref name } if name == "inner"));
    assert!(reg.get("outer").is_none());
}

#[test]
fn test_unregistered_reference_is_rejected() {
    let mut reg = Registry::new();
    let err = reg
        .register(Type::structure(
            n("holder"),
            vec![f("item", Type::Named(n("missing")))],
        ))
        .unwrap_err();
    assert_eq!(
        err,
        SchemaError::UnknownReference {
            owner: "holder".to_string(),
            target: "missing".to_string()
        }
    );
    assert!(reg.is_empty());

    let err = reg.closure(&[Type::Named(n("missing"))]).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownReference { .. }));
}

#[test]
fn test_unsized_field_must_be_last() {
    let mut reg = Registry::new();
    let err = reg
        .register(Type::structure(
            n("bad"),
            vec![f("text", Type::string()), f("after", Type::u8())],
        ))
        .unwrap_err();
    assert_eq!(
        err,
        SchemaError::UnsizedField {
            owner: "bad".to_string(),
            field: "text".to_string()
        }
    );

    let ok = reg
        .register(Type::structure(
            n("good"),
            vec![f("id", Type::u8()), f("text", Type::string())],
        ))
        .expect("trailing unsized field");
    let ty = reg.lower(&ok).expect("lower");
    assert_eq!(reg.layout(&ty).expect("layout"), Layout::Unsized);
}

#[test]
fn test_invalid_constructs_are_rejected() {
    let mut reg = Registry::new();
    let cases = vec![
        (
            Type::structure(n("w"), vec![f("x", Type::int(24, false))]),
            SchemaError::IntWidth { owner: "w".to_string(), bits: 24 },
        ),
        (
            Type::structure(n("w"), vec![f("x", Type::float(16))]),
            SchemaError::FloatWidth { owner: "w".to_string(), bits: 16 },
        ),
        (
            Type::structure(n("w"), vec![f("x", Type::array(Type::u8(), 0))]),
            SchemaError::ZeroLengthArray { owner: "w".to_string() },
        ),
        (
            Type::variant(n("w"), vec![], Sizedness::Auto),
            SchemaError::EmptyVariant { name: "w".to_string() },
        ),
        (
            Type::variant(n("w"), vec![f("x", Type::string())], Sizedness::Sized),
            SchemaError::UnsizedMember { owner: "w".to_string(), member: "x".to_string() },
        ),
    ];
    for (ty, expected) in cases {
        assert_eq!(reg.register(ty).unwrap_err(), expected);
        assert!(reg.is_empty());
    }
    assert!(matches!(
        reg.register(Type::structure(
            n("w"),
            vec![f("x", Type::array(Type::string(), 2))]
        )),
        Err(SchemaError::UnsizedArrayElement { .. })
    ));
}

#[test]
fn test_variant_layouts() {
    let mut reg = Registry::new();
    let unit = reg.register(Type::structure(n("unit"), vec![])).expect("unit");
    let sized = reg
        .register(Type::variant(
            n("sized_choice"),
            vec![f("empty", unit.clone()), f("value", Type::i32())],
            Sizedness::Sized,
        ))
        .expect("sized");
    let auto_sized = reg
        .register(Type::variant(
            n("auto_sized"),
            vec![f("empty", unit.clone()), f("wide", Type::u64())],
            Sizedness::Auto,
        ))
        .expect("auto sized");
    let auto_unsized = reg
        .register(Type::variant(
            n("auto_unsized"),
            vec![f("empty", unit.clone()), f("values", Type::vector(Type::i32()))],
            Sizedness::Auto,
        ))
        .expect("auto unsized");
    let forced = reg
        .register(Type::variant(
            n("forced_unsized"),
            vec![f("empty", unit), f("value", Type::i32())],
            Sizedness::Unsized,
        ))
        .expect("unsized");

    let layout = |t: &Type| reg.layout(&reg.lower(t).expect("lower")).expect("layout");
    assert_eq!(layout(&sized), Layout::Sized(5));
    assert_eq!(layout(&auto_sized), Layout::Sized(9));
    assert_eq!(layout(&auto_unsized), Layout::Unsized);
    assert_eq!(layout(&forced), Layout::Unsized);
}

#[test]
fn test_closure_is_complete_and_leaves_first() {
    let mut reg = Registry::new();
    reg.register(Type::structure(n("unrelated"), vec![])).expect("unrelated");
    let leaf = reg
        .register(Type::structure(n("leaf"), vec![f("x", Type::u8())]))
        .expect("leaf");
    let mid = reg
        .register(Type::structure(
            n("mid"),
            vec![f("leaves", Type::vector(leaf.clone()))],
        ))
        .expect("mid");
    let top = reg
        .register(Type::structure(
            n("top"),
            vec![
                f("first", leaf.clone()),
                f("inline", Type::structure(n("inline_child"), vec![f("y", Type::u16())])),
                f("mid", mid),
            ],
        ))
        .expect("top");

    let closure = reg
        .closure(&[Type::vector(top), leaf])
        .expect("closure");
    let keys: Vec<String> = closure.definitions().map(|d| d.name.key()).collect();
    assert_eq!(keys, vec!["leaf", "inline_child", "mid", "top"]);
    assert!(!closure.contains(&n("unrelated")));
    assert_eq!(
        closure.roots()[0],
        Ty::Vector(Box::new(Ty::Named(n("top"))))
    );

    // Every referenced named type precedes its referrer.
    for (pos, def) in closure.definitions().enumerate() {
        for slot in def.slots() {
            if let Ty::Named(dep) = &slot.ty {
                let dep_pos = keys.iter().position(|k| *k == dep.key()).expect("in closure");
                assert!(dep_pos < pos, "{} must precede {}", dep, def.name);
            }
        }
    }

    let full = reg.full_closure();
    assert_eq!(full.len(), reg.len());
}

#[test]
fn test_anonymous_roots_are_not_registrable() {
    let mut reg = Registry::new();
    assert_eq!(
        reg.register(Type::vector(Type::u8())).unwrap_err(),
        SchemaError::Anonymous { kind: "vector" }
    );
}

#[test]
fn test_registering_a_bare_reference() {
    let mut reg = Registry::new();
    let thing = reg.register(Type::structure(n("thing"), vec![])).expect("thing");
    assert_eq!(
        reg.register(thing).unwrap_err(),
        SchemaError::DuplicateName { name: "thing".to_string() }
    );
    assert!(matches!(
        reg.register(Type::Named(n("ghost"))).unwrap_err(),
        SchemaError::UnknownReference { ref target, .. } if target == "ghost"
    ));
}

#[test]
fn test_inline_root_must_match_registered_definition() {
    let mut reg = Registry::new();
    reg.register(Type::structure(n("pair"), vec![f("a", Type::u8()), f("b", Type::u16())]))
        .expect("pair");

    let same = Type::structure(n("pair"), vec![f("a", Type::u8()), f("b", Type::u16())]);
    assert_eq!(reg.lower(&same).expect("lower"), Ty::Named(n("pair")));

    let widened = Type::structure(n("pair"), vec![f("a", Type::u32()), f("b", Type::u16())]);
    assert_eq!(
        reg.lower(&widened).unwrap_err(),
        SchemaError::ConflictingDefinition { name: "pair".to_string() }
    );
    assert!(matches!(
        reg.closure(&[Type::vector(widened)]),
        Err(SchemaError::ConflictingDefinition { .. })
    ));

    reg.register(Type::variant(
        n("choice"),
        vec![f("value", Type::i32())],
        Sizedness::Auto,
    ))
    .expect("choice");
    let resized = Type::variant(n("choice"), vec![f("value", Type::i32())], Sizedness::Unsized);
    assert!(matches!(
        reg.lower(&resized),
        Err(SchemaError::ConflictingDefinition { ref name }) if name == "choice"
    ));
}

#[test]
fn test_oversized_layout_is_a_schema_error() {
    let mut reg = Registry::new();
    let err = reg
        .register(Type::structure(
            n("huge"),
            vec![f("data", Type::array(Type::u64(), usize::MAX / 4))],
        ))
        .unwrap_err();
    assert_eq!(err, SchemaError::TooLarge { owner: "huge".to_string() });
    assert!(reg.is_empty());

    let half = usize::MAX / 2 + 1;
    let err = reg
        .register(Type::structure(
            n("sum"),
            vec![
                f("a", Type::array(Type::u8(), half)),
                f("b", Type::array(Type::u8(), half)),
            ],
        ))
        .unwrap_err();
    assert_eq!(err, SchemaError::TooLarge { owner: "sum".to_string() });

    let err = reg
        .register(Type::variant(
            n("wide"),
            vec![f("blob", Type::array(Type::u8(), usize::MAX))],
            Sizedness::Sized,
        ))
        .unwrap_err();
    assert_eq!(err, SchemaError::TooLarge { owner: "wide".to_string() });
}
