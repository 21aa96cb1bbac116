//! Built-in schemas with test vectors.
//!
//! [`codegen_test`] exercises every construct the generator supports; [`device`] is the
//! message protocol spoken between a device controller and its IOC.

use crate::harness::{Case, Suite, TestVector};
use crate::name::Name;
use crate::registry::{Registry, SchemaError};
use crate::schema::{Field, Sizedness, Type};
use crate::value::Value;

/// Names accepted by [`by_name`].
pub const SCHEMAS: &[&str] = &["codegen-test", "device"];

pub fn by_name(name: &str) -> Option<Result<Suite, SchemaError>> {
    match name {
        "codegen-test" => Some(codegen_test()),
        "device" => Some(device()),
        _ => None,
    }
}

fn n(snake: &str) -> Result<Name, SchemaError> {
    Ok(Name::parse(snake)?)
}

fn field(name: &str, ty: Type) -> Result<Field, SchemaError> {
    Ok(Field::new(n(name)?, ty))
}

fn u32s(values: &[u32]) -> Value {
    Value::list(values.iter().map(|&v| Value::U32(v)))
}

fn i32s(values: &[i32]) -> Value {
    Value::list(values.iter().map(|&v| Value::I32(v)))
}

/// The conformance schema.
pub fn codegen_test() -> Result<Suite, SchemaError> {
    let mut reg = Registry::new();

    let empty_struct = reg.register(Type::structure(n("empty_struct")?, vec![]))?;
    let some_struct = reg.register(Type::structure(
        n("some_struct")?,
        vec![
            field("a", Type::u8())?,
            field("b", Type::u16())?,
            field("c", Type::array(Type::f32(), 2))?,
        ],
    ))?;
    let value_struct = reg.register(Type::structure(
        n("value_struct")?,
        vec![field("value", Type::u32())?],
    ))?;
    let arrays_struct = reg.register(Type::structure(
        n("arrays_struct")?,
        vec![
            field("idata", Type::array(Type::u32(), 8))?,
            field("fdata", Type::array(Type::f64(), 4))?,
        ],
    ))?;
    let int_vector_struct = reg.register(Type::structure(
        n("int_vector_struct")?,
        vec![field("data", Type::vector(Type::u32()))?],
    ))?;
    let float_vector_struct = reg.register(Type::structure(
        n("float_vector_struct")?,
        vec![field("data", Type::vector(Type::f32()))?],
    ))?;
    let string_struct = reg.register(Type::structure(
        n("string_struct")?,
        vec![field("text", Type::string())?],
    ))?;
    let integers_struct = reg.register(Type::structure(
        n("integers_struct")?,
        vec![
            field("u8", Type::u8())?,
            field("u16", Type::u16())?,
            field("u32", Type::u32())?,
            field("u64", Type::u64())?,
            field("i8", Type::i8())?,
            field("i16", Type::i16())?,
            field("i32", Type::i32())?,
            field("i64", Type::i64())?,
        ],
    ))?;
    let floats = reg.register(Type::structure(
        n("floats")?,
        vec![field("f32", Type::f32())?, field("f64", Type::f64())?],
    ))?;
    let vector_of_arrays = reg.register(Type::structure(
        n("vector_of_arrays")?,
        vec![field("data", Type::vector(Type::array(Type::u32(), 5)))?],
    ))?;
    let vector_of_structs = reg.register(Type::structure(
        n("vector_of_structs")?,
        vec![field("data", Type::vector(some_struct.clone()))?],
    ))?;
    let nested_struct = reg.register(Type::structure(
        n("nested_struct")?,
        vec![
            field("u8", Type::u8())?,
            field(
                "one",
                Type::structure(
                    n("nested_struct_one")?,
                    vec![field("u8", Type::u8())?, field("u32", Type::u32())?],
                ),
            )?,
            field(
                "two",
                Type::structure(
                    n("nested_struct_two")?,
                    vec![
                        field("u8", Type::u8())?,
                        field("u32", Type::u32())?,
                        field("data", Type::vector(Type::u16()))?,
                    ],
                ),
            )?,
        ],
    ))?;
    let sized_variant = reg.register(Type::variant(
        n("sized_variant")?,
        vec![field("empty", empty_struct.clone())?, field("value", Type::u32())?],
        Sizedness::Sized,
    ))?;
    let unsized_variant = reg.register(Type::variant(
        n("unsized_variant")?,
        vec![field("empty", empty_struct.clone())?, field("value", Type::u32())?],
        Sizedness::Unsized,
    ))?;
    let auto_unsized_variant = reg.register(Type::variant(
        n("auto_unsized_variant")?,
        vec![
            field("empty", empty_struct.clone())?,
            field("value", Type::u32())?,
            field("vector", Type::vector(Type::u32()))?,
        ],
        Sizedness::Auto,
    ))?;
    let struct_of_unsized_variant = reg.register(Type::structure(
        n("struct_of_unsized_variant")?,
        vec![
            field("value", Type::u32())?,
            field("data", auto_unsized_variant.clone())?,
        ],
    ))?;

    let some = |a: u8, b: u16, c: [f32; 2]| {
        Value::structure([
            ("a", Value::U8(a)),
            ("b", Value::U16(b)),
            ("c", Value::list(c.map(Value::F32))),
        ])
    };

    let cases = vec![
        Case::new(
            empty_struct,
            vec![TestVector::with_bytes(Value::unit(), &[])],
        ),
        Case::new(
            Type::array(Type::u32(), 5),
            vec![TestVector::new(u32s(&[0, 1, 2, 3, 0xffff_ffff]))],
        ),
        Case::new(
            some_struct,
            vec![
                TestVector::new(some(0, 0, [0.0, 0.0])),
                TestVector::new(some(0x12, 0x3456, [-1.5, 1e10])),
            ],
        ),
        Case::new(Type::vector(Type::u32()), vec![
            TestVector::with_bytes(u32s(&[]), &[0, 0, 0, 0]),
            TestVector::new(u32s(&[1, 2, 3])),
        ]),
        Case::new(
            Type::vector(Type::i32()),
            vec![TestVector::with_bytes(
                Value::list([Value::I32(7), Value::I32(-1)]),
                &[2, 0, 0, 0, 7, 0, 0, 0, 0xff, 0xff, 0xff, 0xff],
            )],
        ),
        Case::new(
            Type::vector(Type::u64()),
            vec![TestVector::new(Value::list(
                [0, 1, u64::MAX].map(Value::U64),
            ))],
        ),
        Case::new(
            Type::string(),
            vec![
                TestVector::with_bytes(Value::str(""), &[0, 0, 0, 0]),
                TestVector::new(Value::str("abc")),
                TestVector::new(Value::str("Привет, мир!")),
            ],
        ),
        Case::new(
            Type::vector(Type::array(Type::u32(), 2)),
            vec![TestVector::new(Value::list([u32s(&[0, 1]), u32s(&[2, 3])]))],
        ),
        Case::new(
            Type::vector(Type::array(Type::i16(), 3)),
            vec![TestVector::new(Value::list([
                Value::list([-1, 0, 1].map(Value::I16)),
                Value::list([i16::MIN, i16::MAX, 7].map(Value::I16)),
            ]))],
        ),
        Case::new(
            value_struct,
            vec![TestVector::with_bytes(
                Value::structure([("value", Value::U32(0x1234_5678))]),
                &[0x78, 0x56, 0x34, 0x12],
            )],
        ),
        Case::new(
            arrays_struct,
            vec![TestVector::new(Value::structure([
                ("idata", u32s(&[1, 2, 3, 4, 5, 6, 7, 8])),
                ("fdata", Value::list([0.0, -0.5, 3.25, f64::MAX].map(Value::F64))),
            ]))],
        ),
        Case::new(
            int_vector_struct,
            vec![
                TestVector::new(Value::structure([("data", u32s(&[]))])),
                TestVector::new(Value::structure([("data", u32s(&[10, 20, 30]))])),
            ],
        ),
        Case::new(
            float_vector_struct,
            vec![TestVector::new(Value::structure([(
                "data",
                Value::list([1.0, f32::MIN_POSITIVE, -2.5].map(Value::F32)),
            )]))],
        ),
        Case::new(
            string_struct,
            vec![TestVector::new(Value::structure([(
                "text",
                Value::str("hello, wire"),
            )]))],
        ),
        Case::new(
            integers_struct,
            vec![TestVector::new(Value::structure([
                ("u8", Value::U8(u8::MAX)),
                ("u16", Value::U16(u16::MAX)),
                ("u32", Value::U32(u32::MAX)),
                ("u64", Value::U64(u64::MAX)),
                ("i8", Value::I8(i8::MIN)),
                ("i16", Value::I16(i16::MIN)),
                ("i32", Value::I32(i32::MIN)),
                ("i64", Value::I64(i64::MIN)),
            ]))],
        ),
        Case::new(
            floats,
            vec![TestVector::new(Value::structure([
                ("f32", Value::F32(std::f32::consts::PI)),
                ("f64", Value::F64(-std::f64::consts::E)),
            ]))],
        ),
        Case::new(
            vector_of_arrays,
            vec![TestVector::new(Value::structure([(
                "data",
                Value::list([u32s(&[1, 2, 3, 4, 5]), u32s(&[6, 7, 8, 9, 10])]),
            )]))],
        ),
        Case::new(
            vector_of_structs,
            vec![TestVector::new(Value::structure([(
                "data",
                Value::list([some(1, 2, [3.0, 4.0]), some(5, 6, [7.0, 8.0])]),
            )]))],
        ),
        Case::new(
            nested_struct,
            vec![TestVector::new(Value::structure([
                ("u8", Value::U8(1)),
                (
                    "one",
                    Value::structure([("u8", Value::U8(2)), ("u32", Value::U32(3))]),
                ),
                (
                    "two",
                    Value::structure([
                        ("u8", Value::U8(4)),
                        ("u32", Value::U32(5)),
                        ("data", Value::list([6, 7, 8].map(Value::U16))),
                    ]),
                ),
            ]))],
        ),
        Case::new(
            sized_variant,
            vec![
                TestVector::with_bytes(Value::variant("empty", Value::unit()), &[0, 0, 0, 0, 0]),
                TestVector::with_bytes(
                    Value::variant("value", Value::U32(5)),
                    &[1, 5, 0, 0, 0],
                ),
            ],
        ),
        Case::new(
            unsized_variant,
            vec![
                TestVector::with_bytes(Value::variant("empty", Value::unit()), &[0]),
                TestVector::with_bytes(
                    Value::variant("value", Value::U32(5)),
                    &[1, 5, 0, 0, 0],
                ),
            ],
        ),
        Case::new(
            auto_unsized_variant,
            vec![
                TestVector::with_bytes(Value::variant("empty", Value::unit()), &[0]),
                TestVector::new(Value::variant("value", Value::U32(0xdead_beef))),
                TestVector::with_bytes(
                    Value::variant("vector", u32s(&[1, 2])),
                    &[2, 2, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0],
                ),
            ],
        ),
        Case::new(
            struct_of_unsized_variant,
            vec![
                TestVector::new(Value::structure([
                    ("value", Value::U32(1)),
                    ("data", Value::variant("empty", Value::unit())),
                ])),
                TestVector::new(Value::structure([
                    ("value", Value::U32(2)),
                    ("data", Value::variant("vector", u32s(&[3, 4, 5]))),
                ])),
            ],
        ),
    ];

    Ok(Suite {
        registry: reg,
        cases,
    })
}

/// Controller ↔ IOC messages: `InMsg` flows from the device, `OutMsg` towards it.
pub fn device() -> Result<Suite, SchemaError> {
    let mut reg = Registry::new();

    let scalar = |name: &str, ty: Type| -> Result<Type, SchemaError> {
        Ok(Type::structure(n(name)?, vec![field("value", ty)?]))
    };
    let array = |name: &str| -> Result<Type, SchemaError> {
        Ok(Type::structure(n(name)?, vec![field("values", Type::vector(Type::i32()))?]))
    };

    let in_msg = reg.register(Type::variant(
        n("in_msg")?,
        vec![
            field("ai", scalar("ai", Type::i32())?)?,
            field("aai", array("aai")?)?,
            field("waveform", array("waveform")?)?,
            field("bi", scalar("bi", Type::u32())?)?,
            field("mbbi_direct", scalar("mbbi_direct", Type::u32())?)?,
        ],
        Sizedness::Unsized,
    ))?;
    let out_msg = reg.register(Type::variant(
        n("out_msg")?,
        vec![
            field("ao", scalar("ao", Type::i32())?)?,
            field("aao", array("aao")?)?,
            field("bo", scalar("bo", Type::u32())?)?,
            field("mbbo_direct", scalar("mbbo_direct", Type::u32())?)?,
        ],
        Sizedness::Unsized,
    ))?;

    let value = |v: Value| Value::structure([("value", v)]);
    let values = |v: &[i32]| Value::structure([("values", i32s(v))]);

    let cases = vec![
        Case::new(
            in_msg,
            vec![
                TestVector::with_bytes(
                    Value::variant("ai", value(Value::I32(-2))),
                    &[0, 0xfe, 0xff, 0xff, 0xff],
                ),
                TestVector::new(Value::variant("aai", values(&[1, -1, 1 << 20]))),
                TestVector::new(Value::variant("waveform", values(&[]))),
                TestVector::new(Value::variant("bi", value(Value::U32(1)))),
                TestVector::new(Value::variant("mbbi_direct", value(Value::U32(0b1010)))),
            ],
        ),
        Case::new(
            out_msg,
            vec![
                TestVector::new(Value::variant("ao", value(Value::I32(i32::MAX)))),
                TestVector::with_bytes(
                    Value::variant("aao", values(&[3])),
                    &[1, 1, 0, 0, 0, 3, 0, 0, 0],
                ),
                TestVector::new(Value::variant("bo", value(Value::U32(0)))),
                TestVector::new(Value::variant("mbbo_direct", value(Value::U32(u32::MAX)))),
            ],
        ),
    ];

    Ok(Suite {
        registry: reg,
        cases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn catalog_schemas_register() {
        for name in SCHEMAS {
            let suite = by_name(name).unwrap().unwrap();
            assert!(!suite.registry.is_empty());
            assert!(suite.vector_count() > 0);
        }
        assert!(by_name("nope").is_none());
    }

    #[test]
    fn catalog_vectors_match_reference_codec() {
        for name in SCHEMAS {
            let suite = by_name(name).unwrap().unwrap();
            let codec = Codec::new(&suite.registry);
            for case in &suite.cases {
                let ty = suite.registry.lower(&case.root).unwrap();
                for vector in &case.vectors {
                    let bytes = codec.encode(&ty, &vector.value).unwrap();
                    if let Some(expected) = &vector.expected {
                        assert_eq!(&bytes, expected, "{name}: {ty}");
                    }
                    let (decoded, used) = codec.decode(&ty, &bytes).unwrap();
                    assert_eq!(used, bytes.len());
                    assert_eq!(decoded, vector.value);
                }
            }
        }
    }

    #[test]
    fn nested_inline_structs_are_hoisted() {
        let suite = codegen_test().unwrap();
        assert!(suite.registry.get("nested_struct_one").is_some());
        assert!(suite.registry.get("nested_struct_two").is_some());
    }
}
