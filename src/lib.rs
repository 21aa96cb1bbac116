//! # wiregen: schema-driven binary protocol compiler
//!
//! Protocol types are described once with an in-memory type algebra and compiled into
//! Rust source with matching encode / decode routines. A verification harness compiles
//! the generated code and runs it against test vectors.
//!
//! ## Pipeline
//!
//! - **Schema** ([`schema`]): integers, floats, arrays, vectors, strings, structs and
//!   variants, with multi-word [`Name`]s.
//! - **Registry** ([`registry`]): append-only store of named types. Inline structs and
//!   variants are hoisted; references must already be registered, so the graph is acyclic.
//! - **Layout** ([`layout`]): every type is `Sized(n)` or `Unsized`; unsized data may
//!   only appear as the last field of a struct.
//! - **Generator** ([`generator`]): emits a declaration plus `encode_into`,
//!   `encoded_len` and `decode` for every named type in a closure.
//! - **Harness** ([`harness`]): stages the generated module with a driver, builds it
//!   with a [`Toolchain`](harness::Toolchain) and reports per-vector results.
//!
//! ## Wire format
//!
//! Little-endian scalars; vectors and strings carry a `u32` element/byte count;
//! struct fields follow each other in declaration order; a variant is a 1, 2 or 4 byte
//! discriminant followed by the member payload, zero-padded to the widest member when
//! the variant is sized. The [`codec`] module interprets this format directly and is
//! the reference the generated code is checked against.
//!
//! ## Example
//!
//! ```
//! use wiregen::{Codec, Field, Name, Registry, Type, Value};
//!
//! let mut registry = Registry::new();
//! let pair = registry
//!     .register(Type::structure(
//!         Name::parse("pair").unwrap(),
//!         vec![
//!             Field::new(Name::parse("a").unwrap(), Type::u8()),
//!             Field::new(Name::parse("b").unwrap(), Type::u16()),
//!         ],
//!     ))
//!     .unwrap();
//! let ty = registry.lower(&pair).unwrap();
//! let value = Value::structure([("a", Value::U8(1)), ("b", Value::U16(300))]);
//! let bytes = Codec::new(&registry).encode(&ty, &value).unwrap();
//! assert_eq!(bytes, [0x01, 0x2c, 0x01]);
//! ```

pub mod catalog;
pub mod codec;
pub mod generator;
pub mod harness;
pub mod ir;
pub mod layout;
pub mod name;
pub mod registry;
pub mod schema;
pub mod value;

pub use codec::{Codec, CodecError};
pub use generator::{Backend, GenerationError, Generator, GeneratorConfig, RustBackend};
pub use harness::{
    Case, Harness, HarnessConfig, HarnessError, Rustc, Suite, TestVector, Toolchain,
    VerificationReport,
};
pub use ir::{DefKind, Definition, Ty};
pub use layout::Layout;
pub use name::{Name, NameError};
pub use registry::{Closure, Registry, SchemaError};
pub use schema::{Field, Sizedness, Type};
pub use value::Value;
