//! Code generation: emits declarations and codecs for an ordered type closure.
//!
//! The [`Generator`] walks a [`Closure`] leaves-first and asks a [`Backend`] to emit,
//! per named type, a declaration plus encode / size / decode routines that follow the
//! wire rules of the [layout](crate::layout) module. Named types nested anywhere are
//! emitted as calls into that type's own codec; anonymous composites are inlined.

pub mod rust;
mod writer;

pub use rust::RustBackend;
pub use writer::CodeWriter;

use crate::ir::{Definition, Ty};
use crate::name::Name;
use crate::registry::{Closure, Registry, SchemaError};
use crate::value::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{backend}: cannot represent {ty}: {reason}")]
    Unrepresentable {
        backend: &'static str,
        ty: String,
        reason: String,
    },
    #[error("{backend}: value does not fit {ty}: {reason}")]
    Literal {
        backend: &'static str,
        ty: String,
        reason: String,
    },
    #[error("Schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Output naming for one generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Module (and file stem) of the generated source.
    pub module: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            module: "proto".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
    pub file_name: String,
    pub contents: String,
}

/// One test vector as seen by a driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverVector<'a> {
    pub index: usize,
    pub value: &'a Value,
    pub expected: Option<&'a [u8]>,
}

/// All vectors for one root type.
#[derive(Debug, Clone)]
pub struct DriverCase<'a> {
    /// Registry key for named roots, the type's spelling for anonymous ones.
    pub label: String,
    pub ty: &'a Ty,
    pub vectors: Vec<DriverVector<'a>>,
}

/// A target language.
pub trait Backend {
    fn name(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    /// Runtime support emitted once at the top of the generated module.
    fn prelude(&self, w: &mut CodeWriter);

    /// Declaration and codec routines for one named type.
    fn definition(
        &self,
        def: &Definition,
        registry: &Registry,
        w: &mut CodeWriter,
    ) -> Result<(), GenerationError>;

    /// Target-language expression constructing `value`.
    fn literal(&self, ty: &Ty, value: &Value, registry: &Registry) -> Result<String, GenerationError>;

    /// Test program checking every vector against the generated module `module`.
    fn driver(
        &self,
        module: &str,
        cases: &[DriverCase<'_>],
        registry: &Registry,
    ) -> Result<GeneratedSource, GenerationError>;
}

#[derive(Debug, Clone, Default)]
pub struct Generator<B> {
    backend: B,
    config: GeneratorConfig,
}

impl<B: Backend> Generator<B> {
    pub fn new(backend: B, config: GeneratorConfig) -> Self {
        Generator { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.config.module, self.backend.file_extension())
    }

    pub fn generate(&self, closure: &Closure<'_>) -> Result<GeneratedSource, GenerationError> {
        if Name::parse(&self.config.module).is_err() {
            return Err(GenerationError::Unrepresentable {
                backend: self.backend.name(),
                ty: self.config.module.clone(),
                reason: "module name must be lowercase snake case".to_string(),
            });
        }
        let mut w = CodeWriter::new();
        self.backend.prelude(&mut w);
        for def in closure.definitions() {
            debug!(name = %def.name, backend = self.backend.name(), "emitting type");
            w.blank();
            self.backend.definition(def, closure.registry(), &mut w)?;
        }
        Ok(GeneratedSource {
            file_name: self.file_name(),
            contents: w.finish(),
        })
    }

    /// Generate and write the module into `dir`, creating it if needed.
    pub fn write(&self, closure: &Closure<'_>, dir: &Path) -> Result<PathBuf, GenerationError> {
        let source = self.generate(closure)?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&source.file_name);
        std::fs::write(&path, source.contents)?;
        info!(path = %path.display(), types = closure.len(), "wrote generated module");
        Ok(path)
    }
}
