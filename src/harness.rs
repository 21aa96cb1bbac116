//! Verification harness: compiles generated code together with a driver program and
//! checks it against test vectors.
//!
//! The harness stages a small build tree (`Cargo.toml`, `src/<module>.rs`,
//! `src/main.rs`), hands it to a [`Toolchain`] and parses the driver's per-vector
//! `PASS` / `FAIL` lines into a [`VerificationReport`].

use crate::codec::{Codec, CodecError};
use crate::generator::{
    Backend, DriverCase, DriverVector, GenerationError, Generator, GeneratorConfig, RustBackend,
};
use crate::ir::Ty;
use crate::registry::{Registry, SchemaError};
use crate::schema::Type;
use crate::value::Value;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    #[error("Schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("Generation: {0}")]
    Generation(#[from] GenerationError),
    #[error("Codec: {0}")]
    Codec(#[from] CodecError),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// One literal value of a root type, with the bytes it must encode to (if known).
#[derive(Debug, Clone, PartialEq)]
pub struct TestVector {
    pub value: Value,
    pub expected: Option<Vec<u8>>,
}

impl TestVector {
    pub fn new(value: Value) -> Self {
        TestVector {
            value,
            expected: None,
        }
    }

    pub fn with_bytes(value: Value, expected: &[u8]) -> Self {
        TestVector {
            value,
            expected: Some(expected.to_vec()),
        }
    }
}

/// A root type and its vectors. The root may be a named reference or an anonymous type.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub root: Type,
    pub vectors: Vec<TestVector>,
}

impl Case {
    pub fn new(root: Type, vectors: Vec<TestVector>) -> Self {
        Case { root, vectors }
    }
}

/// A registry plus the cases to verify against it.
#[derive(Debug, Default)]
pub struct Suite {
    pub registry: Registry,
    pub cases: Vec<Case>,
}

impl Suite {
    pub fn vector_count(&self) -> usize {
        self.cases.iter().map(|c| c.vectors.len()).sum()
    }
}

/// Identity of one vector in the driver's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorId {
    /// Registry key for named roots, the type's spelling otherwise.
    pub label: String,
    /// Position of the vector within the whole suite.
    pub index: usize,
}

/// Files staged for one verification run.
#[derive(Debug, Clone)]
pub struct BuildTree {
    pub root: PathBuf,
    pub module: PathBuf,
    pub driver: PathBuf,
    pub vectors: Vec<VectorId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainOutput {
    pub compiled: bool,
    /// Exit code of the driver, or of the compiler when compilation failed.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Builds and runs a staged tree.
pub trait Toolchain {
    fn name(&self) -> &str;

    fn build_and_run(&self, tree: &BuildTree) -> Result<ToolchainOutput, HarnessError>;
}

/// Compiles the driver with a plain `rustc` invocation and runs the binary.
#[derive(Debug, Clone)]
pub struct Rustc {
    program: PathBuf,
    flags: Vec<OsString>,
}

impl Default for Rustc {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Rustc {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Rustc {
            program: program.into(),
            flags: Vec::new(),
        }
    }

    /// Uses `$RUSTC`, falling back to `rustc` on the `PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("RUSTC").unwrap_or_else(|| OsString::from("rustc")))
    }

    /// Extra compiler flags, e.g. `-O`.
    pub fn flag(mut self, flag: impl Into<OsString>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn(&self, cmd: &mut Command, program: &Path) -> Result<std::process::Output, HarnessError> {
        cmd.output().map_err(|source| HarnessError::Spawn {
            program: program.display().to_string(),
            source,
        })
    }
}

impl Toolchain for Rustc {
    fn name(&self) -> &str {
        "rustc"
    }

    fn build_and_run(&self, tree: &BuildTree) -> Result<ToolchainOutput, HarnessError> {
        let target = tree.root.join("target");
        fs::create_dir_all(&target)?;
        let exe = target.join(format!("driver{}", std::env::consts::EXE_SUFFIX));

        let mut compile = Command::new(&self.program);
        compile
            .arg("--edition=2021")
            .args(&self.flags)
            .arg("-o")
            .arg(&exe)
            .arg(&tree.driver)
            .current_dir(&tree.root);
        debug!(program = %self.program.display(), exe = %exe.display(), "compiling driver");
        let built = self.spawn(&mut compile, &self.program)?;
        if !built.status.success() {
            return Ok(ToolchainOutput {
                compiled: false,
                status: built.status.code(),
                stdout: String::from_utf8_lossy(&built.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&built.stderr).into_owned(),
            });
        }

        let ran = self.spawn(Command::new(&exe).current_dir(&tree.root), &exe)?;
        Ok(ToolchainOutput {
            compiled: true,
            status: ran.status.code(),
            stdout: String::from_utf8_lossy(&ran.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&ran.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Name of the generated module inside the build tree.
    pub module: String,
    /// Fill in missing expected bytes from the reference codec.
    pub reference_bytes: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            module: GeneratorConfig::default().module,
            reference_bytes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorOutcome {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorResult {
    pub id: VectorId,
    pub outcome: VectorOutcome,
}

impl VectorResult {
    pub fn passed(&self) -> bool {
        self.outcome == VectorOutcome::Passed
    }
}

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub toolchain: String,
    pub results: Vec<VectorResult>,
    pub output: ToolchainOutput,
}

impl VerificationReport {
    fn from_output(toolchain: &str, tree: &BuildTree, output: ToolchainOutput) -> Self {
        let mut reported: HashMap<VectorId, VectorOutcome> = HashMap::new();
        if output.compiled {
            for line in output.stdout.lines() {
                if let Some((id, outcome)) = parse_result_line(line) {
                    reported.insert(id, outcome);
                }
            }
        }

        let results = tree
            .vectors
            .iter()
            .map(|id| {
                let outcome = if !output.compiled {
                    VectorOutcome::Failed("driver did not compile".to_string())
                } else {
                    reported
                        .remove(id)
                        .unwrap_or_else(|| VectorOutcome::Failed("no result reported".to_string()))
                };
                VectorResult {
                    id: id.clone(),
                    outcome,
                }
            })
            .collect();

        VerificationReport {
            toolchain: toolchain.to_string(),
            results,
            output,
        }
    }

    pub fn compiled(&self) -> bool {
        self.output.compiled
    }

    pub fn success(&self) -> bool {
        self.output.compiled && self.output.status == Some(0) && self.results.iter().all(VectorResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &VectorResult> + '_ {
        self.results.iter().filter(|r| !r.passed())
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }
}

/// `PASS <label> <index>` or `FAIL <label> <index> <detail>`.
fn parse_result_line(line: &str) -> Option<(VectorId, VectorOutcome)> {
    let mut parts = line.splitn(4, ' ');
    let kind = parts.next()?;
    let label = parts.next()?.to_string();
    let index = parts.next()?.parse().ok()?;
    let outcome = match kind {
        "PASS" => VectorOutcome::Passed,
        "FAIL" => VectorOutcome::Failed(parts.next().unwrap_or_default().to_string()),
        _ => return None,
    };
    Some((VectorId { label, index }, outcome))
}

const BUILD_MANIFEST: &str = r#"[package]
name = "wiregen-verify"
version = "0.0.0"
edition = "2021"
publish = false

[[bin]]
name = "driver"
path = "src/main.rs"

[workspace]
"#;

pub struct Harness<T> {
    toolchain: T,
    config: HarnessConfig,
    generator: Generator<RustBackend>,
}

impl<T: Toolchain> Harness<T> {
    pub fn new(toolchain: T, config: HarnessConfig) -> Self {
        let generator = Generator::new(
            RustBackend::new(),
            GeneratorConfig {
                module: config.module.clone(),
            },
        );
        Harness {
            toolchain,
            config,
            generator,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Generate the module and driver for `suite` and write them under `dir`.
    pub fn stage(&self, suite: &Suite, dir: &Path) -> Result<BuildTree, HarnessError> {
        let registry = &suite.registry;
        let roots: Vec<Type> = suite.cases.iter().map(|c| c.root.clone()).collect();
        let closure = registry.closure(&roots)?;
        let module = self.generator.generate(&closure)?;

        let tys = closure.roots();
        let codec = Codec::new(registry);
        let mut expected_bytes: Vec<Vec<Option<Vec<u8>>>> = Vec::with_capacity(suite.cases.len());
        for (case, ty) in suite.cases.iter().zip(tys) {
            let mut bytes = Vec::with_capacity(case.vectors.len());
            for vector in &case.vectors {
                bytes.push(match &vector.expected {
                    Some(b) => Some(b.clone()),
                    None if self.config.reference_bytes => Some(codec.encode(ty, &vector.value)?),
                    None => None,
                });
            }
            expected_bytes.push(bytes);
        }

        let mut ids = Vec::with_capacity(suite.vector_count());
        let mut cases = Vec::with_capacity(suite.cases.len());
        for ((case, ty), bytes) in suite.cases.iter().zip(tys).zip(&expected_bytes) {
            let label = root_label(ty);
            let mut vectors = Vec::with_capacity(case.vectors.len());
            for (vector, expected) in case.vectors.iter().zip(bytes) {
                let index = ids.len();
                ids.push(VectorId {
                    label: label.clone(),
                    index,
                });
                vectors.push(DriverVector {
                    index,
                    value: &vector.value,
                    expected: expected.as_deref(),
                });
            }
            cases.push(DriverCase { label, ty, vectors });
        }
        let driver = self
            .generator
            .backend()
            .driver(&self.config.module, &cases, registry)?;

        let src = dir.join("src");
        fs::create_dir_all(&src)?;
        fs::write(dir.join("Cargo.toml"), BUILD_MANIFEST)?;
        let module_path = src.join(&module.file_name);
        fs::write(&module_path, module.contents)?;
        let driver_path = src.join(&driver.file_name);
        fs::write(&driver_path, driver.contents)?;
        info!(
            dir = %dir.display(),
            types = closure.len(),
            vectors = ids.len(),
            "staged build tree"
        );

        Ok(BuildTree {
            root: dir.to_path_buf(),
            module: module_path,
            driver: driver_path,
            vectors: ids,
        })
    }

    /// Stage, build and run `suite`, collecting per-vector results.
    pub fn verify(&self, suite: &Suite, dir: &Path) -> Result<VerificationReport, HarnessError> {
        let tree = self.stage(suite, dir)?;
        let output = self.toolchain.build_and_run(&tree)?;
        if !output.compiled {
            warn!(toolchain = self.toolchain.name(), "generated code did not compile");
        }
        let report = VerificationReport::from_output(self.toolchain.name(), &tree, output);
        for failure in report.failures() {
            if let VectorOutcome::Failed(detail) = &failure.outcome {
                warn!(ty = %failure.id.label, vector = failure.id.index, %detail, "vector failed");
            }
        }
        info!(
            toolchain = %report.toolchain,
            passed = report.passed(),
            total = report.results.len(),
            success = report.success(),
            "verification finished"
        );
        Ok(report)
    }
}

fn root_label(ty: &Ty) -> String {
    match ty {
        Ty::Named(name) => name.key(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pass_and_fail_lines() {
        let (id, outcome) = parse_result_line("PASS some_struct 3").unwrap();
        assert_eq!(
            id,
            VectorId {
                label: "some_struct".to_string(),
                index: 3
            }
        );
        assert_eq!(outcome, VectorOutcome::Passed);

        let (_, outcome) = parse_result_line("FAIL vector<i32> 0 encoded [01], expected [02]").unwrap();
        assert_eq!(outcome, VectorOutcome::Failed("encoded [01], expected [02]".to_string()));

        assert!(parse_result_line("DONE 0").is_none());
        assert!(parse_result_line("").is_none());
    }

    fn tree(ids: &[(&str, usize)]) -> BuildTree {
        BuildTree {
            root: PathBuf::from("."),
            module: PathBuf::from("src/proto.rs"),
            driver: PathBuf::from("src/main.rs"),
            vectors: ids
                .iter()
                .map(|(label, index)| VectorId {
                    label: label.to_string(),
                    index: *index,
                })
                .collect(),
        }
    }

    #[test]
    fn unreported_vectors_fail() {
        let output = ToolchainOutput {
            compiled: true,
            status: Some(0),
            stdout: "PASS a 0\n".to_string(),
            stderr: String::new(),
        };
        let report = VerificationReport::from_output("fake", &tree(&[("a", 0), ("b", 1)]), output);
        assert!(!report.success());
        let failures: Vec<_> = report.failures().map(|r| r.id.label.as_str()).collect();
        assert_eq!(failures, vec!["b"]);
    }

    #[test]
    fn compile_failure_fails_every_vector() {
        let output = ToolchainOutput {
            compiled: false,
            status: Some(1),
            stdout: "PASS a 0\n".to_string(),
            stderr: "error[E0308]: mismatched types".to_string(),
        };
        let report = VerificationReport::from_output("fake", &tree(&[("a", 0)]), output);
        assert!(!report.success());
        assert_eq!(report.failures().count(), 1);
        assert!(report.output.stderr.contains("E0308"));
    }
}
