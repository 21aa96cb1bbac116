//! Generate codecs for the built-in schemas and verify them with the host compiler.
//!
//! Usage:
//!   wiregen generate --schema codegen-test --out DIR [--module NAME]
//!   wiregen verify --schema device --target-dir DIR [--rustc PATH]
//!   wiregen layouts --schema codegen-test
//!
//! `verify` exits non-zero if any vector fails; failures are printed to stderr as
//! `FAIL<TAB>type<TAB>vector<TAB>detail`. Log level follows `RUST_LOG` (default `info`).

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wiregen::catalog;
use wiregen::harness::VectorOutcome;
use wiregen::{
    DefKind, Generator, GeneratorConfig, Harness, HarnessConfig, Layout, Rustc, RustBackend, Suite,
};

#[derive(Parser, Debug)]
#[command(name = "wiregen", version, about = "Binary protocol code generator")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// write the generated module for a schema
    Generate {
        /// built-in schema (codegen-test, device)
        #[arg(long)]
        schema: String,
        /// output directory, created if missing
        #[arg(long)]
        out: PathBuf,
        /// module name of the generated file
        #[arg(long, default_value = "proto")]
        module: String,
    },
    /// generate, compile and run the schema's test vectors
    Verify {
        #[arg(long)]
        schema: String,
        /// build tree location
        #[arg(long)]
        target_dir: PathBuf,
        /// compiler to use instead of $RUSTC / rustc
        #[arg(long)]
        rustc: Option<PathBuf>,
    },
    /// print the layout of every registered type
    Layouts {
        #[arg(long)]
        schema: String,
    },
}

fn load(schema: &str) -> anyhow::Result<Suite> {
    let suite = catalog::by_name(schema).ok_or_else(|| {
        anyhow!(
            "unknown schema {schema:?} (expected one of: {})",
            catalog::SCHEMAS.join(", ")
        )
    })?;
    suite.with_context(|| format!("building schema {schema}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Generate {
            schema,
            out,
            module,
        } => {
            let suite = load(&schema)?;
            let generator = Generator::new(RustBackend::new(), GeneratorConfig { module });
            let path = generator
                .write(&suite.registry.full_closure(), &out)
                .with_context(|| format!("generating into {}", out.display()))?;
            println!("{}", path.display());
        }
        Command::Verify {
            schema,
            target_dir,
            rustc,
        } => {
            let suite = load(&schema)?;
            let toolchain = rustc.map(Rustc::new).unwrap_or_else(Rustc::from_env);
            let harness = Harness::new(toolchain, HarnessConfig::default());
            let report = harness
                .verify(&suite, &target_dir)
                .with_context(|| format!("verifying {schema}"))?;
            if !report.compiled() {
                eprint!("{}", report.output.stderr);
            }
            for failure in report.failures() {
                let detail = match &failure.outcome {
                    VectorOutcome::Failed(detail) => detail.as_str(),
                    VectorOutcome::Passed => "",
                };
                eprintln!("FAIL\t{}\t{}\t{}", failure.id.label, failure.id.index, detail);
            }
            println!("{}/{} vectors passed", report.passed(), report.results.len());
            if !report.success() {
                bail!("verification of {schema} failed");
            }
        }
        Command::Layouts { schema } => {
            let suite = load(&schema)?;
            for def in suite.registry.definitions() {
                let kind = match def.kind {
                    DefKind::Struct { .. } => "struct",
                    DefKind::Variant { .. } => "variant",
                };
                let layout = match def.layout {
                    Layout::Sized(n) => format!("sized {n}"),
                    Layout::Unsized => "unsized".to_string(),
                };
                println!("{}\t{}\t{}", def.name, kind, layout);
            }
        }
    }
    Ok(())
}
