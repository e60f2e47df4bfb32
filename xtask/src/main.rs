use anyhow::Context;
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Repo automation for clientbench")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// (Re)generate JSON Schemas for receipts, reports and config.
    Schema {
        /// Output directory
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },

    /// Validate checked-in runs receipt fixtures against the runs schema.
    Fixtures {
        /// Glob for fixture files
        #[arg(long, default_value = "crates/*/tests/fixtures/runs_*.json")]
        pattern: String,
    },

    /// Run the "usual" repo checks (fmt, clippy, test, schema, fixtures).
    Ci,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Schema { out_dir } => cmd_schema(&out_dir),
        Command::Fixtures { pattern } => cmd_fixtures(&pattern),
        Command::Ci => cmd_ci(),
    }
}

fn cmd_ci() -> anyhow::Result<()> {
    run("cargo", ["fmt", "--all", "--", "--check"])?;
    run(
        "cargo",
        ["clippy", "--all-targets", "--all-features", "--", "-D", "warnings"],
    )?;
    run("cargo", ["test", "--workspace"])?;
    run("cargo", ["run", "-p", "xtask", "--", "schema"])?;
    run("cargo", ["run", "-p", "xtask", "--", "fixtures"])?;
    Ok(())
}

fn run<const N: usize>(bin: &str, args: [&str; N]) -> anyhow::Result<()> {
    let status = std::process::Command::new(bin)
        .args(args)
        .status()
        .with_context(|| format!("running {bin}"))?;
    if !status.success() {
        anyhow::bail!("{bin} failed: {status}");
    }
    Ok(())
}

fn cmd_schema(out_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("create dir {}", out_dir.display()))?;

    write_schema(
        out_dir,
        "clientbench.workload.v1.schema.json",
        schema_for!(clientbench_types::WorkloadReceipt),
    )?;

    write_schema(
        out_dir,
        "clientbench.runs.v1.schema.json",
        schema_for!(clientbench_types::RunsReceipt),
    )?;

    write_schema(
        out_dir,
        "clientbench.report.v1.schema.json",
        schema_for!(clientbench_types::BenchReport),
    )?;

    write_schema(
        out_dir,
        "clientbench.config.v1.schema.json",
        schema_for!(clientbench_types::ConfigFile),
    )?;

    Ok(())
}

fn write_schema<T: serde::Serialize>(out_dir: &Path, name: &str, schema: T) -> anyhow::Result<()> {
    let path = out_dir.join(name);
    let json = serde_json::to_vec_pretty(&schema)?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn cmd_fixtures(pattern: &str) -> anyhow::Result<()> {
    let schema = serde_json::to_value(schema_for!(clientbench_types::RunsReceipt))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| anyhow::anyhow!("invalid runs schema: {e}"))?;

    let mut checked = 0usize;
    let mut failures = Vec::new();

    for entry in glob::glob(pattern).with_context(|| format!("bad glob {pattern}"))? {
        let path = entry?;
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let instance: serde_json::Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse json {}", path.display()))?;

        for err in validator.iter_errors(&instance) {
            failures.push(format!("{}: {} at {}", path.display(), err, err.instance_path));
        }
        checked += 1;
    }

    if checked == 0 {
        anyhow::bail!("no fixtures matched {pattern}");
    }
    if !failures.is_empty() {
        anyhow::bail!("schema violations:\n{}", failures.join("\n"));
    }

    println!("{checked} fixture(s) valid");
    Ok(())
}
