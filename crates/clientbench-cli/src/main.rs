use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use clientbench_adapters::{StdAdapterFactory, StdHostProbe};
use clientbench_app::{
    github_annotations, render_markdown, render_table, resolve_config, std_probe, BenchConfig,
    BenchRequest, BenchUseCase, ConfigOverrides, ExportFormat, ExportUseCase, ReportRequest,
    ReportUseCase, SystemClock,
};
use clientbench_domain::generate_workload;
use clientbench_types::{
    BenchReport, ConfigFile, RunsReceipt, ToolInfo, VerdictStatus, WorkloadReceipt,
    WORKLOAD_SCHEMA_V1,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "clientbench",
    version,
    about = "Compare HTTP client libraries under identical load, for CI"
)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Command,
}

/// Bench settings. Each flag overrides the config file, which overrides defaults.
#[derive(Debug, Clone, Args)]
struct BenchArgs {
    /// TOML config file ([bench], [[endpoint]], [[payload]])
    #[arg(long, env = "CLIENTBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the echo server
    #[arg(long, env = "CLIENTBENCH_TARGET_URL")]
    target: Option<String>,

    /// Requests per adapter
    #[arg(long, env = "CLIENTBENCH_REQUEST_COUNT")]
    requests: Option<u32>,

    /// Max in-flight requests per adapter
    #[arg(long, env = "CLIENTBENCH_CONCURRENCY")]
    concurrency: Option<u32>,

    /// Per-request timeout (e.g. "5s")
    #[arg(long, env = "CLIENTBENCH_REQUEST_TIMEOUT", value_parser = parse_duration)]
    request_timeout: Option<Duration>,

    /// Wall-clock budget for one adapter run (e.g. "5m")
    #[arg(long, env = "CLIENTBENCH_RUN_TIMEOUT", value_parser = parse_duration)]
    run_timeout: Option<Duration>,

    /// Timeout for the pre-run liveness check
    #[arg(long, env = "CLIENTBENCH_LIVENESS_TIMEOUT", value_parser = parse_duration)]
    liveness_timeout: Option<Duration>,

    /// Minimum fraction of successful requests per adapter (0.0 to 1.0)
    #[arg(long, env = "CLIENTBENCH_MIN_SUCCESS_RATE")]
    min_success_rate: Option<f64>,

    /// Workload seed
    #[arg(long, env = "CLIENTBENCH_SEED")]
    seed: Option<u64>,

    /// Pause between adapter runs
    #[arg(long, env = "CLIENTBENCH_COOLDOWN", value_parser = parse_duration)]
    cooldown: Option<Duration>,

    /// Resource sampling interval
    #[arg(long, env = "CLIENTBENCH_SAMPLE_INTERVAL", value_parser = parse_duration)]
    sample_interval: Option<Duration>,

    /// Adapters to run, in order. Repeatable or comma-separated.
    #[arg(long = "adapter", env = "CLIENTBENCH_ADAPTERS", value_delimiter = ',')]
    adapters: Vec<String>,

    /// Adapter the others are compared against (default: first)
    #[arg(long, env = "CLIENTBENCH_BASELINE")]
    baseline: Option<String>,
}

impl BenchArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            target: self.target.clone(),
            request_count: self.requests,
            concurrency: self.concurrency,
            request_timeout: self.request_timeout,
            run_timeout: self.run_timeout,
            liveness_timeout: self.liveness_timeout,
            min_success_rate: self.min_success_rate,
            seed: self.seed,
            cooldown: self.cooldown,
            sample_interval: self.sample_interval,
            adapters: if self.adapters.is_empty() {
                None
            } else {
                Some(self.adapters.clone())
            },
            baseline: self.baseline.clone(),
        }
    }

    fn resolve(&self) -> anyhow::Result<BenchConfig> {
        let file = match &self.config {
            Some(path) => read_config(path)?,
            None => ConfigFile::default(),
        };
        let cfg = resolve_config(&file, &self.overrides()).context("invalid configuration")?;

        for name in &cfg.adapters {
            name.parse::<clientbench_adapters::AdapterKind>()
                .context("invalid configuration")?;
        }

        Ok(cfg)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every adapter against the target and emit a report (JSON).
    Run {
        #[command(flatten)]
        bench: BenchArgs,

        /// Report output path
        #[arg(long, default_value = "clientbench-report.json")]
        out: PathBuf,

        /// Also write the raw runs receipt (for `summarize`)
        #[arg(long)]
        runs_out: Option<PathBuf>,

        /// Also write a Markdown summary
        #[arg(long)]
        md: Option<PathBuf>,

        /// Pretty-print JSON
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Recompute a report from a runs receipt.
    Summarize {
        #[arg(long)]
        runs: PathBuf,

        /// Report output path
        #[arg(long, default_value = "clientbench-report.json")]
        out: PathBuf,

        /// Pretty-print JSON
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Emit the generated workload (JSON).
    Workload {
        #[command(flatten)]
        bench: BenchArgs,

        /// Output path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Render a Markdown summary from a report.
    Md {
        #[arg(long)]
        report: PathBuf,

        /// Output markdown path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Emit GitHub Actions annotations from a report.
    GithubAnnotations {
        #[arg(long)]
        report: PathBuf,
    },

    /// Export a report as CSV or JSONL, one record per adapter per summary field.
    Export {
        #[arg(long)]
        report: PathBuf,

        /// csv or jsonl
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Output path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.cmd {
        Command::Run {
            bench,
            out,
            runs_out,
            md,
            pretty,
        } => {
            let config = bench.resolve()?;
            tracing::debug!(?config, "resolved configuration");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;

            let usecase = BenchUseCase::new(
                StdAdapterFactory,
                SystemClock,
                StdHostProbe,
                Box::new(std_probe),
                tool_info(),
            );
            let outcome = runtime.block_on(usecase.execute(BenchRequest { config }))?;

            write_json(&out, &outcome.report, pretty)?;
            if let Some(path) = runs_out {
                write_json(&path, &outcome.receipt, pretty)?;
            }
            if let Some(path) = md {
                write_text(&path, &render_markdown(&outcome.report))?;
            }

            print!("{}", render_table(&outcome.report));
            Ok(verdict_exit(&outcome.report))
        }

        Command::Summarize { runs, out, pretty } => {
            let receipt: RunsReceipt = read_json(&runs)?;
            let report = ReportUseCase::execute(ReportRequest { receipt })
                .with_context(|| format!("summarize {}", runs.display()))?
                .report;

            write_json(&out, &report, pretty)?;
            print!("{}", render_table(&report));
            Ok(verdict_exit(&report))
        }

        Command::Workload { bench, out } => {
            let config = bench.resolve()?;
            let workload = generate_workload(&config.workload_config())
                .context("failed to generate workload")?;

            let receipt = WorkloadReceipt {
                schema: WORKLOAD_SCHEMA_V1.to_string(),
                tool: tool_info(),
                workload,
            };

            match out {
                Some(path) => write_json(&path, &receipt, true)?,
                None => println!("{}", serde_json::to_string_pretty(&receipt)?),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Md { report, out } => {
            let report: BenchReport = read_json(&report)?;
            let md = render_markdown(&report);

            match out {
                Some(path) => write_text(&path, &md)?,
                None => print!("{md}"),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::GithubAnnotations { report } => {
            let report: BenchReport = read_json(&report)?;
            for line in github_annotations(&report) {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Export {
            report,
            format,
            out,
        } => {
            let report: BenchReport = read_json(&report)?;
            let text = ExportUseCase::export(&report, format)?;

            match out {
                Some(path) => write_text(&path, &text)?,
                None => print!("{text}"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn verdict_exit(report: &BenchReport) -> ExitCode {
    match report.verdict.status {
        VerdictStatus::Pass => ExitCode::SUCCESS,
        VerdictStatus::Fail => ExitCode::from(2),
    }
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "clientbench".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

fn read_config(path: &Path) -> anyhow::Result<ConfigFile> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str(&text).with_context(|| format!("parse toml {}", path.display()))?;
    Ok(cfg)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let v =
        serde_json::from_slice(&bytes).with_context(|| format!("parse json {}", path.display()))?;
    Ok(v)
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T, pretty: bool) -> anyhow::Result<()> {
    ensure_parent(path)?;

    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };

    atomic_write(path, &bytes)
}

fn write_text(path: &Path, text: &str) -> anyhow::Result<()> {
    ensure_parent(path)?;
    atomic_write(path, text.as_bytes())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
