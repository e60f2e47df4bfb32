//! Application layer for clientbench.
//!
//! The app layer coordinates adapters and domain logic.
//! It does not parse CLI flags and it does not do filesystem I/O.

mod bench;
pub mod config;
mod export;
mod harness;
mod report;

pub use bench::{BenchOutcome, BenchRequest, BenchUseCase, ProbeFactory, std_probe};
pub use config::{BenchConfig, ConfigError, ConfigOverrides, resolve_config};
pub use export::{ExportFormat, ExportRow, ExportUseCase};
pub use harness::{Harness, HarnessSettings};
pub use report::{ReportRequest, ReportResult, ReportUseCase};

use clientbench_types::{AdapterStatus, BenchReport, CompareMetric, RunOutcome, VerdictStatus};

pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

// ----------------------------
// Rendering helpers
// ----------------------------

/// Fixed-width comparison table for the terminal.
pub fn render_table(report: &BenchReport) -> String {
    let header = [
        "adapter", "status", "ok/total", "success", "p50 ms", "p90 ms", "p99 ms", "mean ms",
        "req/s", "peak rss", "cpu %",
    ];

    let mut rows: Vec<Vec<String>> = Vec::new();
    for e in &report.adapters {
        let status = match (&e.outcome, e.status) {
            (RunOutcome::StructuralFailure { .. }, _) => "FAILED".to_string(),
            (_, AdapterStatus::Pass) => "pass".to_string(),
            (_, AdapterStatus::Fail) => "fail".to_string(),
        };

        let row = match &e.summary {
            None => {
                let mut row = vec![e.adapter.clone(), status];
                row.extend(std::iter::repeat_n("-".to_string(), header.len() - 2));
                row
            }
            Some(s) => {
                let lat = |f: fn(&clientbench_types::LatencySummary) -> f64| {
                    s.latency_ms
                        .as_ref()
                        .map_or("-".to_string(), |l| format!("{:.2}", f(l)))
                };
                vec![
                    e.adapter.clone(),
                    status,
                    format!("{}/{}", s.success_count, s.request_count),
                    format!("{:.1}%", s.success_rate * 100.0),
                    lat(|l| l.p50),
                    lat(|l| l.p90),
                    lat(|l| l.p99),
                    lat(|l| l.mean),
                    format!("{:.1}", s.throughput_per_s),
                    s.peak_rss_bytes.map_or("-".to_string(), format_bytes),
                    s.mean_cpu_percent
                        .map_or("-".to_string(), |c| format!("{c:.1}")),
                ]
            }
        };
        rows.push(row);
    }

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |cells: Vec<String>, out: &mut String| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<w$}", c, w = widths[i]))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    };

    line(header.iter().map(|h| h.to_string()).collect(), &mut out);
    line(widths.iter().map(|w| "-".repeat(*w)).collect(), &mut out);
    for row in rows {
        line(row, &mut out);
    }

    if !report.ranking.is_empty() {
        out.push_str("\nranking (throughput):\n");
        for r in &report.ranking {
            out.push_str(&format!(
                "  {}. {} {:.1} req/s\n",
                r.rank, r.adapter, r.throughput_per_s
            ));
        }
    }

    out.push_str(&format!(
        "\nverdict: {} ({} pass, {} fail)\n",
        verdict_word(report.verdict.status),
        report.verdict.counts.pass,
        report.verdict.counts.fail
    ));
    for r in &report.verdict.reasons {
        out.push_str(&format!("  - {r}\n"));
    }

    out
}

pub fn render_markdown(report: &BenchReport) -> String {
    let mut out = String::new();

    let header = match report.verdict.status {
        VerdictStatus::Pass => "✅ clientbench: pass",
        VerdictStatus::Fail => "❌ clientbench: fail",
    };

    out.push_str(header);
    out.push_str("\n\n");

    out.push_str(&format!(
        "**Target:** `{}` · **Requests:** {} · **Concurrency:** {} · **Baseline:** `{}`\n\n",
        report.bench.target, report.bench.request_count, report.bench.concurrency, report.bench.baseline
    ));

    out.push_str("| adapter | status | success | p50 | p99 | throughput | peak rss | cpu |\n");
    out.push_str("|---|---|---:|---:|---:|---:|---:|---:|\n");

    for e in &report.adapters {
        let status_icon = match e.status {
            AdapterStatus::Pass => "✅",
            AdapterStatus::Fail => "❌",
        };

        match &e.summary {
            None => out.push_str(&format!(
                "| `{}` | {} structural failure | | | | | | |\n",
                e.adapter, status_icon
            )),
            Some(s) => {
                let delta = |metric: CompareMetric| {
                    e.comparison
                        .as_ref()
                        .and_then(|c| c.get(&metric))
                        .map_or(String::new(), |d| format!(" ({})", format_pct(d.pct)))
                };
                let (p50, p99) = s
                    .latency_ms
                    .as_ref()
                    .map_or(("-".to_string(), "-".to_string()), |l| {
                        (format!("{:.2} ms", l.p50), format!("{:.2} ms", l.p99))
                    });

                out.push_str(&format!(
                    "| `{adapter}` | {icon} | {succ:.1}% | {p50}{d50} | {p99}{d99} | {thr:.1}/s{dthr} | {rss} | {cpu} |\n",
                    adapter = e.adapter,
                    icon = status_icon,
                    succ = s.success_rate * 100.0,
                    d50 = delta(CompareMetric::LatencyP50Ms),
                    d99 = delta(CompareMetric::LatencyP99Ms),
                    thr = s.throughput_per_s,
                    dthr = delta(CompareMetric::ThroughputPerS),
                    rss = s.peak_rss_bytes.map_or("-".to_string(), format_bytes),
                    cpu = s.mean_cpu_percent.map_or("-".to_string(), |c| format!("{c:.1}%")),
                ));
            }
        }
    }

    if !report.ranking.is_empty() {
        out.push_str("\n**Ranking:** ");
        let names: Vec<String> = report
            .ranking
            .iter()
            .map(|r| format!("{}. `{}`", r.rank, r.adapter))
            .collect();
        out.push_str(&names.join(", "));
        out.push('\n');
    }

    let compared: Vec<_> = report
        .adapters
        .iter()
        .filter_map(|e| e.comparison.as_ref().map(|c| (&e.adapter, c)))
        .collect();
    if !compared.is_empty() {
        out.push_str(&format!(
            "\n<details><summary>Comparison vs <code>{}</code></summary>\n\n",
            report.bench.baseline
        ));
        out.push_str("| adapter | metric | baseline | current | delta |\n");
        out.push_str("|---|---|---:|---:|---:|\n");
        for (adapter, comparison) in compared {
            for metric in CompareMetric::ALL {
                let Some(d) = comparison.get(&metric) else {
                    continue;
                };
                let unit = metric.display_unit();
                out.push_str(&format!(
                    "| `{adapter}` | {key} | {b:.2}{unit} | {c:.2}{unit} | {pct}{mark} |\n",
                    key = metric.key(),
                    b = d.baseline,
                    c = d.current,
                    pct = format_pct(d.pct),
                    mark = if d.improved { " ✅" } else { "" },
                ));
            }
        }
        out.push_str("\n</details>\n");
    }

    if !report.verdict.reasons.is_empty() {
        out.push_str("\n**Notes:**\n");
        for r in &report.verdict.reasons {
            out.push_str(&format!("- {}\n", r));
        }
    }

    out
}

pub fn github_annotations(report: &BenchReport) -> Vec<String> {
    let mut lines = Vec::new();

    for e in &report.adapters {
        let prefix = match (e.status, e.deadline_exceeded) {
            (AdapterStatus::Fail, _) => "::error",
            (AdapterStatus::Pass, true) => "::warning",
            (AdapterStatus::Pass, false) => continue,
        };

        let detail = if e.reasons.is_empty() {
            "failed".to_string()
        } else {
            e.reasons.join("; ")
        };

        lines.push(format!(
            "{prefix}::clientbench {adapter}: {detail}",
            adapter = e.adapter
        ));
    }

    lines
}

fn verdict_word(status: VerdictStatus) -> &'static str {
    match status {
        VerdictStatus::Pass => "pass",
        VerdictStatus::Fail => "fail",
    }
}

fn format_bytes(b: u64) -> String {
    format!("{:.1} MiB", b as f64 / (1024.0 * 1024.0))
}

fn format_pct(pct: f64) -> String {
    let sign = if pct > 0.0 { "+" } else { "" };
    format!("{}{:.2}%", sign, pct * 100.0)
}



#[cfg(test)]
mod property_tests {
    use super::test_support::{completed_run, failed_run, receipt};
    use super::*;
    use proptest::prelude::*;

    fn run_strategy() -> impl Strategy<Value = clientbench_types::AdapterRun> {
        (
            "[a-z]{3,10}",
            proptest::collection::vec(1u64..500, 0..20),
            0usize..5,
            any::<bool>(),
        )
            .prop_map(|(name, lat, failures, broken)| {
                if broken {
                    failed_run(&name)
                } else {
                    completed_run(&name, &lat, failures)
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every adapter shows up in every rendering; failed ones get an annotation.
        #[test]
        fn renderings_never_omit_adapters(runs in proptest::collection::vec(run_strategy(), 1..5)) {
            let report = ReportUseCase::execute(ReportRequest { receipt: receipt(runs) })
                .unwrap()
                .report;

            let table = render_table(&report);
            let md = render_markdown(&report);
            let annotations = github_annotations(&report);

            for e in &report.adapters {
                prop_assert!(table.contains(&e.adapter));
                let needle = format!("`{}`", e.adapter);
                prop_assert!(md.contains(&needle));
            }

            let failed = report.adapters.iter().filter(|e| e.status == AdapterStatus::Fail).count();
            let errors = annotations.iter().filter(|l| l.starts_with("::error::")).count();
            prop_assert_eq!(failed, errors);

            for reason in &report.verdict.reasons {
                prop_assert!(md.contains(reason));
            }
        }
    }
}
