//! Domain logic for clientbench.
//!
//! This crate is intentionally I/O-free: it generates workloads and does math and policy.

mod workload;

pub use workload::{generate_workload, WorkloadConfig};

use clientbench_types::{
    AdapterEntry, AdapterRun, AdapterStatus, CompareMetric, Delta, Direction, ErrorKind,
    FailureStage, LatencySummary, RankEntry, RunOutcome, Summary, Verdict, VerdictCounts, VerdictStatus,
};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("endpoint mix must contain at least one endpoint with a positive weight")]
    EmptyEndpointMix,

    #[error("payload sizes must contain at least one entry with a positive weight")]
    EmptyPayloadMix,

    #[error("endpoint path must start with '/': {0}")]
    InvalidPath(String),
}

/// Nearest-rank percentile over an ascending slice.
///
/// `rank = ceil(p / 100 * n)`, clamped to `1..=n`; the value is `sorted[rank - 1]`.
/// Returns `None` for an empty slice.
pub fn percentile_nearest_rank(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    let rank = rank.clamp(1, n);
    Some(sorted[rank - 1])
}

fn summarize_latency(mut latencies_ms: Vec<f64>) -> Option<LatencySummary> {
    if latencies_ms.is_empty() {
        return None;
    }
    latencies_ms.sort_by(f64::total_cmp);

    let n = latencies_ms.len();
    let mean = latencies_ms.iter().sum::<f64>() / n as f64;

    Some(LatencySummary {
        p50: percentile_nearest_rank(&latencies_ms, 50.0)?,
        p90: percentile_nearest_rank(&latencies_ms, 90.0)?,
        p99: percentile_nearest_rank(&latencies_ms, 99.0)?,
        min: latencies_ms[0],
        max: latencies_ms[n - 1],
        mean,
    })
}

/// Reduce one run into its summary.
///
/// Pure: the same run always yields the same summary.
/// Non-success results count toward `request_count` and `error_counts` but are
/// excluded from the latency distribution.
pub fn summarize_run(run: &AdapterRun) -> Summary {
    let request_count = run.results.len() as u64;

    let mut error_counts: BTreeMap<ErrorKind, u64> = BTreeMap::new();
    let mut latencies_ms = Vec::new();
    for r in &run.results {
        match r.error {
            None => latencies_ms.push(r.elapsed_us as f64 / 1000.0),
            Some(kind) => *error_counts.entry(kind).or_insert(0) += 1,
        }
    }
    let success_count = latencies_ms.len() as u64;

    let first_issue = run.results.iter().map(|r| r.issued_at_us).min();
    let last_completion = run.results.iter().map(|r| r.completed_at_us()).max();
    let window_us = match (first_issue, last_completion) {
        (Some(first), Some(last)) => last.saturating_sub(first),
        _ => 0,
    };

    let throughput_per_s = if success_count == 0 || window_us == 0 {
        0.0
    } else {
        success_count as f64 / (window_us as f64 / 1_000_000.0)
    };

    let success_rate = if request_count == 0 {
        0.0
    } else {
        success_count as f64 / request_count as f64
    };

    let peak_rss_bytes = run.samples.iter().map(|s| s.rss_bytes).max();
    let cpu: Vec<f64> = run.samples.iter().filter_map(|s| s.cpu_percent).collect();
    let mean_cpu_percent = if cpu.is_empty() {
        None
    } else {
        Some(cpu.iter().sum::<f64>() / cpu.len() as f64)
    };

    Summary {
        adapter: run.adapter.clone(),
        request_count,
        success_count,
        success_rate,
        error_counts,
        latency_ms: summarize_latency(latencies_ms),
        throughput_per_s,
        window_ms: window_us as f64 / 1000.0,
        peak_rss_bytes,
        mean_cpu_percent,
    }
}

fn metric_value(summary: &Summary, metric: CompareMetric) -> Option<f64> {
    match metric {
        CompareMetric::ThroughputPerS => Some(summary.throughput_per_s),
        CompareMetric::LatencyP50Ms => summary.latency_ms.as_ref().map(|l| l.p50),
        CompareMetric::LatencyP99Ms => summary.latency_ms.as_ref().map(|l| l.p99),
        CompareMetric::PeakRssBytes => summary.peak_rss_bytes.map(|b| b as f64),
        CompareMetric::MeanCpuPercent => summary.mean_cpu_percent,
        CompareMetric::SuccessRate => Some(summary.success_rate),
    }
}

/// Relative comparison of `current` against `baseline`.
///
/// Metrics missing on either side, or with a zero baseline, are skipped.
pub fn compare_to_baseline(baseline: &Summary, current: &Summary) -> BTreeMap<CompareMetric, Delta> {
    let mut deltas = BTreeMap::new();

    for metric in CompareMetric::ALL {
        let (Some(bv), Some(cv)) = (metric_value(baseline, metric), metric_value(current, metric))
        else {
            continue;
        };

        if bv <= 0.0 {
            continue;
        }

        let improved = match metric.direction() {
            Direction::Lower => cv <= bv,
            Direction::Higher => cv >= bv,
        };

        deltas.insert(
            metric,
            Delta {
                baseline: bv,
                current: cv,
                ratio: cv / bv,
                pct: (cv - bv) / bv,
                improved,
            },
        );
    }

    deltas
}

/// Rank summaries by throughput, highest first. Ties break on adapter name.
pub fn rank_by_throughput(summaries: &[&Summary]) -> Vec<RankEntry> {
    let mut sorted: Vec<&Summary> = summaries.to_vec();
    sorted.sort_by(|a, b| {
        b.throughput_per_s
            .total_cmp(&a.throughput_per_s)
            .then_with(|| a.adapter.cmp(&b.adapter))
    });

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, s)| RankEntry {
            rank: i as u32 + 1,
            adapter: s.adapter.clone(),
            throughput_per_s: s.throughput_per_s,
            success_rate: s.success_rate,
        })
        .collect()
}

/// Judge every run and attach summaries and baseline comparisons.
///
/// Entries keep the order of `runs`. A structural failure is reported as a
/// failed entry without a summary; it is never dropped.
pub fn build_entries(runs: &[AdapterRun], baseline: &str, min_success_rate: f64) -> Vec<AdapterEntry> {
    let baseline_summary = runs
        .iter()
        .find(|r| r.adapter == baseline && !r.outcome.is_structural_failure())
        .map(summarize_run);

    runs.iter()
        .map(|run| match &run.outcome {
            RunOutcome::StructuralFailure { stage, reason } => AdapterEntry {
                adapter: run.adapter.clone(),
                status: AdapterStatus::Fail,
                outcome: run.outcome.clone(),
                deadline_exceeded: run.deadline_exceeded,
                summary: None,
                comparison: None,
                reasons: vec![format!(
                    "structural failure during {}: {reason}",
                    match stage {
                        FailureStage::Init => "init",
                        FailureStage::Liveness => "liveness check",
                    }
                )],
            },
            RunOutcome::Completed => {
                let summary = summarize_run(run);
                let mut reasons = Vec::new();

                if summary.success_rate < min_success_rate {
                    reasons.push(format!(
                        "success rate {:.2}% below minimum {:.2}%",
                        summary.success_rate * 100.0,
                        min_success_rate * 100.0
                    ));
                }
                if run.deadline_exceeded {
                    let cancelled = summary
                        .error_counts
                        .get(&ErrorKind::Cancelled)
                        .copied()
                        .unwrap_or(0);
                    reasons.push(format!(
                        "run timeout exceeded; {cancelled} requests cancelled"
                    ));
                }

                let status = if summary.success_rate < min_success_rate {
                    AdapterStatus::Fail
                } else {
                    AdapterStatus::Pass
                };

                let comparison = match &baseline_summary {
                    Some(b) if run.adapter != baseline => Some(compare_to_baseline(b, &summary)),
                    _ => None,
                };

                AdapterEntry {
                    adapter: run.adapter.clone(),
                    status,
                    outcome: RunOutcome::Completed,
                    deadline_exceeded: run.deadline_exceeded,
                    summary: Some(summary),
                    comparison,
                    reasons,
                }
            }
        })
        .collect()
}

/// Overall verdict: pass only if every adapter passed.
pub fn build_verdict(entries: &[AdapterEntry]) -> Verdict {
    let mut counts = VerdictCounts { pass: 0, fail: 0 };
    let mut reasons = Vec::new();

    for e in entries {
        match e.status {
            AdapterStatus::Pass => counts.pass += 1,
            AdapterStatus::Fail => {
                counts.fail += 1;
                for r in &e.reasons {
                    reasons.push(format!("{}: {r}", e.adapter));
                }
            }
        }
    }

    if entries.is_empty() {
        reasons.push("no adapters were run".to_string());
    }

    let status = if counts.fail > 0 || entries.is_empty() {
        VerdictStatus::Fail
    } else {
        VerdictStatus::Pass
    };

    Verdict {
        status,
        counts,
        reasons,
    }
}
