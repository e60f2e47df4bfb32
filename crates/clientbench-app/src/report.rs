//! Report use case: turn raw adapter runs into the comparative report.
//!
//! Pure over its input, so a report can be recomputed from a saved
//! `clientbench.runs.v1` receipt at any time.

use anyhow::bail;
use clientbench_domain::{build_entries, build_verdict, rank_by_throughput};
use clientbench_types::{BenchReport, RunsReceipt, Summary, REPORT_SCHEMA_V1, RUNS_SCHEMA_V1};

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub receipt: RunsReceipt,
}

#[derive(Debug, Clone)]
pub struct ReportResult {
    pub report: BenchReport,
}

pub struct ReportUseCase;

impl ReportUseCase {
    /// Summarize every run, compare against the baseline adapter, rank, and judge.
    ///
    /// Structurally failed adapters are kept as failed entries; they are
    /// excluded from the ranking because they have no throughput.
    pub fn execute(req: ReportRequest) -> anyhow::Result<ReportResult> {
        Self::from_receipt(&req.receipt).map(|report| ReportResult { report })
    }

    pub(crate) fn from_receipt(receipt: &RunsReceipt) -> anyhow::Result<BenchReport> {
        if receipt.schema != RUNS_SCHEMA_V1 {
            bail!(
                "unsupported runs receipt schema {:?} (expected {RUNS_SCHEMA_V1})",
                receipt.schema
            );
        }

        let entries = build_entries(
            &receipt.runs,
            &receipt.bench.baseline,
            receipt.bench.min_success_rate,
        );

        let summaries: Vec<&Summary> = entries.iter().filter_map(|e| e.summary.as_ref()).collect();
        let ranking = rank_by_throughput(&summaries);
        let verdict = build_verdict(&entries);

        Ok(BenchReport {
            schema: REPORT_SCHEMA_V1.to_string(),
            tool: receipt.tool.clone(),
            run: receipt.run.clone(),
            bench: receipt.bench.clone(),
            adapters: entries,
            ranking,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completed_run, failed_run, receipt};
    use clientbench_types::{AdapterStatus, CompareMetric, VerdictStatus};

    #[test]
    fn all_healthy_adapters_pass() {
        let r = receipt(vec![
            completed_run("reqwest", &[10, 10, 10], 0),
            completed_run("hyper", &[5, 5, 5], 0),
        ]);
        let report = ReportUseCase::execute(ReportRequest { receipt: r })
            .unwrap()
            .report;

        assert_eq!(report.schema, REPORT_SCHEMA_V1);
        assert_eq!(report.verdict.status, VerdictStatus::Pass);
        assert_eq!(report.verdict.counts.pass, 2);
        assert_eq!(report.ranking[0].adapter, "hyper");
        assert_eq!(report.ranking[1].adapter, "reqwest");

        // reqwest is the baseline and carries no comparison.
        assert!(report.adapters[0].comparison.is_none());
        let cmp = report.adapters[1].comparison.as_ref().unwrap();
        assert!(cmp[&CompareMetric::LatencyP50Ms].improved);
    }

    #[test]
    fn structural_failure_is_kept_but_not_ranked() {
        let r = receipt(vec![
            completed_run("reqwest", &[10], 0),
            failed_run("hyper"),
        ]);
        let report = ReportUseCase::execute(ReportRequest { receipt: r })
            .unwrap()
            .report;

        assert_eq!(report.adapters.len(), 2);
        assert_eq!(report.adapters[1].status, AdapterStatus::Fail);
        assert_eq!(report.ranking.len(), 1);
        assert_eq!(report.verdict.status, VerdictStatus::Fail);
    }

    #[test]
    fn report_is_reproducible() {
        let r = receipt(vec![
            completed_run("reqwest", &[3, 1, 2], 1),
            completed_run("hyper", &[7, 8], 0),
        ]);
        let a = ReportUseCase::execute(ReportRequest { receipt: r.clone() }).unwrap();
        let b = ReportUseCase::execute(ReportRequest { receipt: r }).unwrap();
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn rejects_foreign_schema() {
        let mut r = receipt(vec![]);
        r.schema = "clientbench.report.v1".to_string();
        let err = ReportUseCase::execute(ReportRequest { receipt: r }).unwrap_err();
        assert!(err.to_string().contains("unsupported runs receipt schema"));
    }
}
