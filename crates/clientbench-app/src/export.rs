//! Export use case for converting reports to CSV or JSONL.
//!
//! One record per adapter per summary field, suitable for trend analysis and
//! time-series ingestion.

use clientbench_types::{AdapterStatus, BenchReport, ErrorKind, Summary};
use std::str::FromStr;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// RFC 4180 compliant CSV with header row.
    Csv,
    /// JSON Lines format (one JSON object per line).
    Jsonl,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "jsonl" => Ok(ExportFormat::Jsonl),
            other => Err(format!("unknown export format: {other} (expected csv or jsonl)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExportRow {
    pub run_id: String,
    pub adapter: String,
    pub status: String,
    pub field: String,
    /// Absent when the adapter has no summary or the field has no value.
    pub value: Option<f64>,
}

/// Summary fields in export order.
const FIELDS: &[&str] = &[
    "request_count",
    "success_count",
    "success_rate",
    "error_count.connection_error",
    "error_count.timeout",
    "error_count.unexpected_status",
    "error_count.cancelled",
    "latency_p50_ms",
    "latency_p90_ms",
    "latency_p99_ms",
    "latency_min_ms",
    "latency_max_ms",
    "latency_mean_ms",
    "throughput_per_s",
    "window_ms",
    "peak_rss_bytes",
    "mean_cpu_percent",
];

fn field_value(s: &Summary, field: &str) -> Option<f64> {
    let lat = s.latency_ms.as_ref();
    let errors = |k: ErrorKind| Some(s.error_counts.get(&k).copied().unwrap_or(0) as f64);
    match field {
        "request_count" => Some(s.request_count as f64),
        "success_count" => Some(s.success_count as f64),
        "success_rate" => Some(s.success_rate),
        "error_count.connection_error" => errors(ErrorKind::ConnectionError),
        "error_count.timeout" => errors(ErrorKind::Timeout),
        "error_count.unexpected_status" => errors(ErrorKind::UnexpectedStatus),
        "error_count.cancelled" => errors(ErrorKind::Cancelled),
        "latency_p50_ms" => lat.map(|l| l.p50),
        "latency_p90_ms" => lat.map(|l| l.p90),
        "latency_p99_ms" => lat.map(|l| l.p99),
        "latency_min_ms" => lat.map(|l| l.min),
        "latency_max_ms" => lat.map(|l| l.max),
        "latency_mean_ms" => lat.map(|l| l.mean),
        "throughput_per_s" => Some(s.throughput_per_s),
        "window_ms" => Some(s.window_ms),
        "peak_rss_bytes" => s.peak_rss_bytes.map(|b| b as f64),
        "mean_cpu_percent" => s.mean_cpu_percent,
        _ => None,
    }
}

pub struct ExportUseCase;

impl ExportUseCase {
    pub fn export(report: &BenchReport, format: ExportFormat) -> anyhow::Result<String> {
        let rows = Self::rows(report);
        match format {
            ExportFormat::Csv => Ok(Self::to_csv(&rows)),
            ExportFormat::Jsonl => Self::to_jsonl(&rows),
        }
    }

    /// Adapters keep report order; fields keep `FIELDS` order.
    pub fn rows(report: &BenchReport) -> Vec<ExportRow> {
        let mut rows = Vec::with_capacity(report.adapters.len() * FIELDS.len());

        for e in &report.adapters {
            let status = match e.status {
                AdapterStatus::Pass => "pass",
                AdapterStatus::Fail => "fail",
            };
            for field in FIELDS {
                rows.push(ExportRow {
                    run_id: report.run.id.clone(),
                    adapter: e.adapter.clone(),
                    status: status.to_string(),
                    field: field.to_string(),
                    value: e.summary.as_ref().and_then(|s| field_value(s, field)),
                });
            }
        }

        rows
    }

    fn to_csv(rows: &[ExportRow]) -> String {
        let mut output = String::from("run_id,adapter,status,field,value\n");

        for row in rows {
            output.push_str(&csv_escape(&row.run_id));
            output.push(',');
            output.push_str(&csv_escape(&row.adapter));
            output.push(',');
            output.push_str(&row.status);
            output.push(',');
            output.push_str(&row.field);
            output.push(',');
            output.push_str(&row.value.map_or(String::new(), |v| format!("{:.6}", v)));
            output.push('\n');
        }

        output
    }

    fn to_jsonl(rows: &[ExportRow]) -> anyhow::Result<String> {
        let mut output = String::new();

        for row in rows {
            let json = serde_json::to_string(row)?;
            output.push_str(&json);
            output.push('\n');
        }

        Ok(output)
    }
}

/// Escape a string for CSV per RFC 4180.
fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ReportRequest, ReportUseCase};
    use crate::test_support::{completed_run, failed_run, receipt};

    fn report() -> BenchReport {
        ReportUseCase::execute(ReportRequest {
            receipt: receipt(vec![
                completed_run("reqwest", &[10, 20], 0),
                failed_run("hyper"),
            ]),
        })
        .unwrap()
        .report
    }

    #[test]
    fn one_row_per_adapter_per_field() {
        let rows = ExportUseCase::rows(&report());
        assert_eq!(rows.len(), 2 * FIELDS.len());
        assert_eq!(rows[0].adapter, "reqwest");
        assert_eq!(rows[0].field, "request_count");
        assert_eq!(rows[0].value, Some(2.0));
        assert!(rows[FIELDS.len()..].iter().all(|r| r.value.is_none()));
        assert!(rows[FIELDS.len()..].iter().all(|r| r.status == "fail"));
    }

    #[test]
    fn csv_has_header_and_empty_missing_values() {
        let csv = ExportUseCase::export(&report(), ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("run_id,adapter,status,field,value"));
        assert!(csv.contains("run-1,reqwest,pass,latency_p50_ms,10.000000"));
        assert!(csv.contains("run-1,hyper,fail,throughput_per_s,\n"));
    }

    #[test]
    fn jsonl_lines_parse() {
        let out = ExportUseCase::export(&report(), ExportFormat::Jsonl).unwrap();
        let mut count = 0;
        for line in out.lines() {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(v.get("field").is_some());
            count += 1;
        }
        assert_eq!(count, 2 * FIELDS.len());
    }

    #[test]
    fn every_field_resolves_on_a_full_summary() {
        let r = report();
        let summary = r.adapters[0].summary.as_ref().unwrap();
        for field in FIELDS {
            assert!(field_value(summary, field).is_some(), "{field}");
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert_eq!("jsonl".parse::<ExportFormat>(), Ok(ExportFormat::Jsonl));
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn csv_escape_quotes_commas() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("plain"), "plain");
    }
}
