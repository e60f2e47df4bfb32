//! Shared types for clientbench.
//!
//! Design goal: versioned, explicit, boring.
//! These structs are used for workloads, raw run receipts, and the comparative report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const WORKLOAD_SCHEMA_V1: &str = "clientbench.workload.v1";
pub const RUNS_SCHEMA_V1: &str = "clientbench.runs.v1";
pub const REPORT_SCHEMA_V1: &str = "clientbench.report.v1";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RunMeta {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub host: HostInfo,
}

// ----------------------------
// Workload
// ----------------------------

#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether the workload attaches a payload to this method.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported http method: {other}")),
        }
    }
}

/// One request descriptor. Immutable once generated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RequestSpec {
    /// Position in the workload; this is the issue order.
    pub seq: usize,
    pub method: HttpMethod,
    pub path: String,
    pub body_bytes: usize,
    pub expected_status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Workload {
    pub seed: u64,
    pub specs: Vec<RequestSpec>,
}

impl Workload {
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RequestSpec> {
        self.specs.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct WorkloadReceipt {
    pub schema: String,
    pub tool: ToolInfo,
    pub workload: Workload,
}

// ----------------------------
// Results
// ----------------------------

/// Per-request error taxonomy. These are recorded, never propagated.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No transport could be established, or the response was malformed.
    ConnectionError,
    /// No response within the per-request bound.
    Timeout,
    /// A response arrived with a status other than the expected one.
    UnexpectedStatus,
    /// Still in flight (or never issued) when the run-level timeout fired.
    Cancelled,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 4] = [
        ErrorKind::ConnectionError,
        ErrorKind::Timeout,
        ErrorKind::UnexpectedStatus,
        ErrorKind::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnexpectedStatus => "unexpected_status",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RequestResult {
    /// `seq` of the [`RequestSpec`] this result answers.
    pub seq: usize,

    /// Offset from the run origin at which the request was issued.
    /// Adapters leave this at zero; the harness stamps it.
    pub issued_at_us: u64,

    pub elapsed_us: u64,

    /// Observed HTTP status, when a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl RequestResult {
    pub fn success(seq: usize, elapsed_us: u64, status: u16) -> Self {
        Self {
            seq,
            issued_at_us: 0,
            elapsed_us,
            status: Some(status),
            error: None,
        }
    }

    pub fn failure(seq: usize, elapsed_us: u64, status: Option<u16>, error: ErrorKind) -> Self {
        Self {
            seq,
            issued_at_us: 0,
            elapsed_us,
            status,
            error: Some(error),
        }
    }

    /// Classify a received status against the expected one.
    pub fn from_status(seq: usize, elapsed_us: u64, status: u16, expected: u16) -> Self {
        if status == expected {
            Self::success(seq, elapsed_us, status)
        } else {
            Self::failure(seq, elapsed_us, Some(status), ErrorKind::UnexpectedStatus)
        }
    }

    pub fn issued_at(mut self, issued_at_us: u64) -> Self {
        self.issued_at_us = issued_at_us;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn completed_at_us(&self) -> u64 {
        self.issued_at_us.saturating_add(self.elapsed_us)
    }
}

#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResourceSample {
    /// Offset from the run origin.
    pub at_us: u64,
    pub rss_bytes: u64,

    /// Absent when the reading did not span a full CPU measurement interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The adapter could not be constructed.
    Init,
    /// The target did not pass the pre-run liveness check.
    Liveness,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    StructuralFailure { stage: FailureStage, reason: String },
}

impl RunOutcome {
    pub fn is_structural_failure(&self) -> bool {
        matches!(self, RunOutcome::StructuralFailure { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AdapterRun {
    pub adapter: String,
    pub started_at: String,
    pub ended_at: String,
    pub outcome: RunOutcome,

    /// True when the run-level timeout cancelled outstanding requests.
    #[serde(default)]
    pub deadline_exceeded: bool,

    /// Completion order.
    pub results: Vec<RequestResult>,
    pub samples: Vec<ResourceSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BenchMeta {
    pub target: String,
    pub request_count: u32,
    pub concurrency: u32,
    pub seed: u64,
    pub request_timeout_ms: u64,
    pub run_timeout_ms: u64,
    pub min_success_rate: f64,
    pub adapters: Vec<String>,
    pub baseline: String,
}

/// Raw runs, kept so summaries can be recomputed offline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RunsReceipt {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,
    pub bench: BenchMeta,
    pub workload: Workload,
    pub runs: Vec<AdapterRun>,
}

// ----------------------------
// Summaries and report
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LatencySummary {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Summary {
    pub adapter: String,
    pub request_count: u64,
    pub success_count: u64,

    /// success_count / request_count, as a fraction.
    pub success_rate: f64,

    pub error_counts: BTreeMap<ErrorKind, u64>,

    /// Milliseconds, successful requests only. None when nothing succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<LatencySummary>,

    pub throughput_per_s: f64,

    /// First issue to last completion.
    pub window_ms: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_rss_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_cpu_percent: Option<f64>,
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum CompareMetric {
    ThroughputPerS,
    LatencyP50Ms,
    LatencyP99Ms,
    PeakRssBytes,
    MeanCpuPercent,
    SuccessRate,
}

impl CompareMetric {
    pub const ALL: [CompareMetric; 6] = [
        CompareMetric::ThroughputPerS,
        CompareMetric::LatencyP50Ms,
        CompareMetric::LatencyP99Ms,
        CompareMetric::PeakRssBytes,
        CompareMetric::MeanCpuPercent,
        CompareMetric::SuccessRate,
    ];

    pub fn direction(self) -> Direction {
        match self {
            CompareMetric::ThroughputPerS => Direction::Higher,
            CompareMetric::LatencyP50Ms => Direction::Lower,
            CompareMetric::LatencyP99Ms => Direction::Lower,
            CompareMetric::PeakRssBytes => Direction::Lower,
            CompareMetric::MeanCpuPercent => Direction::Lower,
            CompareMetric::SuccessRate => Direction::Higher,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            CompareMetric::ThroughputPerS => "throughput_per_s",
            CompareMetric::LatencyP50Ms => "latency_p50_ms",
            CompareMetric::LatencyP99Ms => "latency_p99_ms",
            CompareMetric::PeakRssBytes => "peak_rss_bytes",
            CompareMetric::MeanCpuPercent => "mean_cpu_percent",
            CompareMetric::SuccessRate => "success_rate",
        }
    }

    pub fn display_unit(self) -> &'static str {
        match self {
            CompareMetric::ThroughputPerS => "/s",
            CompareMetric::LatencyP50Ms | CompareMetric::LatencyP99Ms => "ms",
            CompareMetric::PeakRssBytes => "B",
            CompareMetric::MeanCpuPercent => "%",
            CompareMetric::SuccessRate => "",
        }
    }
}

/// Which way is better for a metric.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Lower,
    Higher,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Delta {
    pub baseline: f64,
    pub current: f64,

    /// current / baseline
    pub ratio: f64,

    /// (current - baseline) / baseline
    pub pct: f64,

    /// True when current is better than (or equal to) the baseline.
    pub improved: bool,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AdapterEntry {
    pub adapter: String,
    pub status: AdapterStatus,
    pub outcome: RunOutcome,

    #[serde(default)]
    pub deadline_exceeded: bool,

    /// Absent for structural failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,

    /// Relative to the baseline adapter. Absent for the baseline itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<BTreeMap<CompareMetric, Delta>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RankEntry {
    pub rank: u32,
    pub adapter: String,
    pub throughput_per_s: f64,
    pub success_rate: f64,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct VerdictCounts {
    pub pass: u32,
    pub fail: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub counts: VerdictCounts,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BenchReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,
    pub bench: BenchMeta,
    pub adapters: Vec<AdapterEntry>,
    pub ranking: Vec<RankEntry>,
    pub verdict: Verdict,
}

// ----------------------------
// Optional config file schema
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub bench: BenchSettings,

    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointConfig>,

    #[serde(default, rename = "payload")]
    pub payloads: Vec<PayloadConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct BenchSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,

    /// Duration string parseable by humantime, e.g. "5s".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_path: Option<String>,

    /// Fraction in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_success_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_interval: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapters: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
}

/// One entry of the endpoint mix.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EndpointConfig {
    pub method: HttpMethod,
    pub path: String,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// One entry of the payload size distribution.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PayloadConfig {
    pub bytes: usize,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_expected_status() -> u16 {
    200
}

fn default_weight() -> u32 {
    1
}
