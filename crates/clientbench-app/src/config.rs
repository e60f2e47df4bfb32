//! Bench configuration: CLI/env overrides over a TOML file over defaults.

use clientbench_domain::WorkloadConfig;
use clientbench_types::{BenchMeta, BenchSettings, ConfigFile, EndpointConfig, HttpMethod, PayloadConfig};
use std::time::Duration;

pub const DEFAULT_TARGET: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_COUNT: u32 = 100;
pub const DEFAULT_CONCURRENCY: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LIVENESS_PATH: &str = "/status/200";
pub const DEFAULT_MIN_SUCCESS_RATE: f64 = 0.95;
pub const DEFAULT_SEED: u64 = 0;
pub const DEFAULT_COOLDOWN: Duration = Duration::ZERO;
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_ADAPTERS: [&str; 2] = ["reqwest", "hyper"];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid duration for {field}: {value:?} ({reason})")]
    InvalidDuration {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid target url {url:?}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("min_success_rate must be within [0, 1], got {0}")]
    SuccessRateOutOfRange(f64),

    #[error("liveness path must start with '/': {0}")]
    InvalidLivenessPath(String),

    #[error("at least one adapter must be configured")]
    NoAdapters,

    #[error("adapter {0} is listed more than once")]
    DuplicateAdapter(String),

    #[error("baseline adapter {0} is not among the configured adapters")]
    UnknownBaseline(String),
}

/// Values supplied on the command line or through the environment.
/// Anything set here wins over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub target: Option<String>,
    pub request_count: Option<u32>,
    pub concurrency: Option<u32>,
    pub request_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub liveness_timeout: Option<Duration>,
    pub min_success_rate: Option<f64>,
    pub seed: Option<u64>,
    pub cooldown: Option<Duration>,
    pub sample_interval: Option<Duration>,
    pub adapters: Option<Vec<String>>,
    pub baseline: Option<String>,
}

/// Fully resolved, validated configuration for one bench invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    pub target: String,
    pub request_count: u32,
    pub concurrency: u32,
    pub seed: u64,
    pub request_timeout: Duration,
    pub run_timeout: Duration,
    pub liveness_timeout: Duration,
    pub liveness_path: String,
    pub min_success_rate: f64,
    pub cooldown: Duration,
    pub sample_interval: Duration,
    pub adapters: Vec<String>,
    pub baseline: String,
    pub endpoints: Vec<EndpointConfig>,
    pub payloads: Vec<PayloadConfig>,
}

impl BenchConfig {
    pub fn workload_config(&self) -> WorkloadConfig {
        WorkloadConfig {
            request_count: self.request_count,
            seed: self.seed,
            endpoints: self.endpoints.clone(),
            payloads: self.payloads.clone(),
        }
    }

    pub fn meta(&self) -> BenchMeta {
        BenchMeta {
            target: self.target.clone(),
            request_count: self.request_count,
            concurrency: self.concurrency,
            seed: self.seed,
            request_timeout_ms: millis(self.request_timeout),
            run_timeout_ms: millis(self.run_timeout),
            min_success_rate: self.min_success_rate,
            adapters: self.adapters.clone(),
            baseline: self.baseline.clone(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![EndpointConfig {
        method: HttpMethod::Get,
        path: DEFAULT_LIVENESS_PATH.to_string(),
        expected_status: 200,
        weight: 1,
    }]
}

fn file_duration(
    field: &'static str,
    value: Option<&String>,
) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|raw| {
            humantime::parse_duration(raw).map_err(|e| ConfigError::InvalidDuration {
                field,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Layer `overrides` over `file` over defaults and validate the result.
///
/// Adapter names are not checked against the known client libraries here;
/// the adapter factory rejects unknown names.
pub fn resolve_config(
    file: &ConfigFile,
    overrides: &ConfigOverrides,
) -> Result<BenchConfig, ConfigError> {
    let s: &BenchSettings = &file.bench;

    let target = overrides
        .target
        .clone()
        .or_else(|| s.target.clone())
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());
    let target = normalize_target(&target)?;

    let request_count = overrides
        .request_count
        .or(s.request_count)
        .unwrap_or(DEFAULT_REQUEST_COUNT);
    if request_count == 0 {
        return Err(ConfigError::Zero {
            field: "request_count",
        });
    }

    let concurrency = overrides
        .concurrency
        .or(s.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);
    if concurrency == 0 {
        return Err(ConfigError::Zero {
            field: "concurrency",
        });
    }

    let request_timeout = pick_duration(
        "request_timeout",
        overrides.request_timeout,
        s.request_timeout.as_ref(),
        DEFAULT_REQUEST_TIMEOUT,
    )?;
    let run_timeout = pick_duration(
        "run_timeout",
        overrides.run_timeout,
        s.run_timeout.as_ref(),
        DEFAULT_RUN_TIMEOUT,
    )?;
    let liveness_timeout = pick_duration(
        "liveness_timeout",
        overrides.liveness_timeout,
        s.liveness_timeout.as_ref(),
        DEFAULT_LIVENESS_TIMEOUT,
    )?;
    let sample_interval = pick_duration(
        "sample_interval",
        overrides.sample_interval,
        s.sample_interval.as_ref(),
        DEFAULT_SAMPLE_INTERVAL,
    )?;
    for (field, d) in [
        ("request_timeout", request_timeout),
        ("run_timeout", run_timeout),
        ("liveness_timeout", liveness_timeout),
        ("sample_interval", sample_interval),
    ] {
        if d.is_zero() {
            return Err(ConfigError::ZeroDuration { field });
        }
    }

    let cooldown = match overrides.cooldown {
        Some(d) => d,
        None => file_duration("cooldown", s.cooldown.as_ref())?.unwrap_or(DEFAULT_COOLDOWN),
    };

    let liveness_path = s
        .liveness_path
        .clone()
        .unwrap_or_else(|| DEFAULT_LIVENESS_PATH.to_string());
    if !liveness_path.starts_with('/') {
        return Err(ConfigError::InvalidLivenessPath(liveness_path));
    }

    let min_success_rate = overrides
        .min_success_rate
        .or(s.min_success_rate)
        .unwrap_or(DEFAULT_MIN_SUCCESS_RATE);
    if !(0.0..=1.0).contains(&min_success_rate) {
        return Err(ConfigError::SuccessRateOutOfRange(min_success_rate));
    }

    let adapters = overrides
        .adapters
        .clone()
        .or_else(|| s.adapters.clone())
        .unwrap_or_else(|| DEFAULT_ADAPTERS.iter().map(|a| a.to_string()).collect());
    if adapters.is_empty() {
        return Err(ConfigError::NoAdapters);
    }
    for (i, a) in adapters.iter().enumerate() {
        if adapters[..i].contains(a) {
            return Err(ConfigError::DuplicateAdapter(a.clone()));
        }
    }

    let baseline = match overrides.baseline.clone().or_else(|| s.baseline.clone()) {
        Some(b) if adapters.contains(&b) => b,
        Some(b) => return Err(ConfigError::UnknownBaseline(b)),
        None => adapters[0].clone(),
    };

    let endpoints = if file.endpoints.is_empty() {
        default_endpoints()
    } else {
        file.endpoints.clone()
    };

    Ok(BenchConfig {
        target,
        request_count,
        concurrency,
        seed: overrides.seed.or(s.seed).unwrap_or(DEFAULT_SEED),
        request_timeout,
        run_timeout,
        liveness_timeout,
        liveness_path,
        min_success_rate,
        cooldown,
        sample_interval,
        adapters,
        baseline,
        endpoints,
        payloads: file.payloads.clone(),
    })
}

fn pick_duration(
    field: &'static str,
    over: Option<Duration>,
    file: Option<&String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match over {
        Some(d) => Ok(d),
        None => Ok(file_duration(field, file)?.unwrap_or(default)),
    }
}

fn normalize_target(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTarget {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = url::Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> ConfigFile {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let cfg = resolve_config(&ConfigFile::default(), &ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.target, DEFAULT_TARGET);
        assert_eq!(cfg.request_count, DEFAULT_REQUEST_COUNT);
        assert_eq!(cfg.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cfg.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(cfg.liveness_path, "/status/200");
        assert_eq!(cfg.adapters, vec!["reqwest", "hyper"]);
        assert_eq!(cfg.baseline, "reqwest");
        assert_eq!(cfg.endpoints.len(), 1);
        assert!(cfg.payloads.is_empty());
    }

    #[test]
    fn overrides_win_over_file() {
        let file = parse(
            r#"
            [bench]
            target = "http://file:1234"
            request_count = 50
            concurrency = 4
            request_timeout = "2s"
            cooldown = "1s"
            "#,
        );
        let overrides = ConfigOverrides {
            concurrency: Some(8),
            request_timeout: Some(Duration::from_millis(250)),
            ..Default::default()
        };

        let cfg = resolve_config(&file, &overrides).unwrap();
        assert_eq!(cfg.target, "http://file:1234");
        assert_eq!(cfg.request_count, 50);
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.request_timeout, Duration::from_millis(250));
        assert_eq!(cfg.cooldown, Duration::from_secs(1));
    }

    #[test]
    fn file_mix_replaces_default_endpoint() {
        let file = parse(
            r#"
            [[endpoint]]
            method = "POST"
            path = "/anything"
            weight = 2

            [[payload]]
            bytes = 1024
            "#,
        );
        let cfg = resolve_config(&file, &ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.endpoints.len(), 1);
        assert_eq!(cfg.endpoints[0].method, HttpMethod::Post);
        assert_eq!(cfg.payloads[0].bytes, 1024);
        assert_eq!(cfg.workload_config().payloads.len(), 1);
    }

    #[test]
    fn target_is_normalized_without_trailing_slash() {
        let overrides = ConfigOverrides {
            target: Some("http://localhost:9000/".into()),
            ..Default::default()
        };
        let cfg = resolve_config(&ConfigFile::default(), &overrides).unwrap();
        assert_eq!(cfg.target, "http://localhost:9000");
    }

    #[test]
    fn rejects_bad_values() {
        let cases: Vec<(ConfigOverrides, fn(&ConfigError) -> bool)> = vec![
            (
                ConfigOverrides {
                    target: Some("ftp://host".into()),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::InvalidTarget { .. }),
            ),
            (
                ConfigOverrides {
                    request_count: Some(0),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::Zero { field: "request_count" }),
            ),
            (
                ConfigOverrides {
                    concurrency: Some(0),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::Zero { field: "concurrency" }),
            ),
            (
                ConfigOverrides {
                    request_timeout: Some(Duration::ZERO),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::ZeroDuration { .. }),
            ),
            (
                ConfigOverrides {
                    min_success_rate: Some(1.5),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::SuccessRateOutOfRange(_)),
            ),
            (
                ConfigOverrides {
                    adapters: Some(vec![]),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::NoAdapters),
            ),
            (
                ConfigOverrides {
                    adapters: Some(vec!["hyper".into(), "hyper".into()]),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::DuplicateAdapter(_)),
            ),
            (
                ConfigOverrides {
                    baseline: Some("curl".into()),
                    ..Default::default()
                },
                |e| matches!(e, ConfigError::UnknownBaseline(_)),
            ),
        ];

        for (overrides, check) in cases {
            let err = resolve_config(&ConfigFile::default(), &overrides).unwrap_err();
            assert!(check(&err), "unexpected error for {overrides:?}: {err}");
        }
    }

    #[test]
    fn bad_file_duration_names_the_field() {
        let file = parse(
            r#"
            [bench]
            run_timeout = "soon"
            "#,
        );
        let err = resolve_config(&file, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("run_timeout"), "got: {err}");
    }

    #[test]
    fn relative_liveness_path_is_rejected() {
        let file = parse(
            r#"
            [bench]
            liveness_path = "health"
            "#,
        );
        assert!(matches!(
            resolve_config(&file, &ConfigOverrides::default()),
            Err(ConfigError::InvalidLivenessPath(_))
        ));
    }

    #[test]
    fn meta_reports_millis() {
        let cfg = resolve_config(&ConfigFile::default(), &ConfigOverrides::default()).unwrap();
        let meta = cfg.meta();
        assert_eq!(meta.request_timeout_ms, 5_000);
        assert_eq!(meta.run_timeout_ms, 300_000);
        assert_eq!(meta.baseline, "reqwest");
    }
}
