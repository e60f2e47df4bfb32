//! Std adapters for clientbench.
//!
//! In clean-arch terms: this is where we touch the world.
//! HTTP client libraries are wrapped behind [`ClientAdapter`], process resources
//! are read through [`ResourceProbe`], and the host through [`HostProbe`].

mod host;
mod hyper_client;
mod reqwest_client;
mod sampler;

pub use host::{HostProbe, StdHostProbe};
pub use hyper_client::HyperAdapter;
pub use reqwest_client::ReqwestAdapter;
pub use sampler::{ProbeReading, ResourceProbe, ResourceSampler, SamplerHandle, SysinfoProbe};

use async_trait::async_trait;
use clientbench_types::{ErrorKind, RequestResult, RequestSpec};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unknown adapter: {0} (expected one of: {list})", list = AdapterKind::names().join(", "))]
    UnknownAdapter(String),

    #[error("invalid target url {url}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("adapter {adapter} does not support the {scheme}:// scheme")]
    UnsupportedScheme { adapter: String, scheme: String },

    #[error("failed to build {adapter} client: {reason}")]
    Build { adapter: String, reason: String },

    #[error("resource probe unavailable: {0}")]
    ProbeUnavailable(String),
}

/// One HTTP client library (or configuration of one) under test.
///
/// `send` never fails: every outcome is folded into the returned
/// [`RequestResult`]. The harness stamps `issued_at_us`; adapters leave it at 0.
#[async_trait]
pub trait ClientAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, spec: &RequestSpec) -> RequestResult;
}

/// Settings shared by every adapter built for one bench.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub base_url: String,
    pub user_agent: String,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: format!("clientbench/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Pooled `reqwest::Client`, HTTP version negotiated.
    Reqwest,
    /// `reqwest` restricted to HTTP/1.1.
    ReqwestHttp1,
    /// `reqwest` with idle pooling disabled.
    ReqwestUnpooled,
    /// `hyper-util` legacy pooled client, plain http only.
    Hyper,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 4] = [
        AdapterKind::Reqwest,
        AdapterKind::ReqwestHttp1,
        AdapterKind::ReqwestUnpooled,
        AdapterKind::Hyper,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Reqwest => "reqwest",
            AdapterKind::ReqwestHttp1 => "reqwest-http1",
            AdapterKind::ReqwestUnpooled => "reqwest-unpooled",
            AdapterKind::Hyper => "hyper",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AdapterError::UnknownAdapter(s.to_string()))
    }
}

/// Builds adapters by name. The harness treats a build error as an init failure.
pub trait AdapterFactory: Send + Sync {
    fn build(&self, name: &str, options: &ClientOptions)
        -> Result<Arc<dyn ClientAdapter>, AdapterError>;
}

#[derive(Debug, Default, Clone)]
pub struct StdAdapterFactory;

impl AdapterFactory for StdAdapterFactory {
    fn build(
        &self,
        name: &str,
        options: &ClientOptions,
    ) -> Result<Arc<dyn ClientAdapter>, AdapterError> {
        let kind: AdapterKind = name.parse()?;
        let adapter: Arc<dyn ClientAdapter> = match kind {
            AdapterKind::Reqwest | AdapterKind::ReqwestHttp1 | AdapterKind::ReqwestUnpooled => {
                Arc::new(ReqwestAdapter::new(kind, options)?)
            }
            AdapterKind::Hyper => Arc::new(HyperAdapter::new(options)?),
        };
        Ok(adapter)
    }
}

/// Parse and normalize a base url: absolute, with a host, no trailing slash.
fn base_url(raw: &str) -> Result<url::Url, AdapterError> {
    let invalid = |reason: String| AdapterError::InvalidTarget {
        url: raw.to_string(),
        reason,
    };

    let url = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Join a normalized base and an absolute request path.
fn join(base: &url::Url, path: &str) -> String {
    format!("{}{}", base.as_str().trim_end_matches('/'), path)
}

fn payload(len: usize) -> bytes::Bytes {
    bytes::Bytes::from(vec![b'x'; len])
}

fn elapsed_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Classification for transport-level failures that carry no usable response.
fn transport_failure(spec: &RequestSpec, elapsed: Duration, timed_out: bool) -> RequestResult {
    let kind = if timed_out {
        ErrorKind::Timeout
    } else {
        ErrorKind::ConnectionError
    };
    RequestResult::failure(spec.seq, elapsed_us(elapsed), None, kind)
}
