use crate::{
    base_url, elapsed_us, join, payload, transport_failure, AdapterError, AdapterKind,
    ClientAdapter, ClientOptions,
};
use async_trait::async_trait;
use clientbench_types::{ErrorKind, HttpMethod, RequestResult, RequestSpec};
use std::time::Instant;

/// `reqwest` in one of its configurations.
///
/// No client-wide timeout is set; the harness bounds every request itself.
#[derive(Debug, Clone)]
pub struct ReqwestAdapter {
    kind: AdapterKind,
    client: reqwest::Client,
    base: url::Url,
}

impl ReqwestAdapter {
    pub fn new(kind: AdapterKind, options: &ClientOptions) -> Result<Self, AdapterError> {
        let base = base_url(&options.base_url)?;

        let mut builder = reqwest::Client::builder().user_agent(options.user_agent.clone());
        builder = match kind {
            AdapterKind::Reqwest => builder,
            AdapterKind::ReqwestHttp1 => builder.http1_only(),
            AdapterKind::ReqwestUnpooled => builder.pool_max_idle_per_host(0),
            AdapterKind::Hyper => {
                return Err(AdapterError::Build {
                    adapter: kind.to_string(),
                    reason: "not a reqwest configuration".to_string(),
                });
            }
        };

        let client = builder.build().map_err(|e| AdapterError::Build {
            adapter: kind.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { kind, client, base })
    }
}

fn method(m: HttpMethod) -> reqwest::Method {
    match m {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl ClientAdapter for ReqwestAdapter {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn send(&self, spec: &RequestSpec) -> RequestResult {
        let mut req = self
            .client
            .request(method(spec.method), join(&self.base, &spec.path));
        if spec.method.carries_body() {
            req = req.body(payload(spec.body_bytes));
        }

        let start = Instant::now();
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return transport_failure(spec, start.elapsed(), e.is_timeout()),
        };

        let status = resp.status().as_u16();

        // Drain the body so the exchange is measured end to end.
        match resp.bytes().await {
            Ok(_) => RequestResult::from_status(
                spec.seq,
                elapsed_us(start.elapsed()),
                status,
                spec.expected_status,
            ),
            Err(e) => {
                let kind = if e.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::ConnectionError
                };
                RequestResult::failure(spec.seq, elapsed_us(start.elapsed()), Some(status), kind)
            }
        }
    }
}
