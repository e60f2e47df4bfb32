use crate::{
    base_url, elapsed_us, join, payload, transport_failure, AdapterError, AdapterKind,
    ClientAdapter, ClientOptions,
};
use async_trait::async_trait;
use bytes::Bytes;
use clientbench_types::{ErrorKind, HttpMethod, RequestResult, RequestSpec};
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, USER_AGENT};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Instant;

/// `hyper-util` legacy pooled client over `hyper` 1.x. Plain `http://` only.
#[derive(Debug, Clone)]
pub struct HyperAdapter {
    client: Client<HttpConnector, Full<Bytes>>,
    base: url::Url,
    user_agent: HeaderValue,
}

impl HyperAdapter {
    pub fn new(options: &ClientOptions) -> Result<Self, AdapterError> {
        let base = base_url(&options.base_url)?;
        if base.scheme() != "http" {
            return Err(AdapterError::UnsupportedScheme {
                adapter: AdapterKind::Hyper.to_string(),
                scheme: base.scheme().to_string(),
            });
        }

        let user_agent =
            HeaderValue::from_str(&options.user_agent).map_err(|e| AdapterError::Build {
                adapter: AdapterKind::Hyper.to_string(),
                reason: format!("invalid user agent: {e}"),
            })?;

        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            client,
            base,
            user_agent,
        })
    }
}

fn method(m: HttpMethod) -> hyper::Method {
    match m {
        HttpMethod::Get => hyper::Method::GET,
        HttpMethod::Post => hyper::Method::POST,
        HttpMethod::Put => hyper::Method::PUT,
        HttpMethod::Patch => hyper::Method::PATCH,
        HttpMethod::Delete => hyper::Method::DELETE,
    }
}

#[async_trait]
impl ClientAdapter for HyperAdapter {
    fn name(&self) -> &str {
        AdapterKind::Hyper.as_str()
    }

    async fn send(&self, spec: &RequestSpec) -> RequestResult {
        let body = if spec.method.carries_body() {
            payload(spec.body_bytes)
        } else {
            Bytes::new()
        };

        let start = Instant::now();

        let req = hyper::Request::builder()
            .method(method(spec.method))
            .uri(join(&self.base, &spec.path))
            .header(USER_AGENT, self.user_agent.clone())
            .body(Full::new(body));
        let req = match req {
            Ok(req) => req,
            Err(_) => return transport_failure(spec, start.elapsed(), false),
        };

        let resp = match self.client.request(req).await {
            Ok(resp) => resp,
            Err(_) => return transport_failure(spec, start.elapsed(), false),
        };

        let status = resp.status().as_u16();

        match resp.into_body().collect().await {
            Ok(_) => RequestResult::from_status(
                spec.seq,
                elapsed_us(start.elapsed()),
                status,
                spec.expected_status,
            ),
            Err(_) => RequestResult::failure(
                spec.seq,
                elapsed_us(start.elapsed()),
                Some(status),
                ErrorKind::ConnectionError,
            ),
        }
    }
}
