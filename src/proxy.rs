use crate::error::RouteError;
use crate::registry::Worker;
use actix_web::HttpResponse;
use actix_web::http::StatusCode as ActixStatusCode;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Headers that describe a single connection rather than the message.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Request headers to send upstream. `host` and `content-length` are
/// recomputed by the client for the backend connection.
pub fn forwardable_request_headers<'a, I>(headers: I) -> HeaderMap
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if is_hop_by_hop(name)
            || name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("content-length")
        {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value),
        ) {
            (Ok(name), Ok(value)) => {
                out.append(name, value);
            }
            _ => log::debug!("Dropping unrepresentable request header {}", name),
        }
    }
    out
}

/// Response headers to relay to the caller. `content-length` is recomputed
/// from the relayed body.
pub fn forwardable_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let key = name.as_str();
        if is_hop_by_hop(key) || key.eq_ignore_ascii_case("content-length") {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// The caller's request, replayed against a worker.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        ForwardRequest {
            method,
            path: path.into(),
            headers,
            body,
        }
    }
}

/// A fully buffered backend response.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn into_http_response(self) -> HttpResponse {
        let status = ActixStatusCode::from_u16(self.status.as_u16())
            .unwrap_or(ActixStatusCode::BAD_GATEWAY);
        let mut builder = HttpResponse::build(status);
        for (name, value) in &self.headers {
            builder.append_header((name.as_str(), value.as_bytes()));
        }
        builder.body(self.body)
    }
}

/// Replays requests against workers over a pooled client. At most
/// `max_connections` forwards are in flight at once; extra callers wait.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
}

impl Forwarder {
    pub fn new(
        timeout: Duration,
        max_connections: usize,
        max_idle_connections: usize,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(max_idle_connections)
            .build()?;
        Ok(Forwarder {
            client,
            limiter: Arc::new(Semaphore::new(max_connections)),
        })
    }

    /// Forward slots not currently held by an in-flight request.
    pub fn available_connections(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Send `request` to `worker` and buffer the whole response. Either the
    /// complete backend response is returned or an error is, never a prefix.
    pub async fn forward(
        &self,
        worker: &Worker,
        request: &ForwardRequest,
    ) -> Result<ProxyResponse, RouteError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| RouteError::BackendUnavailable {
                address: worker.address().to_string(),
                reason: "connection limiter closed".to_string(),
                timed_out: false,
            })?;

        let resp = self
            .client
            .request(request.method.clone(), worker.api_path(&request.path))
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| RouteError::backend(worker.address(), &e))?;

        let status = resp.status();
        let headers = forwardable_response_headers(resp.headers());
        let body = resp
            .bytes()
            .await
            .map_err(|e| RouteError::backend(worker.address(), &e))?;
        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}
