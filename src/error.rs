use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Why a single worker's utilization probe did not produce a reading.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("worker unreachable: {0}")]
    Unreachable(String),
    #[error("malformed utilization response: {0}")]
    UpstreamProtocolError(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProbeError::UpstreamProtocolError(e.to_string())
        } else {
            ProbeError::Unreachable(e.to_string())
        }
    }
}

/// One or more workers failed their probe during a refresh. Their previous
/// readings were kept.
#[derive(Debug, Error)]
#[error("{} worker(s) failed utilization probe: {}", .failures.len(), describe(.failures))]
pub struct PollError {
    pub failures: Vec<(String, ProbeError)>,
}

impl PollError {
    pub fn failed_addresses(&self) -> Vec<&str> {
        self.failures.iter().map(|(addr, _)| addr.as_str()).collect()
    }
}

fn describe(failures: &[(String, ProbeError)]) -> String {
    failures
        .iter()
        .map(|(addr, e)| format!("{} ({})", addr, e))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures that end an inbound request with an error response.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no workers available")]
    NoWorkersAvailable,
    #[error("backend {address} unavailable: {reason}")]
    BackendUnavailable {
        address: String,
        reason: String,
        timed_out: bool,
    },
}

impl RouteError {
    pub fn backend(address: &str, e: &reqwest::Error) -> Self {
        RouteError::BackendUnavailable {
            address: address.to_string(),
            reason: e.to_string(),
            timed_out: e.is_timeout(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RouteError::NoWorkersAvailable => "no_workers_available",
            RouteError::BackendUnavailable { .. } => "backend_unavailable",
        }
    }
}

impl ResponseError for RouteError {
    fn status_code(&self) -> StatusCode {
        match self {
            RouteError::NoWorkersAvailable => StatusCode::SERVICE_UNAVAILABLE,
            RouteError::BackendUnavailable {
                timed_out: true, ..
            } => StatusCode::GATEWAY_TIMEOUT,
            RouteError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        }))
    }
}
