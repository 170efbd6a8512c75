use crate::error::{PollError, ProbeError};
use crate::registry::{Worker, WorkerRegistry};
use futures::future::join_all;
use serde_json::Value;
use std::time::Duration;

pub const UTILIZATION_PATH: &str = "/device/kv_cache_utilization";

/// Refreshes worker utilization by probing every worker's metrics endpoint.
#[derive(Debug, Clone)]
pub struct UtilizationPoller {
    client: reqwest::Client,
    timeout: Duration,
}

impl UtilizationPoller {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        UtilizationPoller { client, timeout }
    }

    /// Probe all workers concurrently. Workers that answer get their new
    /// reading; the rest keep their previous value and are listed in the error.
    ///
    /// A worker is logged only when it starts failing or recovers, so a
    /// worker that stays down does not log on every refresh.
    pub async fn refresh(&self, registry: &WorkerRegistry) -> Result<(), PollError> {
        let probes = registry.list().iter().map(|w| self.probe(w));
        let results = join_all(probes).await;

        let mut failures = Vec::new();
        for (worker, result) in registry.list().iter().zip(results) {
            match result {
                Ok(value) => {
                    worker.set_utilization(value);
                    if worker.set_healthy(true) {
                        log::info!("Utilization readings from {} recovered", worker.address());
                    }
                }
                Err(e) => {
                    if worker.set_healthy(false) {
                        log::warn!(
                            "Utilization request to {} failed, keeping {:.4}: {}",
                            worker.address(),
                            worker.utilization(),
                            e
                        );
                    }
                    failures.push((worker.address().to_string(), e));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PollError { failures })
        }
    }

    pub async fn probe(&self, worker: &Worker) -> Result<f64, ProbeError> {
        let resp = self
            .client
            .get(worker.api_path(UTILIZATION_PATH))
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::UpstreamProtocolError(format!(
                "status {}",
                status
            )));
        }
        let body = resp.bytes().await?;
        parse_utilization(&body)
    }
}

/// Extract the `utilization` field from a metrics response body.
pub fn parse_utilization(body: &[u8]) -> Result<f64, ProbeError> {
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| ProbeError::UpstreamProtocolError(format!("invalid JSON: {}", e)))?;
    let value = json
        .get("utilization")
        .ok_or_else(|| ProbeError::UpstreamProtocolError("missing `utilization`".to_string()))?
        .as_f64()
        .ok_or_else(|| {
            ProbeError::UpstreamProtocolError("`utilization` is not a number".to_string())
        })?;
    if !value.is_finite() {
        return Err(ProbeError::UpstreamProtocolError(format!(
            "`utilization` is not finite: {}",
            value
        )));
    }
    Ok(value)
}
