use crate::config::{LBConfig, RefreshMode};
use crate::error::RouteError;
use crate::poller::UtilizationPoller;
use crate::policy::select_excluding;
use crate::profiler::{EventKind, EventSink};
use crate::proxy::{ForwardRequest, Forwarder, ProxyResponse};
use crate::registry::{WorkerRegistry, WorkerSnapshot};
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const COMPLETIONS_PATH: &str = "/v1/completions";
pub const MODELS_PATH: &str = "/v1/models";

#[derive(Debug, Clone)]
pub struct LBState {
    pub registry: Arc<WorkerRegistry>,
    pub poller: UtilizationPoller,
    pub forwarder: Forwarder,
    pub sink: Arc<dyn EventSink>,
    pub refresh_mode: RefreshMode,
    pub max_forward_attempts: usize,
    pub log_interval: u64,
}

impl LBState {
    pub fn new(lb_config: &LBConfig, sink: Arc<dyn EventSink>) -> anyhow::Result<Self> {
        lb_config.validate()?;
        let poll_client = reqwest::Client::builder()
            .timeout(lb_config.poll_timeout())
            .build()?;
        let forwarder = Forwarder::new(
            lb_config.request_timeout(),
            lb_config.max_connections,
            lb_config.max_keepalive_connections,
        )?;
        let registry = Arc::new(WorkerRegistry::new(lb_config.worker_addresses()));
        log::info!(
            "Routing across {} workers: {}",
            registry.len(),
            registry
                .list()
                .iter()
                .map(|w| w.address())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self {
            registry,
            poller: UtilizationPoller::new(poll_client, lb_config.poll_timeout()),
            forwarder,
            sink,
            refresh_mode: lb_config.refresh_mode,
            max_forward_attempts: lb_config.max_forward_attempts,
            log_interval: lb_config.log_interval_secs,
        })
    }

    /// In background mode, complete one refresh and then start the refresh
    /// loop, so the registry holds real readings before the first request.
    /// Must be called from within a tokio runtime.
    pub async fn start_refresh(&self) -> Option<tokio::task::JoinHandle<()>> {
        match self.refresh_mode {
            RefreshMode::Background { interval } => {
                self.refresh().await;
                log::info!("Background utilization refresh every {:?}", interval);
                Some(tokio::spawn(self.clone().periodic_refresh(interval)))
            }
            RefreshMode::PerRequest => None,
        }
    }

    /// Refresh forever, one `interval` apart. A slow sweep delays the next one
    /// instead of bunching them up.
    pub async fn periodic_refresh(self, interval: Duration) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }

    /// Probe every worker once. Per-worker failures are logged by the poller
    /// when their state changes.
    pub async fn refresh(&self) {
        let _event = self
            .sink
            .record_event(EventKind::Internal, "refresh", Map::new());
        if let Err(e) = self.poller.refresh(&self.registry).await {
            log::debug!("{}", e);
        }
    }

    /// Refresh (when per-request), pick the least utilized worker and relay the
    /// request to it. With `max_forward_attempts > 1`, a worker that fails is
    /// excluded and the next best one from the same snapshot is tried.
    pub async fn route_completion(
        &self,
        request: ForwardRequest,
    ) -> Result<ProxyResponse, RouteError> {
        if self.refresh_mode == RefreshMode::PerRequest {
            self.refresh().await;
        }

        let snapshot = self.registry.snapshot();
        let mut excluded = Vec::new();
        let mut last_err = None;
        for _ in 0..self.max_forward_attempts {
            let chosen = match select_excluding(&snapshot, &excluded) {
                Ok(chosen) => chosen,
                Err(e) => return Err(last_err.unwrap_or(e)),
            };
            let worker = self
                .registry
                .get(chosen.index)
                .ok_or(RouteError::NoWorkersAvailable)?;

            let mut attributes = Map::new();
            attributes.insert("worker".to_string(), json!(chosen.address));
            attributes.insert(
                "counter".to_string(),
                json!({ "utilization": chosen.utilization }),
            );
            let _event = self
                .sink
                .record_event(EventKind::External, "forward", attributes);

            match self.forwarder.forward(worker, &request).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    log::error!("Forwarding to {} failed: {}", chosen.address, e);
                    excluded.push(chosen.index);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(RouteError::NoWorkersAvailable))
    }

    /// Model listing is served by the first worker; no refresh is needed.
    pub async fn list_models(&self, request: ForwardRequest) -> Result<ProxyResponse, RouteError> {
        let worker = self
            .registry
            .first()
            .ok_or(RouteError::NoWorkersAvailable)?;
        self.forwarder.forward(worker, &request).await
    }

    pub fn get_loads(&self) -> Vec<WorkerSnapshot> {
        self.registry.snapshot()
    }

    pub fn loads_json(&self) -> Value {
        json!(self.get_loads())
    }

    pub fn completion_request(headers: HeaderMap, body: Bytes) -> ForwardRequest {
        ForwardRequest::new(Method::POST, COMPLETIONS_PATH, headers, body)
    }

    pub fn models_request(headers: HeaderMap) -> ForwardRequest {
        ForwardRequest::new(Method::GET, MODELS_PATH, headers, Bytes::new())
    }
}
