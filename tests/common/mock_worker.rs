use actix_web::dev::ServerHandle;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use bytes::Bytes;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How the mock answers utilization probes.
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub enum ProbeBehavior {
    Healthy,
    ServerError,
    Malformed,
}

/// Canned completion response.
#[derive(Clone, Debug)]
pub struct CompletionReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Configuration for mock worker behavior
#[derive(Clone, Debug)]
pub struct MockWorkerConfig {
    pub utilization: f64,
    pub probe_delay: Duration,
    pub probe_behavior: ProbeBehavior,
    pub completion_delay: Duration,
    pub completion: Option<CompletionReply>,
    pub model_id: String,
}

impl Default for MockWorkerConfig {
    fn default() -> Self {
        MockWorkerConfig {
            utilization: 0.0,
            probe_delay: Duration::ZERO,
            probe_behavior: ProbeBehavior::Healthy,
            completion_delay: Duration::ZERO,
            completion: None,
            model_id: "mock-model".to_string(),
        }
    }
}

#[allow(dead_code)]
impl MockWorkerConfig {
    pub fn with_utilization(utilization: f64) -> Self {
        MockWorkerConfig {
            utilization,
            ..Default::default()
        }
    }
}

struct MockState {
    config: Mutex<MockWorkerConfig>,
    probes: AtomicUsize,
    completions: AtomicUsize,
    last_request: Mutex<Option<(Vec<(String, String)>, Bytes)>>,
}

/// Mock inference worker listening on an ephemeral local port.
pub struct MockWorker {
    pub url: String,
    state: web::Data<MockState>,
    handle: ServerHandle,
}

#[allow(dead_code)]
impl MockWorker {
    pub async fn start(config: MockWorkerConfig) -> std::io::Result<MockWorker> {
        let state = web::Data::new(MockState {
            config: Mutex::new(config),
            probes: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route(
                    "/device/kv_cache_utilization",
                    web::get().to(utilization_handler),
                )
                .route("/v1/models", web::get().to(models_handler))
                .route("/v1/completions", web::post().to(completions_handler))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))?;
        let port = server.addrs()[0].port();
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Ok(MockWorker {
            url: format!("http://127.0.0.1:{}", port),
            state,
            handle,
        })
    }

    pub fn set_utilization(&self, utilization: f64) {
        self.state.config.lock().unwrap().utilization = utilization;
    }

    pub fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn completion_count(&self) -> usize {
        self.state.completions.load(Ordering::SeqCst)
    }

    /// Headers and body of the most recent completion request.
    pub fn last_request(&self) -> Option<(Vec<(String, String)>, Bytes)> {
        self.state.last_request.lock().unwrap().clone()
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// An address nothing listens on.
#[allow(dead_code)]
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

async fn utilization_handler(state: web::Data<MockState>) -> HttpResponse {
    state.probes.fetch_add(1, Ordering::SeqCst);
    let config = state.config.lock().unwrap().clone();
    if !config.probe_delay.is_zero() {
        actix_web::rt::time::sleep(config.probe_delay).await;
    }
    match config.probe_behavior {
        ProbeBehavior::Healthy => HttpResponse::Ok().json(json!({
            "utilization": config.utilization,
        })),
        ProbeBehavior::ServerError => HttpResponse::InternalServerError().finish(),
        ProbeBehavior::Malformed => HttpResponse::Ok().json(json!({
            "usage": config.utilization,
        })),
    }
}

async fn models_handler(state: web::Data<MockState>) -> HttpResponse {
    let model_id = state.config.lock().unwrap().model_id.clone();
    HttpResponse::Ok().json(json!({
        "object": "list",
        "data": [{
            "id": model_id,
            "object": "model",
            "owned_by": "mock",
        }]
    }))
}

async fn completions_handler(
    req: HttpRequest,
    body: Bytes,
    state: web::Data<MockState>,
) -> HttpResponse {
    state.completions.fetch_add(1, Ordering::SeqCst);
    let headers = req
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    *state.last_request.lock().unwrap() = Some((headers, body.clone()));

    let config = state.config.lock().unwrap().clone();
    if !config.completion_delay.is_zero() {
        actix_web::rt::time::sleep(config.completion_delay).await;
    }
    match config.completion {
        Some(reply) => {
            let status = actix_web::http::StatusCode::from_u16(reply.status).unwrap();
            let mut builder = HttpResponse::build(status);
            for (name, value) in reply.headers {
                builder.insert_header((name, value));
            }
            builder.body(reply.body)
        }
        None => HttpResponse::Ok().json(json!({
            "object": "text_completion",
            "model": config.model_id,
            "choices": [{"index": 0, "text": "ok", "finish_reason": "stop"}],
        })),
    }
}
