use crate::config::LBConfig;
use crate::error::RouteError;
use crate::lb_state::LBState;
use crate::proxy::forwardable_request_headers;
use actix_web::{HttpRequest, HttpResponse, HttpServer, get, post, web};
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::io::Write;
use std::time::Duration;

/// Completion prompts can be far larger than actix's default payload limit.
const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

fn caller_headers(req: &HttpRequest) -> HeaderMap {
    forwardable_request_headers(
        req.headers()
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_bytes())),
    )
}

#[get("/health")]
pub async fn health(_req: HttpRequest, _: web::Data<LBState>) -> HttpResponse {
    HttpResponse::Ok().body("Ok")
}

#[get("/get_loads")]
pub async fn get_loads(_req: HttpRequest, app_state: web::Data<LBState>) -> HttpResponse {
    HttpResponse::Ok().json(app_state.loads_json())
}

#[get("/v1/models")]
pub async fn list_models(
    req: HttpRequest,
    app_state: web::Data<LBState>,
) -> Result<HttpResponse, RouteError> {
    let request = LBState::models_request(caller_headers(&req));
    Ok(app_state.list_models(request).await?.into_http_response())
}

#[post("/v1/completions")]
pub async fn completions(
    req: HttpRequest,
    body: Bytes,
    app_state: web::Data<LBState>,
) -> Result<HttpResponse, RouteError> {
    let request = LBState::completion_request(caller_headers(&req), body);
    Ok(app_state.route_completion(request).await?.into_http_response())
}

/// Register every route. Shared by [`startup`] and the in-process tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_PAYLOAD_SIZE))
        .service(health)
        .service(get_loads)
        .service(list_models)
        .service(completions);
}

pub async fn periodic_logging(lb_state: LBState) {
    loop {
        tokio::time::sleep(Duration::from_secs(lb_state.log_interval)).await;
        let loads = lb_state
            .get_loads()
            .into_iter()
            .map(|w| format!("{}: {:.4}", w.address, w.utilization))
            .collect::<Vec<_>>();
        log::info!("Worker utilization: {}", loads.join(", "));
    }
}

/// default level is info, `RUST_LOG` overrides it
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

pub async fn startup(lb_config: LBConfig, lb_state: LBState) -> std::io::Result<()> {
    lb_state.start_refresh().await;
    if lb_state.log_interval > 0 {
        tokio::spawn(periodic_logging(lb_state.clone()));
    }

    let app_state = web::Data::new(lb_state);
    log::info!("Starting server at {}:{}", lb_config.host, lb_config.port);

    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .keep_alive(Duration::from_secs(lb_config.keep_alive_secs))
    .bind((lb_config.host, lb_config.port))?
    .run()
    .await
}
