use clap::{Parser, ValueEnum};
use sgl_kvlb::profiler::{EventSink, NoopSink, Profiler};
use sgl_kvlb::{LBConfig, LBState, RefreshMode, server};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RefreshModeArg {
    PerRequest,
    Background,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "KV-cache utilization aware load balancer", long_about = None)]
struct Args {
    #[arg(long, default_value = "localhost", help = "Host address to bind the server to")]
    host: String,

    #[arg(long, default_value_t = 8080, help = "Port number to listen on")]
    port: u16,

    #[arg(
        long,
        short = 'w',
        default_value_t = 8,
        help = "Number of workers on sequential local ports"
    )]
    num_workers: usize,

    #[arg(long, default_value_t = 8081, help = "Port of the first local worker")]
    worker_base_port: u16,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Comma-separated worker URLs; overrides --num-workers"
    )]
    worker_urls: Vec<String>,

    #[arg(long, default_value_t = 1024, help = "Maximum concurrent forwarded requests")]
    max_connections: usize,

    #[arg(
        long,
        default_value_t = 256,
        help = "Maximum idle keep-alive connections per worker"
    )]
    max_keepalive_connections: usize,

    #[arg(long, default_value_t = 300, help = "Forwarded request timeout in seconds")]
    request_timeout_secs: u64,

    #[arg(
        long,
        default_value_t = 2000,
        help = "Utilization probe timeout in milliseconds"
    )]
    poll_timeout_ms: u64,

    #[arg(long, default_value_t = 5, help = "Inbound keep-alive timeout in seconds")]
    keep_alive_secs: u64,

    #[arg(
        long,
        value_enum,
        default_value_t = RefreshModeArg::PerRequest,
        help = "Probe workers before every request or on a background interval"
    )]
    refresh_mode: RefreshModeArg,

    #[arg(
        long,
        default_value_t = 500,
        help = "Refresh interval in milliseconds for --refresh-mode background"
    )]
    refresh_interval_ms: u64,

    #[arg(
        long,
        default_value_t = 1,
        help = "Workers to try per request before failing; 1 disables failover"
    )]
    max_forward_attempts: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Seconds between utilization log lines; 0 disables"
    )]
    log_interval: u64,

    #[arg(long, help = "Write trace events to this file")]
    profile_path: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> LBConfig {
        let refresh_mode = match self.refresh_mode {
            RefreshModeArg::PerRequest => RefreshMode::PerRequest,
            RefreshModeArg::Background => RefreshMode::Background {
                interval: Duration::from_millis(self.refresh_interval_ms),
            },
        };
        LBConfig {
            host: self.host,
            port: self.port,
            num_workers: self.num_workers,
            worker_base_port: self.worker_base_port,
            worker_urls: self.worker_urls,
            max_connections: self.max_connections,
            max_keepalive_connections: self.max_keepalive_connections,
            request_timeout_secs: self.request_timeout_secs,
            poll_timeout_ms: self.poll_timeout_ms,
            keep_alive_secs: self.keep_alive_secs,
            refresh_mode,
            max_forward_attempts: self.max_forward_attempts,
            log_interval_secs: self.log_interval,
            profile_path: self.profile_path,
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    server::init_logging();
    let lb_config = Args::parse().into_config();

    let sink: Arc<dyn EventSink> = match &lb_config.profile_path {
        Some(path) => Arc::new(Profiler::start(path).await?),
        None => Arc::new(NoopSink),
    };
    let lb_state = LBState::new(&lb_config, sink)?;

    tokio::select! {
        res = server::startup(lb_config, lb_state) => res?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl+C, shutting down");
        }
    }
    Ok(())
}
