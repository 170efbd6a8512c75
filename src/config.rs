use std::path::PathBuf;
use std::time::Duration;

/// How the worker registry is kept fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Probe every worker before each routed completion.
    #[default]
    PerRequest,
    /// Probe every worker on a fixed interval; requests read the latest snapshot.
    Background { interval: Duration },
}

#[derive(Debug, Clone)]
pub struct LBConfig {
    pub host: String,
    pub port: u16,
    pub num_workers: usize,
    pub worker_base_port: u16,
    pub worker_urls: Vec<String>,
    pub max_connections: usize,
    pub max_keepalive_connections: usize,
    pub request_timeout_secs: u64,
    pub poll_timeout_ms: u64,
    pub keep_alive_secs: u64,
    pub refresh_mode: RefreshMode,
    pub max_forward_attempts: usize,
    pub log_interval_secs: u64,
    pub profile_path: Option<PathBuf>,
}

impl Default for LBConfig {
    fn default() -> Self {
        LBConfig {
            host: "localhost".to_string(),
            port: 8080,
            num_workers: 8,
            worker_base_port: 8081,
            worker_urls: Vec::new(),
            max_connections: 1024,
            max_keepalive_connections: 256,
            request_timeout_secs: 300,
            poll_timeout_ms: 2000,
            keep_alive_secs: 5,
            refresh_mode: RefreshMode::default(),
            max_forward_attempts: 1,
            log_interval_secs: 0,
            profile_path: None,
        }
    }
}

impl LBConfig {
    /// Worker base URLs in registry order.
    ///
    /// An explicit `worker_urls` list wins; otherwise workers are addressed on
    /// sequential local ports starting at `worker_base_port`.
    pub fn worker_addresses(&self) -> Vec<String> {
        if !self.worker_urls.is_empty() {
            return self
                .worker_urls
                .iter()
                .map(|url| url.trim_end_matches('/').to_string())
                .collect();
        }
        (0..self.num_workers)
            .map(|i| format!("http://localhost:{}", self.worker_base_port as usize + i))
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_urls.is_empty() {
            if self.num_workers == 0 {
                anyhow::bail!("num_workers must be at least 1");
            }
            if self.worker_base_port as usize + self.num_workers - 1 > u16::MAX as usize {
                anyhow::bail!(
                    "{} workers starting at port {} exceed the port range",
                    self.num_workers,
                    self.worker_base_port
                );
            }
        }
        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be at least 1");
        }
        if self.max_keepalive_connections > self.max_connections {
            anyhow::bail!(
                "max_keepalive_connections ({}) cannot exceed max_connections ({})",
                self.max_keepalive_connections,
                self.max_connections
            );
        }
        if self.request_timeout_secs == 0 || self.poll_timeout_ms == 0 {
            anyhow::bail!("request and poll timeouts must be non-zero");
        }
        if let RefreshMode::Background { interval } = self.refresh_mode {
            if interval.is_zero() {
                anyhow::bail!("background refresh interval must be non-zero");
            }
        }
        if self.max_forward_attempts == 0 {
            anyhow::bail!("max_forward_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
