//! Trace-event recording.
//!
//! Events are written in the Chrome trace-event "JSON array" format so the
//! output opens directly in `chrome://tracing` or Perfetto. The file starts
//! with `[` and every event is followed by `,`; viewers accept the missing
//! closing bracket.
//!
//! A [`Profiler`] is an explicit handle: cloning it shares one channel that
//! feeds a single writer task. Nothing is global.

use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Counter,
    External,
    Internal,
}

impl EventKind {
    fn tid(self) -> u64 {
        match self {
            EventKind::Counter => 1,
            EventKind::External => 2,
            EventKind::Internal => 3,
        }
    }
}

/// Receiver of scoped events. Implementations must not influence routing.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Start an event; it is completed when the returned guard is dropped.
    fn record_event(&self, kind: EventKind, name: &str, attributes: Map<String, Value>)
    -> EventGuard;
}

/// Completes its event with the elapsed duration on drop.
pub struct EventGuard {
    pending: Option<PendingEvent>,
}

struct PendingEvent {
    tx: mpsc::UnboundedSender<String>,
    kind: EventKind,
    name: String,
    attributes: Map<String, Value>,
    ts_us: f64,
    started: Instant,
}

impl EventGuard {
    pub fn noop() -> Self {
        EventGuard { pending: None }
    }
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        if let Some(ev) = self.pending.take() {
            let entry = json!({
                "pid": 1,
                "tid": ev.kind.tid(),
                "ph": "X",
                "name": ev.name,
                "ts": ev.ts_us,
                "dur": ev.started.elapsed().as_secs_f64() * 1_000_000.0,
                "args": ev.attributes,
            });
            // Writer gone means the process is shutting down.
            let _ = ev.tx.send(format!("{},", entry));
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record_event(&self, _: EventKind, _: &str, _: Map<String, Value>) -> EventGuard {
        EventGuard::noop()
    }
}

#[derive(Debug, Clone)]
pub struct Profiler {
    tx: mpsc::UnboundedSender<String>,
}

impl Profiler {
    /// Truncate `path`, write the opening bracket and spawn the writer task.
    /// Must be called from within a tokio runtime.
    pub async fn start(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(b"[").await?;
        file.flush().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_events(file, rx, path.clone()));
        log::info!("Recording trace events to {}", path.display());
        Ok(Profiler { tx })
    }

    fn now_us() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1_000_000.0)
            .unwrap_or_default()
    }
}

impl EventSink for Profiler {
    fn record_event(
        &self,
        kind: EventKind,
        name: &str,
        mut attributes: Map<String, Value>,
    ) -> EventGuard {
        let ts_us = Self::now_us();
        if let Some(counter) = attributes.remove("counter") {
            let entry = json!({
                "pid": 1,
                "tid": EventKind::Counter.tid(),
                "ph": "C",
                "name": "router",
                "ts": ts_us,
                "args": counter,
            });
            let _ = self.tx.send(format!("{},", entry));
        }
        EventGuard {
            pending: Some(PendingEvent {
                tx: self.tx.clone(),
                kind,
                name: name.to_string(),
                attributes,
                ts_us,
                started: Instant::now(),
            }),
        }
    }
}

async fn write_events(
    mut file: tokio::fs::File,
    mut rx: mpsc::UnboundedReceiver<String>,
    path: PathBuf,
) {
    while let Some(mut content) = rx.recv().await {
        while let Ok(more) = rx.try_recv() {
            content.push_str(&more);
        }
        if let Err(e) = file.write_all(content.as_bytes()).await {
            log::error!("Failed to write trace events to {}: {}", path.display(), e);
            return;
        }
        if let Err(e) = file.flush().await {
            log::error!("Failed to flush trace events to {}: {}", path.display(), e);
            return;
        }
    }
}
