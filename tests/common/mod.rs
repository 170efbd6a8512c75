pub mod mock_worker;

use serde_json::{Map, Value};
use sgl_kvlb::profiler::{EventGuard, EventKind, EventSink, NoopSink};
use sgl_kvlb::{LBConfig, LBState, RefreshMode};
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub fn test_config(worker_urls: Vec<String>, refresh_mode: RefreshMode) -> LBConfig {
    LBConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        worker_urls,
        poll_timeout_ms: 1000,
        request_timeout_secs: 5,
        refresh_mode,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn test_state(config: &LBConfig) -> LBState {
    LBState::new(config, Arc::new(NoopSink)).expect("valid test config")
}

/// Keeps the names of recorded events; the guards it hands out record nothing.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(EventKind, String)>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, kind: EventKind, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, n)| *k == kind && n == name)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn record_event(&self, kind: EventKind, name: &str, _: Map<String, Value>) -> EventGuard {
        self.events.lock().unwrap().push((kind, name.to_string()));
        EventGuard::noop()
    }
}
