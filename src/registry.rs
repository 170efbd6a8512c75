use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One backend inference server.
///
/// The utilization gauge is stored as the bit pattern of an `f64` so that a
/// reader never observes a half-written value and writers never take a lock.
#[derive(Debug)]
pub struct Worker {
    address: String,
    utilization: AtomicU64,
    healthy: AtomicBool,
}

impl Worker {
    pub fn new(address: impl Into<String>) -> Self {
        Worker {
            address: address.into(),
            utilization: AtomicU64::new(0f64.to_bits()),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn utilization(&self) -> f64 {
        f64::from_bits(self.utilization.load(Ordering::Acquire))
    }

    pub fn set_utilization(&self, value: f64) {
        self.utilization.store(value.to_bits(), Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Record whether the latest utilization reading succeeded. Returns `true` when it differs
    /// from the previous outcome.
    pub fn set_healthy(&self, ok: bool) -> bool {
        self.healthy.swap(ok, Ordering::AcqRel) != ok
    }

    /// Join an API path onto the worker's base address.
    pub fn api_path(&self, api_path: &str) -> String {
        if api_path.starts_with('/') {
            format!("{}{}", self.address, api_path)
        } else {
            format!("{}/{}", self.address, api_path)
        }
    }
}

/// A worker's reading as observed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    pub index: usize,
    pub address: String,
    pub utilization: f64,
}

/// Fixed, ordered pool of workers. Cardinality never changes after construction.
#[derive(Debug)]
pub struct WorkerRegistry {
    workers: Vec<Arc<Worker>>,
    by_address: HashMap<String, usize>,
}

impl WorkerRegistry {
    /// Every worker starts at zero utilization, so an unprobed worker looks
    /// maximally attractive until its first reading arrives.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let workers: Vec<Arc<Worker>> = addresses
            .into_iter()
            .map(|addr| Arc::new(Worker::new(addr)))
            .collect();
        let by_address = workers
            .iter()
            .enumerate()
            .map(|(i, w)| (w.address.clone(), i))
            .collect();
        WorkerRegistry {
            workers,
            by_address,
        }
    }

    pub fn list(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn first(&self) -> Option<&Arc<Worker>> {
        self.workers.first()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Worker>> {
        self.workers.get(index)
    }

    /// Returns `false` if no worker has this address.
    pub fn update_utilization(&self, address: &str, value: f64) -> bool {
        match self.by_address.get(address) {
            Some(&i) => {
                self.workers[i].set_utilization(value);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers
            .iter()
            .enumerate()
            .map(|(index, w)| WorkerSnapshot {
                index,
                address: w.address.clone(),
                utilization: w.utilization(),
            })
            .collect()
    }
}
