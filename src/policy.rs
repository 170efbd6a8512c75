//! Least-utilization worker selection.

use crate::error::RouteError;
use crate::registry::WorkerSnapshot;
use std::cmp::Ordering;

/// Pick the worker with the lowest utilization. Ties go to the worker that
/// appears first in registry order.
pub fn select(workers: &[WorkerSnapshot]) -> Result<&WorkerSnapshot, RouteError> {
    select_excluding(workers, &[])
}

/// Like [`select`], skipping workers whose registry index is in `excluded`.
pub fn select_excluding<'a>(
    workers: &'a [WorkerSnapshot],
    excluded: &[usize],
) -> Result<&'a WorkerSnapshot, RouteError> {
    let mut best: Option<&WorkerSnapshot> = None;
    for worker in workers.iter().filter(|w| !excluded.contains(&w.index)) {
        best = match best {
            Some(current)
                if worker.utilization.total_cmp(&current.utilization) != Ordering::Less =>
            {
                Some(current)
            }
            _ => Some(worker),
        };
    }
    let best = best.ok_or(RouteError::NoWorkersAvailable)?;
    log::debug!(
        "Selected {} with utilization {:.4}",
        best.address,
        best.utilization
    );
    Ok(best)
}
