use std::collections::HashMap;

use jobctl_core::CacheStatus;

/// Worker-pool occupancy and per-status counts, published on a
/// `tokio::sync::watch` channel every time the counts change. Useful for an
/// operator CLI or a future health endpoint; nothing in this crate depends
/// on it being read.
#[derive(Debug, Clone, Default)]
pub struct ManagerSnapshot {
    /// Whether the manager has been asked to stop.
    pub stop_requested: bool,
    /// Size of the worker pool draining the task channel.
    pub worker_pool_size: usize,
    /// Number of entries currently counted as "running" against `maxJobs`.
    pub running_jobs: usize,
    /// Total cache entries, bucketed by cache status.
    pub counts_by_status: HashMap<CacheStatus, usize>,
}

impl ManagerSnapshot {
    pub fn total_jobs(&self) -> usize {
        self.counts_by_status.values().sum()
    }
}
