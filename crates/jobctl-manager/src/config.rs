use std::time::Duration;

/// Tunables for the two pollers, the worker pool, and the retry/retention
/// policy. Every field has a documented default so a caller can start from
/// [`ManagerConfig::default`] and override only what it cares about.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Cache poller tick interval. Default 2s.
    pub poll_interval: Duration,
    /// Executor poller tick interval. Default 30s.
    pub executor_poll_interval: Duration,
    /// Lease duration for cache-only operations. Default 10s.
    pub ticket_duration: Duration,
    /// Lease duration for operations that touch the executor
    /// (`LAUNCH_SCHEDULED`, `EXECUTOR_COMPLETE`, `EXECUTOR_SUCCEEDED`, and
    /// every `recordPollStatus` task). Default 120s.
    pub executor_ticket_duration: Duration,
    /// Maximum number of jobs occupying a `STATUS_FOR_RUNNING_JOBS` slot at
    /// once. Default 6.
    pub max_jobs: usize,
    /// Size of the bounded worker pool draining the task channel. Default 8.
    pub worker_pool_size: usize,
    /// Delay between a job reaching `READY_TO_REMOVE` and its entry being
    /// physically removed from the cache. Default 120s.
    pub retention_delay: Duration,
    /// Soft ceiling on how long a job may occupy a running slot before it is
    /// considered abandoned; not independently enforced by this crate today
    /// (no watchdog reads it yet) but carried so a future one can. Default 12h.
    pub job_timeout: Duration,
    /// Retries allowed for a retriable error before the job is failed.
    /// Default 2.
    pub retry_limit: u32,
    /// Delay before the pollers start ticking after [`crate::start_manager`]
    /// is called. Default 10s.
    pub startup_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            executor_poll_interval: Duration::from_secs(30),
            ticket_duration: Duration::from_secs(10),
            executor_ticket_duration: Duration::from_secs(120),
            max_jobs: 6,
            worker_pool_size: 8,
            retention_delay: Duration::from_secs(120),
            job_timeout: Duration::from_secs(12 * 60 * 60),
            retry_limit: 2,
            startup_delay: Duration::from_secs(10),
        }
    }
}
