//! Job Manager: drives the cache-status FSM by periodically scanning
//! the cache and submitting tasks to a bounded worker pool; applies the
//! retry/fail policy; chains consecutive transitions to cut latency.
//!
//! The processor (`jobctl-processor`) is pure with respect to the cache —
//! this crate is the only one that calls [`jobctl_cache::Cache::update_entry`].

pub mod config;
mod snapshot;
mod task;

pub use config::ManagerConfig;
pub use snapshot::ManagerSnapshot;
pub use task::Task;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jobctl_cache::Cache;
use jobctl_core::{CacheStatus, DelegateIssuer, JobKey, JobState};
use jobctl_executor::Executor;
use jobctl_processor::JobProcessor;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The cache instantiated over this crate's concrete status/value types.
pub type JobCache = Cache<CacheStatus, JobState>;

/// Everything the pollers and per-update tasks need; shared behind an `Arc`
/// by the worker tasks and the poller task.
struct Shared {
    cache: JobCache,
    processor: Arc<JobProcessor>,
    executor: Arc<dyn Executor>,
    delegate_issuer: Arc<dyn DelegateIssuer>,
    config: ManagerConfig,
    work_tx: mpsc::Sender<Task>,
    snapshot_tx: watch::Sender<ManagerSnapshot>,
    wake: Notify,
}

impl Shared {
    fn submit(&self, task: Task) {
        if self.work_tx.try_send(task).is_err() {
            tracing::warn!("job manager work channel full or closed, dropping task");
        }
    }

    /// Lease-duration selector: operations that touch the executor
    /// use the executor lease, everything else uses the cache lease.
    fn lease_for(&self, status: CacheStatus) -> Duration {
        match status {
            CacheStatus::LaunchScheduled
            | CacheStatus::ExecutorComplete
            | CacheStatus::ExecutorSucceeded => self.config.executor_ticket_duration,
            _ => self.config.ticket_duration,
        }
    }

    fn push_snapshot(&self, stop_requested: bool) {
        let all = self.cache.query_state(|_| true, true);
        let mut counts_by_status: HashMap<CacheStatus, usize> = HashMap::new();
        let mut running_jobs = 0;
        for entry in &all {
            *counts_by_status.entry(entry.status.clone()).or_insert(0) += 1;
            if entry.status.is_running_job() {
                running_jobs += 1;
            }
        }
        let snapshot = ManagerSnapshot {
            stop_requested,
            worker_pool_size: self.config.worker_pool_size,
            running_jobs,
            counts_by_status,
        };
        let _ = self.snapshot_tx.send(snapshot);
    }

    /// Cache poller tick: the unconditional update pass, then the
    /// capacity-gated launch pass.
    async fn cache_poll_tick(&self) {
        let _span = tracing::info_span!("cache_poll_tick").entered();

        for entry in self.cache.query_state(|s| s.is_for_update(), false) {
            let lease = self.lease_for(entry.status);
            self.submit(Task::ProcessUpdate {
                job_key: entry.key,
                revision: entry.revision,
                lease,
            });
        }

        let launch_candidates = self.cache.query_state(|s| s.is_for_launch(), false);
        let running = self.cache.query_state(|s| s.is_running_job(), true);
        let capacity = self.config.max_jobs.saturating_sub(running.len());
        tracing::debug!(
            launch_candidates = launch_candidates.len(),
            running = running.len(),
            capacity,
            "launch capacity pass"
        );
        for entry in launch_candidates.into_iter().take(capacity) {
            self.submit(Task::ProcessUpdate {
                job_key: entry.key,
                revision: entry.revision,
                lease: self.config.ticket_duration,
            });
        }

        self.push_snapshot(false);
    }

    /// Executor poller tick: one batched `pollBatches` call, then a
    /// `recordPollStatus` task for every job whose observed status changed.
    async fn executor_poll_tick(&self) {
        let _span = tracing::info_span!("executor_poll_tick").entered();

        let running: Vec<_> = self
            .cache
            .query_state(|s| s.is_running_job(), false)
            .into_iter()
            .filter(|e| e.value.executor_state.is_some())
            .collect();
        if running.is_empty() {
            return;
        }

        let batch: Vec<_> = running
            .iter()
            .map(|e| (e.key.clone(), e.value.executor_state.clone().unwrap()))
            .collect();
        let results = match self.executor.poll_batches(&batch).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "poll_batches failed, retrying next tick");
                return;
            }
        };

        for (entry, info) in running.into_iter().zip(results) {
            if entry.value.executor_status != Some(info.status) {
                self.submit(Task::RecordStatus {
                    job_key: entry.key,
                    revision: entry.revision,
                    info,
                });
            }
        }
    }

    /// The per-update task: open ticket, restore transient delegate,
    /// dispatch by `cacheStatus`, apply retry/fail policy, persist, chain.
    async fn process_update(&self, job_key: JobKey, revision: u64, lease: Duration) {
        let span = tracing::info_span!("process_update", job_key = %job_key, revision);
        let _enter = span.enter();

        let ticket = self.cache.open_ticket(&job_key, revision, lease);
        if !ticket.is_granted() {
            tracing::trace!("ticket superseded or missing, dropping task");
            return;
        }

        let entry = match self.cache.get_entry(&ticket) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read entry under granted ticket");
                return;
            }
        };
        let mut state = entry.value;

        if let Err(err) = state.restore_delegate(self.delegate_issuer.as_ref()) {
            tracing::warn!(error = %err, "failed to restore delegate credential, retrying next poll");
            return;
        }

        let cache_status = state.cache_status;
        let dispatch_result = self.dispatch(cache_status, state.clone()).await;
        let new_state = match dispatch_result {
            Ok(mut new_state) => {
                new_state.retries = 0;
                new_state
            }
            Err(err) => self.apply_retry_fail_policy(state, err).await,
        };

        let new_cache_status = new_state.cache_status;
        match self.cache.update_entry(&ticket, new_cache_status, new_state) {
            Ok(new_revision) => {
                self.push_snapshot(false);
                if new_cache_status == CacheStatus::RemovalScheduled {
                    self.schedule_removal(job_key.clone(), new_revision);
                }
                if new_cache_status.is_for_update() {
                    self.submit(Task::ProcessUpdate {
                        job_key,
                        revision: new_revision,
                        lease: self.lease_for(new_cache_status),
                    });
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "update_entry failed, retrying next poll");
            }
        }
    }

    async fn dispatch(
        &self,
        cache_status: CacheStatus,
        state: JobState,
    ) -> Result<JobState, jobctl_processor::ProcessorError> {
        match cache_status {
            CacheStatus::QueuedInTrac => self.processor.schedule_launch(state).await,
            CacheStatus::LaunchScheduled => self.processor.launch_job(state).await,
            CacheStatus::ExecutorComplete | CacheStatus::ExecutorSucceeded => {
                self.processor.fetch_job_result(state).await
            }
            CacheStatus::ExecutorFailed
            | CacheStatus::ResultsReceived
            | CacheStatus::ResultsInvalid => self.processor.save_result_metadata(state).await,
            CacheStatus::ResultsSaved => self.processor.clean_up_job(state).await,
            CacheStatus::ReadyToRemove => self.processor.schedule_removal(state).await,
            // Not reachable through the dispatch table; a stray task against
            // one of these statuses is a no-op rather than an error.
            CacheStatus::QueuedInExecutor
            | CacheStatus::RunningInExecutor
            | CacheStatus::SentToExecutor
            | CacheStatus::RemovalScheduled
            | CacheStatus::ProcessingFailed => Ok(state),
        }
    }

    /// Retry/fail policy. Non-retriable errors, and retriable errors
    /// once `retries >= retry_limit`, go through `handleProcessingFailed`
    /// in the same task — the manager never persists the
    /// intermediate `PROCESSING_FAILED` cache status on its own, since
    /// `handleProcessingFailed` collapses straight through to
    /// `READY_TO_REMOVE`.
    async fn apply_retry_fail_policy(
        &self,
        mut state: JobState,
        err: jobctl_processor::ProcessorError,
    ) -> JobState {
        let retriable = err.is_retriable();
        if retriable && state.retries < self.config.retry_limit {
            tracing::warn!(error = %err, retries = state.retries, "retriable error, will retry");
            state.retries += 1;
            return state;
        }

        tracing::error!(error = %err, retriable, retries = state.retries, "non-retriable or retries exhausted, failing job");
        match self
            .processor
            .handle_processing_failed(state.clone(), err.to_string())
            .await
        {
            Ok(failed_state) => failed_state,
            Err(publish_err) => {
                tracing::error!(error = %publish_err, "failed to publish failure metadata, leaving entry untouched");
                state
            }
        }
    }

    fn schedule_removal(&self, job_key: JobKey, revision: u64) {
        let delay = self.config.retention_delay;
        let task = Task::Remove { job_key, revision };
        let tx = self.work_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(task).await;
        });
    }

    async fn remove_entry(&self, job_key: JobKey, revision: u64) {
        let ticket = self
            .cache
            .open_ticket(&job_key, revision, self.config.ticket_duration);
        if !ticket.is_granted() {
            tracing::trace!(job_key = %job_key, "removal task superseded, entry already gone or advanced");
            return;
        }
        if let Err(err) = self.cache.remove_entry(&ticket) {
            tracing::warn!(job_key = %job_key, error = %err, "remove_entry failed");
        } else {
            self.push_snapshot(false);
        }
    }

    async fn handle_task(&self, task: Task) {
        match task {
            Task::ProcessUpdate {
                job_key,
                revision,
                lease,
            } => self.process_update(job_key, revision, lease).await,
            Task::RecordStatus {
                job_key,
                revision,
                info,
            } => self.record_status(job_key, revision, info).await,
            Task::Remove { job_key, revision } => self.remove_entry(job_key, revision).await,
        }
    }

    /// The executor poller's `recordPollStatus` op: distinct from [`Self::process_update`] because it
    /// carries an already-observed [`jobctl_executor::ExecutorJobInfo`]
    /// rather than re-deriving the op from `cacheStatus`.
    async fn record_status(&self, job_key: JobKey, revision: u64, info: jobctl_executor::ExecutorJobInfo) {
        let span = tracing::info_span!("record_status", job_key = %job_key, revision);
        let _enter = span.enter();

        let lease = self.config.executor_ticket_duration;
        let ticket = self.cache.open_ticket(&job_key, revision, lease);
        if !ticket.is_granted() {
            tracing::trace!("ticket superseded or missing, dropping task");
            return;
        }
        let entry = match self.cache.get_entry(&ticket) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read entry under granted ticket");
                return;
            }
        };
        let mut state = entry.value;
        if let Err(err) = state.restore_delegate(self.delegate_issuer.as_ref()) {
            tracing::warn!(error = %err, "failed to restore delegate credential, retrying next poll");
            return;
        }

        let new_state = match self.processor.record_job_status(state.clone(), info).await {
            Ok(mut new_state) => {
                new_state.retries = 0;
                new_state
            }
            Err(err) => self.apply_retry_fail_policy(state, err).await,
        };

        let new_cache_status = new_state.cache_status;
        match self.cache.update_entry(&ticket, new_cache_status, new_state) {
            Ok(new_revision) => {
                self.push_snapshot(false);
                if new_cache_status == CacheStatus::RemovalScheduled {
                    self.schedule_removal(job_key.clone(), new_revision);
                }
                if new_cache_status.is_for_update() {
                    self.submit(Task::ProcessUpdate {
                        job_key,
                        revision: new_revision,
                        lease: self.lease_for(new_cache_status),
                    });
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "update_entry failed, retrying next poll");
            }
        }
    }
}

/// A running job manager instance: the worker pool, the poller loop, and the
/// handles a host needs to submit work, watch progress, and shut down.
pub struct ManagerHandle {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    poller: JoinHandle<()>,
}

impl ManagerHandle {
    pub fn cache(&self) -> &JobCache {
        &self.shared.cache
    }

    pub fn snapshot(&self) -> watch::Receiver<ManagerSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Wake the cache poller immediately rather than waiting for the next
    /// tick.
    pub fn wake(&self) {
        self.shared.wake.notify_one();
    }

    /// Halt both pollers and drain in-flight worker tasks before returning;
    /// in-flight ticks are allowed to complete rather than being aborted.
    pub async fn shutdown(self) {
        self.shared.push_snapshot(true);
        self.shutdown.cancel();
        let _ = self.poller.await;
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Start a job manager: spawns the worker pool and the poller loop, and
/// returns a [`ManagerHandle`] for submitting work and controlling shutdown.
pub fn start_manager(
    cache: JobCache,
    processor: Arc<JobProcessor>,
    executor: Arc<dyn Executor>,
    delegate_issuer: Arc<dyn DelegateIssuer>,
    config: ManagerConfig,
) -> ManagerHandle {
    let (work_tx, work_rx) = mpsc::channel(1024);
    let (snapshot_tx, _snapshot_rx) = watch::channel(ManagerSnapshot::default());
    let shared = Arc::new(Shared {
        cache,
        processor,
        executor,
        delegate_issuer,
        config,
        work_tx,
        snapshot_tx,
        wake: Notify::new(),
    });

    let shutdown = CancellationToken::new();
    let work_rx = Arc::new(Mutex::new(work_rx));

    let mut workers = Vec::with_capacity(shared.config.worker_pool_size);
    for _ in 0..shared.config.worker_pool_size {
        let shared = shared.clone();
        let work_rx = work_rx.clone();
        let shutdown = shutdown.clone();
        workers.push(tokio::spawn(async move {
            // Every worker holds an `Arc<Shared>`, which itself holds the
            // channel's only `Sender`, so the channel never closes on its
            // own — shutdown is driven by the token, not by `recv` returning
            // `None`. Any task still queued when the token fires is drained
            // below rather than silently dropped.
            loop {
                let task = {
                    let mut rx = work_rx.lock().await;
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => None,
                        maybe_task = rx.recv() => maybe_task,
                    }
                };
                match task {
                    Some(task) => shared.handle_task(task).await,
                    None => break,
                }
            }
            loop {
                let task = {
                    let mut rx = work_rx.lock().await;
                    rx.try_recv()
                };
                match task {
                    Ok(task) => shared.handle_task(task).await,
                    Err(_) => break,
                }
            }
        }));
    }

    let poller = {
        let shared = shared.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_pollers(shared, shutdown).await })
    };

    ManagerHandle {
        shared,
        shutdown,
        workers,
        poller,
    }
}

async fn run_pollers(shared: Arc<Shared>, shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(shared.config.startup_delay) => {}
        _ = shutdown.cancelled() => return,
    }

    let mut cache_ticker = tokio::time::interval(shared.config.poll_interval);
    cache_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut executor_ticker = tokio::time::interval(shared.config.executor_poll_interval);
    executor_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = cache_ticker.tick() => shared.cache_poll_tick().await,
            _ = executor_ticker.tick() => shared.executor_poll_tick().await,
            _ = shared.wake.notified() => shared.cache_poll_tick().await,
        }
    }
}
