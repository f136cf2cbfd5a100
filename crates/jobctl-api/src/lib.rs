//! API Surface: the three thin operations a transport layer (out of
//! scope for this crate) would expose — `validateJob`, `submitJob`,
//! `checkJob` — each delegating to the processor and the job manager
//! rather than carrying any FSM logic of its own.

use std::time::Duration;

use jobctl_core::{CacheStatus, JobKey, JobRequest, JobState, TracStatus};
use jobctl_manager::ManagerHandle;
use jobctl_processor::{JobProcessor, ProcessorError};
use std::sync::Arc;

/// Errors the API surface can report to a caller.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("no job found for key {0}")]
    NotFound(JobKey),

    /// `addEntry` on an existing key via `openNewTicket` returns a
    /// superseded ticket; surfaced to `submitJob`'s
    /// caller as a duplicate-job error rather than silently overwriting.
    #[error("duplicate job for key {0}")]
    DuplicateJob(JobKey),

    /// Cancellation semantics are unresolved upstream; this crate reserves
    /// the entry point rather than guessing at them.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

/// Externally reportable job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub job_key: JobKey,
    pub trac_status: TracStatus,
    pub status_message: Option<String>,
}

impl JobStatus {
    fn from_state(state: &JobState) -> Self {
        Self {
            job_key: state.job_key.clone(),
            trac_status: state.reported_trac_status(),
            status_message: state.reported_status_message().map(str::to_string),
        }
    }
}

/// Selector a caller uses with `checkJob`: just the cache key, since
/// that's all `getLatestEntry` needs.
#[derive(Debug, Clone)]
pub struct JobSelector {
    pub job_key: JobKey,
}

/// Thin facade over the processor and the running job manager. Holds
/// its own `Arc<JobProcessor>` so `validateJob`/`submitJob` can run the
/// pre-cache phase (`newJob`, `assembleAndValidate`, `saveInitialMetadata`)
/// without going through the manager's worker pool, which only ever
/// operates on entries already in the cache.
pub struct JobService {
    processor: Arc<JobProcessor>,
    manager: ManagerHandle,
    new_ticket_duration: Duration,
}

impl JobService {
    pub fn new(processor: Arc<JobProcessor>, manager: ManagerHandle) -> Self {
        Self {
            processor,
            manager,
            new_ticket_duration: Duration::from_secs(10),
        }
    }

    /// The underlying manager handle, for callers that need direct cache
    /// access (e.g. a CLI harness printing cache-status transitions) beyond
    /// the shaped [`JobStatus`] this facade otherwise exposes.
    pub fn manager(&self) -> &ManagerHandle {
        &self.manager
    }

    /// Consume the service and hand back its manager handle, e.g. for an
    /// orderly shutdown once a host binary is done submitting work.
    pub fn into_manager(self) -> ManagerHandle {
        self.manager
    }

    /// `validateJob(request) -> JobStatus`: `newJob` +
    /// `assembleAndValidate` only; never inserts into the cache.
    pub async fn validate_job(&self, request: JobRequest) -> Result<JobStatus, OrchestratorError> {
        let state = self.processor.new_job(request);
        let state = self.processor.assemble_and_validate(state).await?;
        Ok(JobStatus::from_state(&state))
    }

    /// `submitJob(request) -> JobStatus`: validation,
    /// `saveInitialMetadata`, insert into the cache at `QUEUED_IN_TRAC`
    /// under a new ticket, then immediately wake the cache poller so the
    /// job doesn't wait out a full poll interval before its first launch
    /// attempt.
    pub async fn submit_job(&self, request: JobRequest) -> Result<JobStatus, OrchestratorError> {
        let state = self.processor.new_job(request);
        let state = self.processor.assemble_and_validate(state).await?;
        let state = self.processor.save_initial_metadata(state).await?;

        let job_key = state.job_key.clone();
        let ticket = self
            .manager
            .cache()
            .open_new_ticket(&job_key, self.new_ticket_duration);
        if !ticket.is_granted() {
            tracing::warn!(job_key = %job_key, "submitJob: cache entry already exists for this key");
            return Err(OrchestratorError::DuplicateJob(job_key));
        }
        let status = JobStatus::from_state(&state);
        self.manager
            .cache()
            .add_entry(&ticket, CacheStatus::QueuedInTrac, state)
            .map_err(|_| OrchestratorError::DuplicateJob(job_key.clone()))?;

        self.manager.wake();
        Ok(status)
    }

    /// `checkJob(selector) -> JobStatus`: a plain cache read, no
    /// ticket required.
    pub fn check_job(&self, selector: &JobSelector) -> Result<JobStatus, OrchestratorError> {
        let entry = self
            .manager
            .cache()
            .get_latest_entry(&selector.job_key)
            .ok_or_else(|| OrchestratorError::NotFound(selector.job_key.clone()))?;
        Ok(JobStatus::from_state(&entry.value))
    }

    /// Reserved per the `CANCELLED` open question: deliberately
    /// unimplemented rather than guessed at. A caller gets a clear
    /// `Unsupported` error instead of a job stuck forever waiting on a
    /// transition this crate has no grounding to implement.
    pub fn cancel_job(&self, _selector: &JobSelector) -> Result<(), OrchestratorError> {
        Err(OrchestratorError::Unsupported("cancelJob"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobctl_core::{FixedTtlDelegateIssuer, JobType, ObjectHeader, OwnerIdentity};
    use jobctl_executor::FakeExecutor;
    use jobctl_manager::ManagerConfig;
    use jobctl_metadata::InMemoryMetadataClient;
    use jobctl_processor::ProcessorConfig;
    use std::collections::HashMap;
    use std::sync::Arc;
    use uuid::Uuid;

    fn request() -> JobRequest {
        JobRequest {
            job_type: JobType::RunModel,
            definition: serde_json::json!({ "model": "m1" }),
            requested_by: OwnerIdentity {
                user_id: "alice".to_string(),
                tenant: "acme".to_string(),
            },
            object_mapping: HashMap::new(),
        }
    }

    fn service() -> JobService {
        let metadata = Arc::new(InMemoryMetadataClient::new());
        let executor = Arc::new(FakeExecutor::new());
        let processor = Arc::new(JobProcessor::new(
            metadata,
            executor.clone(),
            ProcessorConfig::default(),
        ));
        let delegate_issuer: Arc<dyn jobctl_core::DelegateIssuer> = Arc::new(FixedTtlDelegateIssuer {
            ttl: Duration::from_secs(60),
        });
        let manager = jobctl_manager::start_manager(
            jobctl_cache::Cache::new(),
            processor.clone(),
            executor,
            delegate_issuer,
            ManagerConfig::default(),
        );
        JobService::new(processor, manager)
    }

    #[tokio::test]
    async fn validate_job_never_inserts_into_cache() {
        let service = service();
        let status = service.validate_job(request()).await.unwrap();
        assert_eq!(status.trac_status, TracStatus::Validated);
        assert!(service.manager.cache().get_latest_entry(&status.job_key).is_none());
    }

    #[tokio::test]
    async fn validate_job_surfaces_consistency_errors_to_the_caller() {
        let service = service();
        let mut req = request();
        req.object_mapping.insert(
            "missing".to_string(),
            ObjectHeader {
                object_id: Uuid::new_v4(),
                object_type: "DATA".to_string(),
                object_version: None,
            },
        );
        let err = service.validate_job(req).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Processor(ProcessorError::ConsistencyValidation(_))
        ));
    }

    #[tokio::test]
    async fn submit_job_inserts_at_queued_in_trac_and_wakes_the_poller() {
        let service = service();
        let status = service.submit_job(request()).await.unwrap();
        assert_eq!(status.trac_status, TracStatus::Queued);
        let entry = service.manager.cache().get_latest_entry(&status.job_key).unwrap();
        assert_eq!(entry.status, CacheStatus::QueuedInTrac);
    }

    #[tokio::test]
    async fn check_job_reports_not_found_for_unknown_key() {
        let service = service();
        let selector = JobSelector {
            job_key: JobKey("job-does-not-exist".to_string()),
        };
        let err = service.check_job(&selector).unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn check_job_shapes_terminal_status_as_finishing_during_result_publish() {
        let service = service();
        let status = service.submit_job(request()).await.unwrap();

        // Fast-forward the job straight to a state where `trac_status` is
        // already terminal but `cache_status` is still in the
        // `EXECUTOR_`/`RESULTS_` window: `checkJob` must
        // report `FINISHING`, not the terminal status, until results are
        // fully published.
        let entry = service.manager.cache().get_latest_entry(&status.job_key).unwrap();
        let mut state = entry.value;
        state.trac_status = TracStatus::Succeeded;
        state.cache_status = CacheStatus::ResultsReceived;
        let ticket = service
            .manager
            .cache()
            .open_ticket(&status.job_key, entry.revision, Duration::from_secs(5));
        service
            .manager
            .cache()
            .update_entry(&ticket, CacheStatus::ResultsReceived, state)
            .unwrap();

        let selector = JobSelector {
            job_key: status.job_key.clone(),
        };
        let shaped = service.check_job(&selector).unwrap();
        assert_eq!(shaped.trac_status, TracStatus::Finishing);
        assert!(shaped.status_message.is_none());
    }

    #[tokio::test]
    async fn cancel_job_is_reserved_and_unimplemented() {
        let service = service();
        let selector = JobSelector {
            job_key: JobKey("job-x".to_string()),
        };
        let err = service.cancel_job(&selector).unwrap_err();
        assert!(matches!(err, OrchestratorError::Unsupported(_)));
    }
}
