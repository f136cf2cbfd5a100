//! Pure per-state transition functions implementing the cache-status FSM.
//! Every method takes a [`JobState`] and returns a new one; methods are
//! pure with respect to the cache — they never write it, the Job Manager
//! does (see `jobctl-manager`) — but they may call the metadata service
//! and the executor.

pub mod config;
pub mod error;
pub mod stderr;
pub mod validate;

pub use config::ProcessorConfig;
pub use error::ProcessorError;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use jobctl_core::{
    kind_for_volume, launch_args, result_file_name, CacheStatus, JobConfigFile, JobRequest,
    JobResultFile, JobState, ObjectId, TracStatus, CONFIG_VOLUME, LOG_VOLUME, RESULT_VOLUME,
    SCRATCH_VOLUME, STATUS_UNKNOWN_MESSAGE,
};
use jobctl_executor::{Executor, ExecutorJobInfo};
use jobctl_metadata::{MetadataClient, MetadataError, ObjectWrite, WriteBatchRequest};
use uuid::Uuid;

/// Drives the per-state operations the job manager dispatches by
/// `cacheStatus`. Holds the collaborators the processor is allowed
/// to call: the metadata client and the executor, both behind `Arc<dyn _>`
/// so the orchestrator core never depends on a concrete transport or
/// runtime.
pub struct JobProcessor {
    metadata: Arc<dyn MetadataClient>,
    executor: Arc<dyn Executor>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        executor: Arc<dyn Executor>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            metadata,
            executor,
            config,
        }
    }

    /// `newJob`: in-memory only, no collaborator calls. Generates the
    /// job's identity eagerly rather than deferring it past `saveInitialMetadata`
    /// — see DESIGN.md for why that doesn't conflict with the cache only
    /// gaining an entry once `submitJob` actually inserts one.
    pub fn new_job(&self, request: JobRequest) -> JobState {
        let job_id = ObjectId::first(Uuid::new_v4());
        let job_key = jobctl_core::JobKey::from_job_id(&job_id);
        let owner = request.requested_by.clone();
        let tenant = owner.tenant.clone();
        let referenced_objects = request.object_mapping.clone();
        let definition = request.definition.clone();
        let job_type = request.job_type.clone();

        JobState {
            owner,
            tenant,
            job_key,
            job_id: Some(job_id),
            job_type,
            request,
            delegate: None,
            trac_status: TracStatus::Preparing,
            cache_status: CacheStatus::QueuedInTrac,
            status_message: None,
            error_detail: None,
            retries: 0,
            definition,
            referenced_objects,
            resolved_objects: HashMap::new(),
            tags: HashMap::new(),
            preallocated_ids: Vec::new(),
            result_id: None,
            job_config: None,
            sys_config: None,
            executor_status: None,
            executor_state: None,
            job_result: None,
        }
    }

    /// `assembleAndValidate`: resolves every referenced object via
    /// `readBatch`, follows `DATA -> STORAGE` / `DATA -> SCHEMA` dependencies,
    /// and runs consistency checks. A `NOT_FOUND` anywhere in this phase is
    /// mapped to [`ProcessorError::ConsistencyValidation`].
    pub async fn assemble_and_validate(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        let mut selectors = state.referenced_objects.clone();
        let mut resolved = self.read_batch_mapped(&state.tenant, &selectors).await?;

        let derived = validate::derived_selectors(&selectors, &resolved);
        if !derived.is_empty() {
            let more = self.read_batch_mapped(&state.tenant, &derived).await?;
            selectors.extend(derived);
            resolved.extend(more);
        }

        validate::check_consistency(&selectors, &resolved)
            .map_err(ProcessorError::ConsistencyValidation)?;

        state.referenced_objects = selectors;
        state.resolved_objects = resolved;
        state.trac_status = TracStatus::Validated;
        Ok(state)
    }

    async fn read_batch_mapped(
        &self,
        tenant: &str,
        selectors: &HashMap<String, jobctl_core::ObjectHeader>,
    ) -> Result<HashMap<String, serde_json::Value>, ProcessorError> {
        if selectors.is_empty() {
            return Ok(HashMap::new());
        }
        self.metadata
            .read_batch(tenant, selectors)
            .await
            .map_err(|err| match err {
                MetadataError::NotFound(msg) => ProcessorError::ConsistencyValidation(msg),
                other => ProcessorError::Metadata(other),
            })
    }

    /// `saveInitialMetadata`: preallocates a RESULT id, stamps it
    /// into the job definition, persists the JOB object and its initial
    /// `trac_status` tag in one `writeBatch`.
    pub async fn save_initial_metadata(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        let result_ids = self
            .metadata
            .preallocate_id_batch(&state.tenant, "RESULT", 1)
            .await?;
        let result_id = result_ids[0];
        state.result_id = Some(result_id);
        state.preallocated_ids.push(result_id);

        let job_id = state.job_id.expect("new_job always assigns job_id");
        let mut definition = state.definition.clone();
        if let Some(obj) = definition.as_object_mut() {
            obj.insert("resultId".to_string(), serde_json::json!(result_id.to_string()));
        }
        state.definition = definition.clone();

        let mut tags = HashMap::new();
        tags.insert("trac_status".to_string(), TracStatus::Queued.as_tag().to_string());
        let write = ObjectWrite {
            object_id: job_id,
            object_type: "JOB".to_string(),
            definition: Some(definition),
            prior_version: None,
            preallocated: false,
            tags,
        };
        self.metadata
            .write_batch(&state.tenant, WriteBatchRequest::classify(vec![write]))
            .await?;

        state.cache_status = CacheStatus::QueuedInTrac;
        state.trac_status = TracStatus::Queued;
        Ok(state)
    }

    /// `scheduleLaunch`: a pure bookkeeping transition, no
    /// collaborator calls — capacity is enforced by the job manager before
    /// this op is ever dispatched.
    pub async fn schedule_launch(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        state.cache_status = CacheStatus::LaunchScheduled;
        state.trac_status = TracStatus::Pending;
        Ok(state)
    }

    /// `launchJob`: creates the four standard volumes, writes
    /// `job_config.json`/`sys_config.json` into the config volume, starts
    /// the batch with the standard argument set.
    pub async fn launch_job(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        let job_key = state.job_key.clone();
        let mut exec_state = self.executor.create_batch(&job_key).await?;
        for volume in [CONFIG_VOLUME, RESULT_VOLUME, LOG_VOLUME, SCRATCH_VOLUME] {
            exec_state = self
                .executor
                .create_volume(&job_key, exec_state, volume, kind_for_volume(volume))
                .await?;
        }

        let job_id = state.job_id.expect("job_id set at newJob");
        let result_id = state.result_id.expect("result_id set at saveInitialMetadata");
        let job_config = JobConfigFile {
            job_id,
            job: state.definition.clone(),
            object_mapping: state.referenced_objects.clone(),
            objects: state.resolved_objects.clone(),
            tags: state.tags.clone(),
            result_id,
            preallocated_ids: state.preallocated_ids.clone(),
        };
        let sys_config = self.config.sys_config.clone();

        let job_config_bytes =
            serde_json::to_vec_pretty(&job_config).expect("job config is always serializable");
        exec_state = self
            .executor
            .write_file(&job_key, exec_state, CONFIG_VOLUME, "job_config.json", job_config_bytes)
            .await?;
        let sys_config_bytes =
            serde_json::to_vec_pretty(&sys_config).expect("sys config is always serializable");
        exec_state = self
            .executor
            .write_file(&job_key, exec_state, CONFIG_VOLUME, "sys_config.json", sys_config_bytes)
            .await?;

        let args = launch_args(
            &format!("{CONFIG_VOLUME}/sys_config.json"),
            &format!("{CONFIG_VOLUME}/job_config.json"),
            RESULT_VOLUME,
            SCRATCH_VOLUME,
        );
        exec_state = self
            .executor
            .start_batch(&job_key, exec_state, "tracdap-runtime", &args)
            .await?;

        state.job_config = Some(job_config);
        state.sys_config = Some(sys_config);
        state.executor_state = Some(exec_state);
        state.cache_status = CacheStatus::SentToExecutor;
        Ok(state)
    }

    /// `recordJobStatus`: maps the executor's status report 1:1
    /// to a TRAC status and cache status. `QUEUED`/`RUNNING` trigger a
    /// side-effect metadata tag update; terminal executor states do not —
    /// metadata is only updated after the full result pipeline completes.
    pub async fn record_job_status(
        &self,
        mut state: JobState,
        info: ExecutorJobInfo,
    ) -> Result<JobState, ProcessorError> {
        use jobctl_core::ExecutorStatus::*;

        state.executor_status = Some(info.status);
        if let Some(detail) = &info.error_detail {
            state.error_detail = Some(detail.clone());
        }

        let cache_status = match info.status {
            Queued => CacheStatus::QueuedInExecutor,
            Running => CacheStatus::RunningInExecutor,
            Complete => CacheStatus::ExecutorComplete,
            Succeeded => CacheStatus::ExecutorSucceeded,
            // Cancellation trigger is unspecified; routed
            // through the same failure path as FAILED/STATUS_UNKNOWN, but
            // `trac_status` below still records the distinct CANCELLED code.
            Failed | Cancelled | StatusUnknown => CacheStatus::ExecutorFailed,
        };

        state.trac_status = jobctl_core::executor_to_trac(info.status);
        state.status_message = match info.status {
            StatusUnknown => Some(STATUS_UNKNOWN_MESSAGE.to_string()),
            Failed => info
                .error_detail
                .as_deref()
                .map(stderr::short_message)
                .or(info.status_message),
            _ => info.status_message,
        };
        state.cache_status = cache_status;

        if matches!(cache_status, CacheStatus::QueuedInExecutor | CacheStatus::RunningInExecutor) {
            self.publish_status_tag(&state).await?;
        }

        Ok(state)
    }

    async fn publish_status_tag(&self, state: &JobState) -> Result<(), ProcessorError> {
        let job_id = state.job_id.expect("job_id set at newJob");
        let mut tags = HashMap::new();
        tags.insert("trac_status".to_string(), state.trac_status.as_tag().to_string());
        let write = ObjectWrite::tag_update(job_id, "JOB", tags);
        self.metadata
            .write_batch(&state.tenant, WriteBatchRequest::classify(vec![write]))
            .await?;
        Ok(())
    }

    /// `fetchJobResult`: reads `job_result_<jobKey>.json`
    /// from the result volume, parses and validates it. Parse/validation
    /// errors are not propagated as [`ProcessorError`] — they are a normal
    /// (terminal) state transition to `RESULTS_INVALID`, per the dispatch
    /// table's own failure column.
    pub async fn fetch_job_result(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        let job_key = state.job_key.clone();
        let exec_state = state
            .executor_state
            .clone()
            .unwrap_or(serde_json::Value::Null);
        let file_name = result_file_name(&job_key);
        let bytes = self
            .executor
            .read_file(&job_key, &exec_state, RESULT_VOLUME, &file_name)
            .await?;

        let job_result: JobResultFile = match serde_json::from_slice(&bytes) {
            Ok(result) => result,
            Err(err) => {
                let message = err.to_string();
                let first_line = message.lines().next().unwrap_or(&message).to_string();
                state.cache_status = CacheStatus::ResultsInvalid;
                state.trac_status = TracStatus::Failed;
                state.status_message = Some(first_line);
                return Ok(state);
            }
        };

        if let Err(message) = validate_job_result(&job_result) {
            state.job_result = Some(job_result);
            state.cache_status = CacheStatus::ResultsInvalid;
            state.trac_status = TracStatus::Failed;
            state.status_message = Some(message);
            return Ok(state);
        }

        state.job_result = Some(job_result);
        state.cache_status = CacheStatus::ResultsReceived;
        state.trac_status = TracStatus::Succeeded;
        Ok(state)
    }

    /// `saveResultMetadata`: groups result objects into the
    /// four `writeBatch` sub-lists plus one job tag update, and issues a
    /// single batch write. Reached from `RESULTS_RECEIVED`/`RESULTS_INVALID`
    /// (normal pipeline) or `EXECUTOR_FAILED` (no job result was ever
    /// fetched, so only the tag update is written).
    pub async fn save_result_metadata(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        let job_id = state.job_id.expect("job_id set at newJob");
        if !state.trac_status.is_terminal() {
            state.trac_status = TracStatus::Failed;
        }

        let mut writes = Vec::new();
        if let Some(result) = state.job_result.clone() {
            for object_id in &result.object_ids {
                let Some(content) = result.objects.get(&object_id.object_id.to_string()).cloned() else {
                    continue;
                };
                let preallocated = state
                    .preallocated_ids
                    .iter()
                    .any(|p| p.object_id == object_id.object_id);
                writes.push(ObjectWrite {
                    object_id: *object_id,
                    object_type: "DATA".to_string(),
                    definition: Some(content),
                    prior_version: None,
                    preallocated,
                    tags: HashMap::new(),
                });
            }
        }

        let mut tags = HashMap::new();
        tags.insert("trac_status".to_string(), state.trac_status.as_tag().to_string());
        writes.push(ObjectWrite::tag_update(job_id, "JOB", tags));

        let batch = WriteBatchRequest::classify(writes);
        if !batch.is_empty() {
            self.metadata.write_batch(&state.tenant, batch).await?;
        }

        state.cache_status = CacheStatus::ResultsSaved;
        Ok(state)
    }

    /// `cleanUpJob`: best-effort `destroyBatch`; a missing
    /// executor state is a no-op with a warning, never an error.
    pub async fn clean_up_job(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        let job_key = state.job_key.clone();
        match &state.executor_state {
            Some(exec_state) => {
                if let Err(err) = self.executor.destroy_batch(&job_key, exec_state).await {
                    tracing::warn!(job_key = %job_key, error = %err, "destroy_batch failed during cleanup, proceeding anyway");
                }
            }
            None => {
                tracing::warn!(job_key = %job_key, "cleanUpJob: executor state is null, nothing to destroy");
            }
        }
        state.cache_status = CacheStatus::ReadyToRemove;
        Ok(state)
    }

    /// `scheduleRemoval`: pure bookkeeping transition.
    pub async fn schedule_removal(&self, mut state: JobState) -> Result<JobState, ProcessorError> {
        state.cache_status = CacheStatus::RemovalScheduled;
        Ok(state)
    }

    /// `handleProcessingFailed`: invoked by the job manager when
    /// retries are exhausted or an error is non-retriable. Publishes the
    /// failure and advances straight to `READY_TO_REMOVE` within the same
    /// per-update task, rather than waiting for a further poll tick.
    pub async fn handle_processing_failed(
        &self,
        mut state: JobState,
        message: String,
    ) -> Result<JobState, ProcessorError> {
        state.trac_status = TracStatus::Failed;
        state.status_message = Some(message);
        state.cache_status = CacheStatus::ProcessingFailed;
        let state = self.save_result_metadata(state).await?;
        self.clean_up_job(state).await
    }
}

/// Job-result integrity check: duplicate
/// object ids or a declared id with no matching content are terminal.
fn validate_job_result(result: &JobResultFile) -> Result<(), String> {
    let mut seen = HashSet::new();
    for object_id in &result.object_ids {
        if !seen.insert(object_id.object_id) {
            return Err(format!("duplicate object id {} in job result", object_id.object_id));
        }
        if !result.objects.contains_key(&object_id.object_id.to_string()) {
            return Err(format!(
                "job result missing object content for {}",
                object_id.object_id
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobctl_core::{JobType, ObjectHeader, OwnerIdentity};
    use jobctl_executor::FakeExecutor;
    use jobctl_metadata::InMemoryMetadataClient;

    fn owner() -> OwnerIdentity {
        OwnerIdentity {
            user_id: "alice".to_string(),
            tenant: "acme".to_string(),
        }
    }

    fn processor() -> (JobProcessor, Arc<InMemoryMetadataClient>, Arc<FakeExecutor>) {
        let metadata = Arc::new(InMemoryMetadataClient::new());
        let executor = Arc::new(FakeExecutor::new());
        let processor = JobProcessor::new(metadata.clone(), executor.clone(), ProcessorConfig::default());
        (processor, metadata, executor)
    }

    fn request_with_no_inputs() -> JobRequest {
        JobRequest {
            job_type: JobType::RunModel,
            definition: serde_json::json!({ "model": "m1" }),
            requested_by: owner(),
            object_mapping: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn assemble_and_validate_passes_with_no_referenced_objects() {
        let (processor, _metadata, _executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let state = processor.assemble_and_validate(state).await.unwrap();
        assert_eq!(state.trac_status, TracStatus::Validated);
    }

    #[tokio::test]
    async fn assemble_and_validate_maps_not_found_to_consistency_validation() {
        let (processor, _metadata, _executor) = processor();
        let mut request = request_with_no_inputs();
        request.object_mapping.insert(
            "input".to_string(),
            ObjectHeader {
                object_id: Uuid::new_v4(),
                object_type: "DATA".to_string(),
                object_version: None,
            },
        );
        let state = processor.new_job(request);
        let err = processor.assemble_and_validate(state).await.unwrap_err();
        assert!(matches!(err, ProcessorError::ConsistencyValidation(_)));
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn save_initial_metadata_assigns_result_id_and_queues() {
        let (processor, _metadata, _executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let state = processor.assemble_and_validate(state).await.unwrap();
        let state = processor.save_initial_metadata(state).await.unwrap();
        assert!(state.result_id.is_some());
        assert_eq!(state.cache_status, CacheStatus::QueuedInTrac);
        assert_eq!(state.trac_status, TracStatus::Queued);
    }

    #[tokio::test]
    async fn launch_job_writes_config_and_starts_batch() {
        let (processor, _metadata, executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let state = processor.assemble_and_validate(state).await.unwrap();
        let state = processor.save_initial_metadata(state).await.unwrap();
        let state = processor.schedule_launch(state).await.unwrap();
        let state = processor.launch_job(state).await.unwrap();

        assert_eq!(state.cache_status, CacheStatus::SentToExecutor);
        let config_bytes = executor.file(&state.job_key, "config", "job_config.json");
        assert!(config_bytes.is_some());
        assert!(executor.start_cmd(&state.job_key).is_some());
    }

    #[tokio::test]
    async fn launch_job_retries_through_scripted_executor_unavailable() {
        let (processor, _metadata, executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let state = processor.assemble_and_validate(state).await.unwrap();
        let state = processor.save_initial_metadata(state).await.unwrap();
        let state = processor.schedule_launch(state).await.unwrap();
        executor.fail_create_batch_times(&state.job_key, 2);

        assert!(processor.launch_job(state.clone()).await.is_err());
        assert!(processor.launch_job(state.clone()).await.is_err());
        let state = processor.launch_job(state).await.unwrap();
        assert_eq!(state.cache_status, CacheStatus::SentToExecutor);
    }

    #[tokio::test]
    async fn record_job_status_unknown_maps_to_failed_with_standard_message() {
        let (processor, _metadata, _executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let info = ExecutorJobInfo::new(jobctl_core::ExecutorStatus::StatusUnknown);
        let state = processor.record_job_status(state, info).await.unwrap();
        assert_eq!(state.trac_status, TracStatus::Failed);
        assert_eq!(state.status_message.as_deref(), Some(STATUS_UNKNOWN_MESSAGE));
        assert_eq!(state.cache_status, CacheStatus::ExecutorFailed);
    }

    #[tokio::test]
    async fn record_job_status_failed_extracts_short_message_from_stderr() {
        let (processor, _metadata, _executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let info = ExecutorJobInfo::new(jobctl_core::ExecutorStatus::Failed).with_error_detail(
            "Traceback\ntracdap.rt.exceptions.EValidation: bad schema\n",
        );
        let state = processor.record_job_status(state, info).await.unwrap();
        assert_eq!(state.status_message.as_deref(), Some("bad schema"));
        assert_eq!(state.trac_status, TracStatus::Failed);
    }

    #[tokio::test]
    async fn fetch_job_result_rejects_malformed_json() {
        let (processor, _metadata, executor) = processor();
        let mut state = processor.new_job(request_with_no_inputs());
        state.executor_state = Some(serde_json::json!({}));
        executor.seed_file(&state.job_key, "result", &result_file_name(&state.job_key), b"not json".to_vec());

        let state = processor.fetch_job_result(state).await.unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsInvalid);
        assert_eq!(state.trac_status, TracStatus::Failed);
        assert!(state.status_message.is_some());
    }

    #[tokio::test]
    async fn fetch_job_result_rejects_duplicate_object_ids() {
        let (processor, _metadata, executor) = processor();
        let mut state = processor.new_job(request_with_no_inputs());
        state.executor_state = Some(serde_json::json!({}));
        let id = ObjectId::first(Uuid::new_v4());
        let mut objects = HashMap::new();
        objects.insert(id.object_id.to_string(), serde_json::json!({"v": 1}));
        let result = JobResultFile {
            result: serde_json::json!({}),
            object_ids: vec![id, id],
            objects,
            attrs: HashMap::new(),
        };
        let bytes = serde_json::to_vec(&result).unwrap();
        executor.seed_file(&state.job_key, "result", &result_file_name(&state.job_key), bytes);

        let state = processor.fetch_job_result(state).await.unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsInvalid);
    }

    #[tokio::test]
    async fn fetch_job_result_accepts_well_formed_result() {
        let (processor, _metadata, executor) = processor();
        let mut state = processor.new_job(request_with_no_inputs());
        state.executor_state = Some(serde_json::json!({}));
        let id = ObjectId::first(Uuid::new_v4());
        let mut objects = HashMap::new();
        objects.insert(id.object_id.to_string(), serde_json::json!({"v": 1}));
        let result = JobResultFile {
            result: serde_json::json!({"ok": true}),
            object_ids: vec![id],
            objects,
            attrs: HashMap::new(),
        };
        let bytes = serde_json::to_vec(&result).unwrap();
        executor.seed_file(&state.job_key, "result", &result_file_name(&state.job_key), bytes);

        let state = processor.fetch_job_result(state).await.unwrap();
        assert_eq!(state.cache_status, CacheStatus::ResultsReceived);
        assert_eq!(state.trac_status, TracStatus::Succeeded);
    }

    #[tokio::test]
    async fn clean_up_job_with_no_executor_state_still_advances() {
        let (processor, _metadata, _executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let state = processor.clean_up_job(state).await.unwrap();
        assert_eq!(state.cache_status, CacheStatus::ReadyToRemove);
    }

    #[tokio::test]
    async fn handle_processing_failed_reaches_ready_to_remove() {
        let (processor, _metadata, _executor) = processor();
        let state = processor.new_job(request_with_no_inputs());
        let state = processor
            .handle_processing_failed(state, "boom".to_string())
            .await
            .unwrap();
        assert_eq!(state.cache_status, CacheStatus::ReadyToRemove);
        assert_eq!(state.trac_status, TracStatus::Failed);
        assert_eq!(state.status_message.as_deref(), Some("boom"));
    }
}
