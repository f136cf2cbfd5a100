//! Deterministic, scriptable in-memory [`Executor`] used by the processor
//! and manager test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use jobctl_core::{JobKey, ExecutorStatus, VolumeKind};

use crate::{Capabilities, Executor, ExecutorError, ExecutorJobInfo, ExecutorState};

#[derive(Default)]
struct FakeJob {
    volumes: HashMap<String, HashMap<String, Vec<u8>>>,
    status_script: VecDeque<ExecutorJobInfo>,
    last_status: Option<ExecutorJobInfo>,
    remaining_create_failures: u32,
    started: bool,
    destroyed: bool,
    start_cmd: Option<(String, Vec<String>)>,
}

/// A scriptable fake executor. Tests arrange behavior in advance via
/// [`FakeExecutor::script_status`] / [`FakeExecutor::fail_create_batch_times`],
/// then drive the processor/manager against it exactly like a real plugin.
#[derive(Default)]
pub struct FakeExecutor {
    jobs: Mutex<HashMap<JobKey, FakeJob>>,
    capabilities: Capabilities,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            capabilities,
        }
    }

    /// Queue the sequence of statuses `poll_batches` will return for
    /// `job_key`, one per call; the last entry repeats once the queue
    /// is drained.
    pub fn script_status(&self, job_key: &JobKey, statuses: Vec<ExecutorJobInfo>) {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.entry(job_key.clone()).or_default();
        job.status_script = statuses.into();
    }

    /// Make `create_batch` return `ExecutorError::Unavailable` the next
    /// `times` calls before succeeding.
    pub fn fail_create_batch_times(&self, job_key: &JobKey, times: u32) {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.entry(job_key.clone()).or_default();
        job.remaining_create_failures = times;
    }

    pub fn start_cmd(&self, job_key: &JobKey) -> Option<(String, Vec<String>)> {
        self.jobs.lock().unwrap().get(job_key).and_then(|j| j.start_cmd.clone())
    }

    pub fn was_destroyed(&self, job_key: &JobKey) -> bool {
        self.jobs
            .lock()
            .unwrap()
            .get(job_key)
            .map(|j| j.destroyed)
            .unwrap_or(false)
    }

    pub fn file(&self, job_key: &JobKey, volume: &str, file_name: &str) -> Option<Vec<u8>> {
        self.jobs
            .lock()
            .unwrap()
            .get(job_key)?
            .volumes
            .get(volume)?
            .get(file_name)
            .cloned()
    }

    /// Seed a file directly into a volume, as if the job runtime had
    /// written it (used by tests to stage a `job_result_*.json`).
    pub fn seed_file(&self, job_key: &JobKey, volume: &str, file_name: &str, bytes: Vec<u8>) {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.entry(job_key.clone()).or_default();
        job.volumes
            .entry(volume.to_string())
            .or_default()
            .insert(file_name.to_string(), bytes);
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn create_batch(&self, job_key: &JobKey) -> Result<ExecutorState, ExecutorError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.entry(job_key.clone()).or_default();
        if job.remaining_create_failures > 0 {
            job.remaining_create_failures -= 1;
            return Err(ExecutorError::Unavailable(format!(
                "fake executor scripted to fail create_batch for {job_key}"
            )));
        }
        Ok(serde_json::json!({ "job_key": job_key.to_string() }))
    }

    async fn create_volume(
        &self,
        job_key: &JobKey,
        state: ExecutorState,
        name: &str,
        _kind: VolumeKind,
    ) -> Result<ExecutorState, ExecutorError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_key)
            .ok_or_else(|| ExecutorError::BatchNotFound(job_key.clone()))?;
        job.volumes.entry(name.to_string()).or_default();
        Ok(state)
    }

    async fn write_file(
        &self,
        job_key: &JobKey,
        state: ExecutorState,
        volume: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ExecutorState, ExecutorError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_key)
            .ok_or_else(|| ExecutorError::BatchNotFound(job_key.clone()))?;
        let vol = job
            .volumes
            .get_mut(volume)
            .ok_or_else(|| ExecutorError::VolumeNotFound {
                job_key: job_key.clone(),
                volume: volume.to_string(),
            })?;
        vol.insert(file_name.to_string(), bytes);
        Ok(state)
    }

    async fn start_batch(
        &self,
        job_key: &JobKey,
        state: ExecutorState,
        cmd: &str,
        args: &[String],
    ) -> Result<ExecutorState, ExecutorError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_key)
            .ok_or_else(|| ExecutorError::BatchNotFound(job_key.clone()))?;
        job.started = true;
        job.start_cmd = Some((cmd.to_string(), args.to_vec()));
        Ok(state)
    }

    async fn poll_batches(
        &self,
        batches: &[(JobKey, ExecutorState)],
    ) -> Result<Vec<ExecutorJobInfo>, ExecutorError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut out = Vec::with_capacity(batches.len());
        for (job_key, _state) in batches {
            let job = jobs
                .get_mut(job_key)
                .ok_or_else(|| ExecutorError::BatchNotFound(job_key.clone()))?;
            let info = job
                .status_script
                .pop_front()
                .or_else(|| job.last_status.clone())
                .unwrap_or_else(|| ExecutorJobInfo::new(ExecutorStatus::Queued));
            job.last_status = Some(info.clone());
            out.push(info);
        }
        Ok(out)
    }

    async fn read_file(
        &self,
        job_key: &JobKey,
        _state: &ExecutorState,
        volume: &str,
        file_name: &str,
    ) -> Result<Vec<u8>, ExecutorError> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get(job_key)
            .ok_or_else(|| ExecutorError::BatchNotFound(job_key.clone()))?;
        let vol = job
            .volumes
            .get(volume)
            .ok_or_else(|| ExecutorError::VolumeNotFound {
                job_key: job_key.clone(),
                volume: volume.to_string(),
            })?;
        vol.get(file_name)
            .cloned()
            .ok_or_else(|| ExecutorError::FileNotFound {
                job_key: job_key.clone(),
                volume: volume.to_string(),
                file: file_name.to_string(),
            })
    }

    async fn destroy_batch(
        &self,
        job_key: &JobKey,
        _state: &ExecutorState,
    ) -> Result<(), ExecutorError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_key)
            .ok_or_else(|| ExecutorError::BatchNotFound(job_key.clone()))?;
        job.destroyed = true;
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}
