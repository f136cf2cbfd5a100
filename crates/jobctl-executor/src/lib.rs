//! Pluggable batch executor contract. A batch executor presents a
//! single abstraction over the physical runner (local process, container,
//! cluster); this crate ships the trait plus an in-memory [`FakeExecutor`]
//! test double used by the processor/manager test suites. It is test-only
//! wiring, not a production plugin — no concrete executor ships here.

pub mod fake;

pub use fake::FakeExecutor;

use async_trait::async_trait;
use jobctl_core::{JobKey, ExecutorStatus, VolumeKind};

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor unavailable: {0}")]
    Unavailable(String),
    #[error("batch not found for job {0}")]
    BatchNotFound(JobKey),
    #[error("volume {volume} not found for job {job_key}")]
    VolumeNotFound { job_key: JobKey, volume: String },
    #[error("file {file} not found in volume {volume} for job {job_key}")]
    FileNotFound {
        job_key: JobKey,
        volume: String,
        file: String,
    },
}

impl ExecutorError {
    /// Retriable/non-retriable split: only transient
    /// unavailability of the executor backend is retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Status report for a single batch, as returned by [`Executor::poll_batches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorJobInfo {
    pub status: ExecutorStatus,
    pub status_message: Option<String>,
    pub error_detail: Option<String>,
}

impl ExecutorJobInfo {
    pub fn new(status: ExecutorStatus) -> Self {
        Self {
            status,
            status_message: None,
            error_detail: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }
}

/// Capability flags an executor plugin advertises. Plain booleans
/// rather than a bitflags type: the processor only ever reads these by name,
/// never bitwise-combines them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub expose_port: bool,
    pub storage_mapping: bool,
    pub output_volumes: bool,
}

/// Opaque executor state. The executor plugin produces it; the processor
/// only ever stores and round-trips it back through [`serde_json::Value`]
/// — never downcast or reflectively parsed by the orchestrator core.
pub type ExecutorState = serde_json::Value;

/// Abstract batch executor contract. A concrete plugin (local
/// process, Kubernetes, ...) is deliberately out of scope of this crate;
/// callers provide an `Arc<dyn Executor>`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn create_batch(&self, job_key: &JobKey) -> Result<ExecutorState, ExecutorError>;

    async fn create_volume(
        &self,
        job_key: &JobKey,
        state: ExecutorState,
        name: &str,
        kind: VolumeKind,
    ) -> Result<ExecutorState, ExecutorError>;

    async fn write_file(
        &self,
        job_key: &JobKey,
        state: ExecutorState,
        volume: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ExecutorState, ExecutorError>;

    async fn start_batch(
        &self,
        job_key: &JobKey,
        state: ExecutorState,
        cmd: &str,
        args: &[String],
    ) -> Result<ExecutorState, ExecutorError>;

    /// Batched polling with one response per request, in the same order.
    /// A single call covers every job the executor poller is currently
    /// tracking, so fan-out is bounded by poll cadence rather than job
    /// count.
    async fn poll_batches(
        &self,
        batches: &[(JobKey, ExecutorState)],
    ) -> Result<Vec<ExecutorJobInfo>, ExecutorError>;

    async fn read_file(
        &self,
        job_key: &JobKey,
        state: &ExecutorState,
        volume: &str,
        file_name: &str,
    ) -> Result<Vec<u8>, ExecutorError>;

    async fn destroy_batch(
        &self,
        job_key: &JobKey,
        state: &ExecutorState,
    ) -> Result<(), ExecutorError>;

    fn capabilities(&self) -> Capabilities;
}
