use jobctl_core::JobKey;
use jobctl_executor::ExecutorError;
use jobctl_metadata::MetadataError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Referenced metadata missing or inconsistent; surfaced during `assembleAndValidate`, never retried.
    #[error("consistency validation failed: {0}")]
    ConsistencyValidation(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Malformed `job_result_*.json`. Terminal.
    #[error("job result parse error: {0}")]
    ResultParse(String),

    /// Duplicate object ids, missing required objects. Terminal.
    #[error("job result integrity error: {0}")]
    JobResult(String),

    #[error(transparent)]
    Delegate(#[from] jobctl_core::DelegateError),

    #[error("duplicate job for key {0}")]
    DuplicateJob(JobKey),
}

impl ProcessorError {
    /// Retriable/non-retriable split: there is exactly one
    /// place this classification is decided.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Metadata(err) => err.is_retriable(),
            Self::Executor(err) => err.is_retriable(),
            Self::ConsistencyValidation(_)
            | Self::ResultParse(_)
            | Self::JobResult(_)
            | Self::Delegate(_)
            | Self::DuplicateJob(_) => false,
        }
    }
}
