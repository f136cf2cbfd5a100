//! Domain types shared by every layer of the job orchestrator: job identity,
//! the cache-status and TRAC-status enums driving the lifecycle FSM, the job
//! state record itself, and the runtime config/result file shapes exchanged
//! with the executor.

pub mod ids;
pub mod job;
pub mod runtime_config;
pub mod status;
pub mod volume;

pub use ids::{JobKey, ObjectHeader, ObjectId, FIRST_VERSION};
pub use job::{
    DelegateCredential, DelegateError, DelegateIssuer, FixedTtlDelegateIssuer, JobRequest,
    JobState, JobType, OwnerIdentity,
};
pub use runtime_config::{
    launch_args, result_file_name, JobConfigFile, JobResultFile, StorageConfig, SysConfigFile,
};
pub use status::{executor_to_trac, CacheStatus, ExecutorStatus, TracStatus, STATUS_UNKNOWN_MESSAGE};
pub use volume::{kind_for_volume, VolumeKind, CONFIG_VOLUME, LOG_VOLUME, RESULT_VOLUME, SCRATCH_VOLUME};
