use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::ids::{JobKey, ObjectHeader, ObjectId};
use crate::runtime_config::{JobConfigFile, SysConfigFile};
use crate::status::{CacheStatus, ExecutorStatus, TracStatus};

/// Job type requested by a client. `Other` keeps the type open for
/// collaborators this crate does not know about without widening the enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    RunModel,
    RunFlow,
    ImportModel,
    ImportData,
    ExportData,
    Other(String),
}

/// Identity the job runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerIdentity {
    pub user_id: String,
    pub tenant: String,
}

/// A short-lived credential minted so internal calls (metadata, executor) can
/// act on behalf of `OwnerIdentity`. Never serialized: see [`JobState::delegate`].
#[derive(Debug, Clone)]
pub struct DelegateCredential {
    pub token: String,
    pub expires_at: SystemTime,
}

impl DelegateCredential {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// Internal auth issuer collaborator. Not a
/// wire client: mints a delegate session from the stored owner identity.
pub trait DelegateIssuer: Send + Sync {
    fn issue(&self, owner: &OwnerIdentity) -> Result<DelegateCredential, DelegateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    #[error("delegate issuer unavailable: {0}")]
    Unavailable(String),
}

/// A fixed-ttl delegate issuer good enough for tests and the CLI harness: it
/// never talks to anything external, just stamps out a token good for `ttl`.
#[derive(Debug, Clone)]
pub struct FixedTtlDelegateIssuer {
    pub ttl: Duration,
}

impl DelegateIssuer for FixedTtlDelegateIssuer {
    fn issue(&self, owner: &OwnerIdentity) -> Result<DelegateCredential, DelegateError> {
        Ok(DelegateCredential {
            token: format!("delegate:{}:{}", owner.tenant, owner.user_id),
            expires_at: SystemTime::now() + self.ttl,
        })
    }
}

/// The original client request that created the job.
///
/// `object_mapping` is the client-supplied selector -> header mapping that
/// `assembleAndValidate` resolves via `readBatch`: the request names which
/// inputs the job definition refers to, and the processor is responsible
/// for resolving and validating them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_type: JobType,
    pub definition: serde_json::Value,
    pub requested_by: OwnerIdentity,
    pub object_mapping: HashMap<String, ObjectHeader>,
}

/// Full job state as it lives in the cache.
///
/// `delegate` is re-issued on every per-update task entry and
/// is never part of the serialized representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub owner: OwnerIdentity,
    pub tenant: String,
    pub job_key: JobKey,
    pub job_id: Option<ObjectId>,
    pub job_type: JobType,
    pub request: JobRequest,

    #[serde(skip)]
    pub delegate: Option<DelegateCredential>,

    pub trac_status: TracStatus,
    pub cache_status: CacheStatus,
    pub status_message: Option<String>,
    pub error_detail: Option<String>,
    pub retries: u32,

    pub definition: serde_json::Value,
    pub referenced_objects: HashMap<String, ObjectHeader>,
    /// Object content resolved by `assembleAndValidate`'s `readBatch`, keyed
    /// by the same selector as `referenced_objects`. Carried on `JobState`
    /// (rather than recomputed) so `launchJob`, running in a later
    /// per-update task, can stamp `job_config.json`'s `objects` map without
    /// re-resolving metadata it already validated.
    pub resolved_objects: HashMap<String, serde_json::Value>,
    pub tags: HashMap<String, String>,
    pub preallocated_ids: Vec<ObjectId>,
    pub result_id: Option<ObjectId>,
    pub job_config: Option<JobConfigFile>,
    pub sys_config: Option<SysConfigFile>,

    pub executor_status: Option<ExecutorStatus>,
    pub executor_state: Option<serde_json::Value>,
    /// Result payload read back by `fetchJobResult`, persisted so the later
    /// `saveResultMetadata` task (a separate per-update dispatch) has it
    /// without re-reading the result volume.
    pub job_result: Option<crate::runtime_config::JobResultFile>,
}

impl JobState {
    /// Restore the transient delegate credential from the stored owner
    /// identity. Called at the top of every per-update task.
    pub fn restore_delegate(&mut self, issuer: &dyn DelegateIssuer) -> Result<(), DelegateError> {
        self.delegate = Some(issuer.issue(&self.owner)?);
        Ok(())
    }

    /// Status as it should be reported to an external caller.
    pub fn reported_trac_status(&self) -> TracStatus {
        if self.trac_status.is_terminal() && self.cache_status.is_finishing_window() {
            TracStatus::Finishing
        } else {
            self.trac_status
        }
    }

    /// Message to report alongside [`Self::reported_trac_status`]: suppressed
    /// while the reported status is the synthetic `FINISHING` shaping above.
    pub fn reported_status_message(&self) -> Option<&str> {
        if self.reported_trac_status() == TracStatus::Finishing
            && self.trac_status.is_terminal()
        {
            None
        } else {
            self.status_message.as_deref()
        }
    }
}
