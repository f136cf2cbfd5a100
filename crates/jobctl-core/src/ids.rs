use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// First version assigned to any object in the metadata service.
pub const FIRST_VERSION: u32 = 0;

/// A versioned handle on an object held by the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub object_id: Uuid,
    pub object_version: u32,
}

impl ObjectId {
    pub fn new(object_id: Uuid, object_version: u32) -> Self {
        Self { object_id, object_version }
    }

    pub fn first(object_id: Uuid) -> Self {
        Self::new(object_id, FIRST_VERSION)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}", self.object_id, self.object_version)
    }
}

/// The cache key a job is addressed by. Derived from the job's [`ObjectId`]
/// once the initial metadata save has happened; stable for the lifetime of
/// the cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey(pub String);

impl JobKey {
    pub fn from_job_id(job_id: &ObjectId) -> Self {
        Self(format!("job-{}", job_id.object_id))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A reference to an object held by the metadata service, as carried in a
/// job's selector -> header mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub object_id: Uuid,
    pub object_type: String,
    pub object_version: Option<u32>,
}
