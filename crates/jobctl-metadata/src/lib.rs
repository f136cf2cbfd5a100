//! Metadata client abstraction: the orchestrator core only depends on
//! the async [`MetadataClient`] trait, never a concrete wire protocol. This
//! crate ships the trait plus an [`InMemoryMetadataClient`] test double used
//! by the processor/manager test suites — not a production client, grounded
//! the same way the executor fake is.

pub mod memory;

pub use memory::InMemoryMetadataClient;

use std::collections::HashMap;

use async_trait::async_trait;
use jobctl_core::{ObjectHeader, ObjectId};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("metadata service unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out: {0}")]
    DeadlineExceeded(String),
}

impl MetadataError {
    /// Retriable/non-retriable split: `UNAVAILABLE` and
    /// `DEADLINE_EXCEEDED` are transient RPC errors; `NotFound` during
    /// `assembleAndValidate` is mapped to a consistency-validation failure
    /// by the processor and is never retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::DeadlineExceeded(_))
    }
}

/// A single object write, prior to classification into one of the four
/// `writeBatch` buckets.
///
/// `preallocated` stands in for the source protocol's sentinel check
/// (`priorVersion.objectVersion < FIRST_VERSION`, i.e. a negative version
/// marking "reserved but not yet created") — see DESIGN.md for why this
/// crate models it as an explicit flag set by [`InMemoryMetadataClient::preallocate_id_batch`]
/// callers rather than carrying a signed sentinel through [`ObjectId`].
#[derive(Debug, Clone)]
pub struct ObjectWrite {
    pub object_id: ObjectId,
    pub object_type: String,
    pub definition: Option<serde_json::Value>,
    pub prior_version: Option<ObjectId>,
    pub preallocated: bool,
    pub tags: HashMap<String, String>,
}

impl ObjectWrite {
    pub fn tag_update(object_id: ObjectId, object_type: impl Into<String>, tags: HashMap<String, String>) -> Self {
        Self {
            object_id,
            object_type: object_type.into(),
            definition: None,
            prior_version: None,
            preallocated: false,
            tags,
        }
    }

    fn classify(&self) -> WriteKind {
        if self.definition.is_none() {
            WriteKind::TagUpdate
        } else if self.prior_version.is_none() {
            if self.preallocated {
                WriteKind::CreatePreallocated
            } else {
                WriteKind::CreateNew
            }
        } else {
            WriteKind::UpdateVersion
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    TagUpdate,
    CreateNew,
    CreatePreallocated,
    UpdateVersion,
}

/// The four sub-lists a single `writeBatch` groups writes into.
#[derive(Debug, Clone, Default)]
pub struct WriteBatchRequest {
    pub create_preallocated: Vec<ObjectWrite>,
    pub create_new: Vec<ObjectWrite>,
    pub update_versions: Vec<ObjectWrite>,
    pub update_tags: Vec<ObjectWrite>,
}

impl WriteBatchRequest {
    /// Classify a flat list of writes into the four `writeBatch` buckets.
    pub fn classify(writes: Vec<ObjectWrite>) -> Self {
        let mut batch = WriteBatchRequest::default();
        for write in writes {
            match write.classify() {
                WriteKind::TagUpdate => batch.update_tags.push(write),
                WriteKind::CreateNew => batch.create_new.push(write),
                WriteKind::CreatePreallocated => batch.create_preallocated.push(write),
                WriteKind::UpdateVersion => batch.update_versions.push(write),
            }
        }
        batch
    }

    /// `writeBatch` is skipped entirely if all four sub-lists are empty.
    pub fn is_empty(&self) -> bool {
        self.create_preallocated.is_empty()
            && self.create_new.is_empty()
            && self.update_versions.is_empty()
            && self.update_tags.is_empty()
    }
}

/// Metadata service operations consumed by the orchestrator: `readBatch`,
/// `preallocateIdBatch`, and `writeBatch`. `createObject`/`updateTag` are
/// expressed as the single-item case of `writeBatch` rather than separate
/// trait methods, matching how the processor always calls through the batch
/// path.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Resolve a selector -> header mapping to object content, following
    /// dependencies (e.g. `DATA -> STORAGE`, `DATA -> SCHEMA`) the caller
    /// requested by including them in `selectors`. A selector with no
    /// matching object yields [`MetadataError::NotFound`].
    async fn read_batch(
        &self,
        tenant: &str,
        selectors: &HashMap<String, ObjectHeader>,
    ) -> Result<HashMap<String, serde_json::Value>, MetadataError>;

    /// Reserve `count` fresh object ids of `object_type`, usable in a job
    /// definition before the objects they name actually exist.
    async fn preallocate_id_batch(
        &self,
        tenant: &str,
        object_type: &str,
        count: usize,
    ) -> Result<Vec<ObjectId>, MetadataError>;

    /// Issue one batch write. Skipped by callers when
    /// [`WriteBatchRequest::is_empty`].
    async fn write_batch(
        &self,
        tenant: &str,
        batch: WriteBatchRequest,
    ) -> Result<(), MetadataError>;
}
