//! In-memory [`MetadataClient`] test double.

use std::collections::HashMap;

use async_trait::async_trait;
use jobctl_core::{ObjectHeader, ObjectId, FIRST_VERSION};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{MetadataClient, MetadataError, WriteBatchRequest};

#[derive(Default)]
struct State {
    // object_id -> version -> content
    objects: HashMap<Uuid, HashMap<u32, serde_json::Value>>,
    tags: HashMap<Uuid, HashMap<String, String>>,
    reserved: HashMap<Uuid, String>,
    unavailable_until_calls: u32,
}

/// A tenant-blind, process-local metadata store good enough for the
/// processor/manager test suites and the CLI harness; not a wire client.
#[derive(Default)]
pub struct InMemoryMetadataClient {
    state: Mutex<State>,
}

impl InMemoryMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing `write_batch` (used by tests that
    /// need `readBatch` to already resolve referenced inputs).
    pub fn seed_object(&self, object_id: Uuid, version: u32, content: serde_json::Value) {
        self.state
            .lock()
            .objects
            .entry(object_id)
            .or_default()
            .insert(version, content);
    }

    /// Make the next `calls` metadata operations fail with `Unavailable`,
    /// for exercising the retry policy.
    pub fn fail_next_calls(&self, calls: u32) {
        self.state.lock().unavailable_until_calls = calls;
    }

    fn take_scripted_failure(&self) -> Option<MetadataError> {
        let mut state = self.state.lock();
        if state.unavailable_until_calls > 0 {
            state.unavailable_until_calls -= 1;
            Some(MetadataError::Unavailable(
                "in-memory metadata client scripted to fail".to_string(),
            ))
        } else {
            None
        }
    }
}

#[async_trait]
impl MetadataClient for InMemoryMetadataClient {
    async fn read_batch(
        &self,
        _tenant: &str,
        selectors: &HashMap<String, ObjectHeader>,
    ) -> Result<HashMap<String, serde_json::Value>, MetadataError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let state = self.state.lock();
        let mut out = HashMap::with_capacity(selectors.len());
        for (selector, header) in selectors {
            let versions = state.objects.get(&header.object_id).ok_or_else(|| {
                MetadataError::NotFound(format!(
                    "{} {} not found",
                    header.object_type, header.object_id
                ))
            })?;
            let content = match header.object_version {
                Some(v) => versions.get(&v).cloned(),
                None => versions.iter().max_by_key(|(v, _)| **v).map(|(_, c)| c.clone()),
            }
            .ok_or_else(|| {
                MetadataError::NotFound(format!(
                    "{} {} version {:?} not found",
                    header.object_type, header.object_id, header.object_version
                ))
            })?;
            out.insert(selector.clone(), content);
        }
        Ok(out)
    }

    async fn preallocate_id_batch(
        &self,
        _tenant: &str,
        object_type: &str,
        count: usize,
    ) -> Result<Vec<ObjectId>, MetadataError> {
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let mut state = self.state.lock();
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let id = Uuid::new_v4();
            state.reserved.insert(id, object_type.to_string());
            out.push(ObjectId::first(id));
        }
        Ok(out)
    }

    async fn write_batch(
        &self,
        _tenant: &str,
        batch: WriteBatchRequest,
    ) -> Result<(), MetadataError> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let mut state = self.state.lock();

        for write in batch.create_preallocated {
            let definition = write.definition.expect("create_preallocated carries a definition");
            state
                .objects
                .entry(write.object_id.object_id)
                .or_default()
                .insert(FIRST_VERSION, definition);
            state.reserved.remove(&write.object_id.object_id);
            if !write.tags.is_empty() {
                state
                    .tags
                    .entry(write.object_id.object_id)
                    .or_default()
                    .extend(write.tags);
            }
        }

        for write in batch.create_new {
            let definition = write.definition.expect("create_new carries a definition");
            state
                .objects
                .entry(write.object_id.object_id)
                .or_default()
                .insert(FIRST_VERSION, definition);
            if !write.tags.is_empty() {
                state
                    .tags
                    .entry(write.object_id.object_id)
                    .or_default()
                    .extend(write.tags);
            }
        }

        for write in batch.update_versions {
            let definition = write.definition.expect("update_versions carries a definition");
            let next_version = write
                .prior_version
                .map(|prior| prior.object_version + 1)
                .unwrap_or(FIRST_VERSION);
            state
                .objects
                .entry(write.object_id.object_id)
                .or_default()
                .insert(next_version, definition);
            if !write.tags.is_empty() {
                state
                    .tags
                    .entry(write.object_id.object_id)
                    .or_default()
                    .extend(write.tags);
            }
        }

        for write in batch.update_tags {
            state
                .tags
                .entry(write.object_id.object_id)
                .or_default()
                .extend(write.tags);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectWrite;

    fn header(object_id: Uuid, object_type: &str) -> ObjectHeader {
        ObjectHeader {
            object_id,
            object_type: object_type.to_string(),
            object_version: None,
        }
    }

    #[tokio::test]
    async fn read_batch_resolves_seeded_object() {
        let client = InMemoryMetadataClient::new();
        let id = Uuid::new_v4();
        client.seed_object(id, 0, serde_json::json!({"x": 1}));

        let mut selectors = HashMap::new();
        selectors.insert("input".to_string(), header(id, "DATA"));
        let result = client.read_batch("acme", &selectors).await.unwrap();
        assert_eq!(result["input"], serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn read_batch_missing_object_is_not_found() {
        let client = InMemoryMetadataClient::new();
        let mut selectors = HashMap::new();
        selectors.insert("input".to_string(), header(Uuid::new_v4(), "DATA"));
        let err = client.read_batch("acme", &selectors).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[tokio::test]
    async fn preallocate_then_create_preallocated_round_trips() {
        let client = InMemoryMetadataClient::new();
        let ids = client.preallocate_id_batch("acme", "DATA", 1).await.unwrap();
        let write = ObjectWrite {
            object_id: ids[0],
            object_type: "DATA".into(),
            definition: Some(serde_json::json!({"ready": true})),
            prior_version: None,
            preallocated: true,
            tags: HashMap::new(),
        };
        client
            .write_batch("acme", WriteBatchRequest::classify(vec![write]))
            .await
            .unwrap();

        let mut selectors = HashMap::new();
        selectors.insert("out".to_string(), header(ids[0].object_id, "DATA"));
        let result = client.read_batch("acme", &selectors).await.unwrap();
        assert_eq!(result["out"], serde_json::json!({"ready": true}));
    }

    #[tokio::test]
    async fn scripted_failures_are_retriable() {
        let client = InMemoryMetadataClient::new();
        client.fail_next_calls(1);
        let err = client.preallocate_id_batch("acme", "DATA", 1).await.unwrap_err();
        assert!(err.is_retriable());
        assert!(client.preallocate_id_batch("acme", "DATA", 1).await.is_ok());
    }
}
