//! Consistency validation for `assembleAndValidate`: following
//! dependencies a `DATA` object carries (`DATA -> STORAGE`, `DATA -> SCHEMA`)
//! and checking the resolved objects are structurally sound.

use std::collections::HashMap;

use jobctl_core::ObjectHeader;
use uuid::Uuid;

/// Derived selectors this request's resolved objects imply but did not name
/// directly — e.g. a `DATA` object's `storageId`/`schemaId` fields.
pub fn derived_selectors(
    referenced: &HashMap<String, ObjectHeader>,
    resolved: &HashMap<String, serde_json::Value>,
) -> HashMap<String, ObjectHeader> {
    let mut derived = HashMap::new();
    for (selector, header) in referenced {
        if header.object_type != "DATA" {
            continue;
        }
        let Some(content) = resolved.get(selector) else {
            continue;
        };
        if let Some(id) = field_uuid(content, "storageId") {
            derived
                .entry(format!("{selector}.storage"))
                .or_insert_with(|| ObjectHeader {
                    object_id: id,
                    object_type: "STORAGE".to_string(),
                    object_version: None,
                });
        }
        if let Some(id) = field_uuid(content, "schemaId") {
            derived
                .entry(format!("{selector}.schema"))
                .or_insert_with(|| ObjectHeader {
                    object_id: id,
                    object_type: "SCHEMA".to_string(),
                    object_version: None,
                });
        }
    }
    derived
}

fn field_uuid(value: &serde_json::Value, field: &str) -> Option<Uuid> {
    value.get(field)?.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

/// Structural consistency check over the fully resolved object set. Returns a human-readable message on the
/// first inconsistency found.
pub fn check_consistency(
    referenced: &HashMap<String, ObjectHeader>,
    resolved: &HashMap<String, serde_json::Value>,
) -> Result<(), String> {
    for (selector, header) in referenced {
        let content = resolved
            .get(selector)
            .ok_or_else(|| format!("selector '{selector}' did not resolve to an object"))?;
        if let Some(object_type) = content.get("objectType").and_then(|v| v.as_str()) {
            if object_type != header.object_type {
                return Err(format!(
                    "selector '{selector}' resolved to object type {object_type}, expected {}",
                    header.object_type
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_selectors_follow_data_to_storage_and_schema() {
        let storage_id = Uuid::new_v4();
        let schema_id = Uuid::new_v4();
        let mut referenced = HashMap::new();
        referenced.insert(
            "input".to_string(),
            ObjectHeader {
                object_id: Uuid::new_v4(),
                object_type: "DATA".to_string(),
                object_version: None,
            },
        );
        let mut resolved = HashMap::new();
        resolved.insert(
            "input".to_string(),
            serde_json::json!({ "storageId": storage_id.to_string(), "schemaId": schema_id.to_string() }),
        );

        let derived = derived_selectors(&referenced, &resolved);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived["input.storage"].object_id, storage_id);
        assert_eq!(derived["input.schema"].object_id, schema_id);
    }

    #[test]
    fn check_consistency_rejects_object_type_mismatch() {
        let mut referenced = HashMap::new();
        referenced.insert(
            "input".to_string(),
            ObjectHeader {
                object_id: Uuid::new_v4(),
                object_type: "DATA".to_string(),
                object_version: None,
            },
        );
        let mut resolved = HashMap::new();
        resolved.insert("input".to_string(), serde_json::json!({ "objectType": "MODEL" }));

        let err = check_consistency(&referenced, &resolved).unwrap_err();
        assert!(err.contains("expected DATA"));
    }

    #[test]
    fn check_consistency_accepts_matching_types() {
        let mut referenced = HashMap::new();
        referenced.insert(
            "input".to_string(),
            ObjectHeader {
                object_id: Uuid::new_v4(),
                object_type: "DATA".to_string(),
                object_version: None,
            },
        );
        let mut resolved = HashMap::new();
        resolved.insert("input".to_string(), serde_json::json!({ "objectType": "DATA" }));

        assert!(check_consistency(&referenced, &resolved).is_ok());
    }
}
