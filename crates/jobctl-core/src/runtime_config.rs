use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{JobKey, ObjectHeader, ObjectId};

/// `job_config.json`, written into the config volume before `startBatch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfigFile {
    pub job_id: ObjectId,
    pub job: serde_json::Value,
    pub object_mapping: HashMap<String, ObjectHeader>,
    pub objects: HashMap<String, serde_json::Value>,
    pub tags: HashMap<String, String>,
    pub result_id: ObjectId,
    pub preallocated_ids: Vec<ObjectId>,
}

/// `sys_config.json`, written into the config volume alongside the job config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysConfigFile {
    pub properties: HashMap<String, String>,
    pub storage: StorageConfig,
    pub repositories: HashMap<String, serde_json::Value>,
    pub resources: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub default_bucket: String,
    pub default_format: String,
    pub buckets: HashMap<String, serde_json::Value>,
    pub external: HashMap<String, serde_json::Value>,
}

/// `job_result_<jobKey>.json`, read back from the result volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultFile {
    pub result: serde_json::Value,
    pub object_ids: Vec<ObjectId>,
    pub objects: HashMap<String, serde_json::Value>,
    pub attrs: HashMap<String, serde_json::Value>,
}

pub fn result_file_name(job_key: &JobKey) -> String {
    format!("job_result_{}.json", job_key.0)
}

/// Standard launch argument set passed to `startBatch`, in order.
pub fn launch_args(
    sys_config_path: &str,
    job_config_path: &str,
    result_dir: &str,
    scratch_dir: &str,
) -> Vec<String> {
    vec![
        "--sys-config".to_string(),
        sys_config_path.to_string(),
        "--job-config".to_string(),
        job_config_path.to_string(),
        "--job-result-dir".to_string(),
        result_dir.to_string(),
        "--job-result-format".to_string(),
        "json".to_string(),
        "--scratch-dir".to_string(),
        scratch_dir.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_are_in_spec_order() {
        let args = launch_args("/cfg/sys.json", "/cfg/job.json", "/result", "/scratch");
        assert_eq!(
            args,
            vec![
                "--sys-config",
                "/cfg/sys.json",
                "--job-config",
                "/cfg/job.json",
                "--job-result-dir",
                "/result",
                "--job-result-format",
                "json",
                "--scratch-dir",
                "/scratch",
            ]
        );
    }

    #[test]
    fn result_file_name_includes_job_key() {
        assert_eq!(result_file_name(&JobKey("job-abc".into())), "job_result_job-abc.json");
    }
}
