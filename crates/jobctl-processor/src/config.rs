use jobctl_core::SysConfigFile;

/// Static configuration the processor stamps into every job's
/// `sys_config.json`. Job-specific fields (`job_config.json`) are
/// built per job by [`crate::JobProcessor::launch_job`]; this part of the
/// runtime config is the same for every job a given orchestrator deployment
/// launches.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub sys_config: SysConfigFile,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sys_config: SysConfigFile {
                properties: Default::default(),
                storage: jobctl_core::StorageConfig {
                    default_bucket: "default".to_string(),
                    default_format: "ARROW_FILE".to_string(),
                    buckets: Default::default(),
                    external: Default::default(),
                },
                repositories: Default::default(),
                resources: Default::default(),
            },
        }
    }
}
