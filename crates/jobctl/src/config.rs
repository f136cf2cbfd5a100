//! Layered configuration: defaults, then an optional TOML file, then
//! `JOBCTL_`-prefixed environment variables, the way golem's services
//! layer `figment::Figment` config — replacing a single hand-rolled JSON
//! reader with a structure that has a documented default for every field,
//! so a missing config file is never fatal.

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use jobctl_manager::ManagerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub poll_interval_secs: u64,
    pub executor_poll_interval_secs: u64,
    pub ticket_duration_secs: u64,
    pub executor_ticket_duration_secs: u64,
    pub max_jobs: usize,
    pub worker_pool_size: usize,
    pub retention_delay_secs: u64,
    pub job_timeout_secs: u64,
    pub retry_limit: u32,
    pub startup_delay_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        let defaults = ManagerConfig::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            executor_poll_interval_secs: defaults.executor_poll_interval.as_secs(),
            ticket_duration_secs: defaults.ticket_duration.as_secs(),
            executor_ticket_duration_secs: defaults.executor_ticket_duration.as_secs(),
            max_jobs: defaults.max_jobs,
            worker_pool_size: defaults.worker_pool_size,
            retention_delay_secs: defaults.retention_delay.as_secs(),
            job_timeout_secs: defaults.job_timeout.as_secs(),
            retry_limit: defaults.retry_limit,
            startup_delay_secs: defaults.startup_delay.as_secs(),
        }
    }
}

impl PollerConfig {
    pub fn into_manager_config(self) -> ManagerConfig {
        ManagerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            executor_poll_interval: Duration::from_secs(self.executor_poll_interval_secs),
            ticket_duration: Duration::from_secs(self.ticket_duration_secs),
            executor_ticket_duration: Duration::from_secs(self.executor_ticket_duration_secs),
            max_jobs: self.max_jobs,
            worker_pool_size: self.worker_pool_size,
            retention_delay: Duration::from_secs(self.retention_delay_secs),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            retry_limit: self.retry_limit,
            startup_delay: Duration::from_secs(self.startup_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `RUST_LOG`-style filter directive, e.g. `"info"` or `"jobctl=debug"`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub poller: PollerConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Resolve the config file's XDG location. The loader itself is
    /// `figment`-based: defaults, then the file if it exists, then
    /// environment overrides.
    pub fn config_file_path() -> PathBuf {
        let base = dirs_config_home();
        base.join("jobctl").join("config.toml")
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(&Self::config_file_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("JOBCTL_").split("__"))
            .extract()
    }
}

/// `$XDG_CONFIG_HOME`, falling back to `~/.config` when unset, without
/// pulling in a crate just for that one lookup.
fn dirs_config_home() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg);
        }
    }
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".config"))
        .unwrap_or_else(|_| PathBuf::from(".config"))
}
