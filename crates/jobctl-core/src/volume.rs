use serde::{Deserialize, Serialize};

/// Volume kind a batch executor is asked to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeKind {
    Config,
    Result,
    Scratch,
}

/// Well-known volume names `launchJob` asks the executor to create.
/// The executor contract only distinguishes three [`VolumeKind`]s; the `log`
/// volume is a named scratch volume rather than a fourth kind (see DESIGN.md).
pub const CONFIG_VOLUME: &str = "config";
pub const RESULT_VOLUME: &str = "result";
pub const LOG_VOLUME: &str = "log";
pub const SCRATCH_VOLUME: &str = "scratch";

pub fn kind_for_volume(name: &str) -> VolumeKind {
    match name {
        CONFIG_VOLUME => VolumeKind::Config,
        RESULT_VOLUME => VolumeKind::Result,
        _ => VolumeKind::Scratch,
    }
}
