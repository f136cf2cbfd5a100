use serde::{Deserialize, Serialize};

/// Externally visible lifecycle code of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TracStatus {
    Preparing,
    Validated,
    Queued,
    Pending,
    Submitted,
    Running,
    Finishing,
    Succeeded,
    Failed,
    Cancelled,
}

impl TracStatus {
    /// `tracStatus` never regresses from a terminal value once set.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Tag value stamped onto the job's metadata object. Matches the `SCREAMING_SNAKE_CASE` wire form.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Preparing => "PREPARING",
            Self::Validated => "VALIDATED",
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Finishing => "FINISHING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Internal sub-state driving the cache FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    QueuedInTrac,
    LaunchScheduled,
    SentToExecutor,
    QueuedInExecutor,
    RunningInExecutor,
    ExecutorComplete,
    ExecutorSucceeded,
    ExecutorFailed,
    ResultsReceived,
    ResultsInvalid,
    ResultsSaved,
    ReadyToRemove,
    RemovalScheduled,
    ProcessingFailed,
}

impl CacheStatus {
    /// Entries eligible for the cache poller's per-update dispatch.
    /// Deliberately excludes `QUEUED_IN_TRAC`: that state is only ever
    /// dispatched through the capacity-gated launch pass
    /// ([`Self::is_for_launch`]), never through the unconditional update
    /// pass — otherwise every queued job would schedule a launch regardless
    /// of `maxJobs`, and the per-update chaining rule would immediately
    /// chain straight through to `launchJob`.
    pub fn is_for_update(self) -> bool {
        matches!(
            self,
            Self::LaunchScheduled
                | Self::ExecutorComplete
                | Self::ExecutorSucceeded
                | Self::ExecutorFailed
                | Self::ResultsReceived
                | Self::ResultsInvalid
                | Self::ResultsSaved
                | Self::ReadyToRemove
        )
    }

    /// Entries eligible to be picked up by the cache poller's capacity-gated
    /// launch pass.
    pub fn is_for_launch(self) -> bool {
        matches!(self, Self::QueuedInTrac)
    }

    /// Entries that occupy a "running" slot against `maxJobs` capacity.
    pub fn is_running_job(self) -> bool {
        matches!(
            self,
            Self::LaunchScheduled
                | Self::SentToExecutor
                | Self::QueuedInExecutor
                | Self::RunningInExecutor
                | Self::ExecutorComplete
                | Self::ExecutorSucceeded
        )
    }

    /// Reported externally as `FINISHING` regardless of `tracStatus`.
    pub fn is_finishing_window(self) -> bool {
        matches!(
            self,
            Self::ExecutorComplete
                | Self::ExecutorSucceeded
                | Self::ExecutorFailed
                | Self::ResultsReceived
                | Self::ResultsInvalid
                | Self::ResultsSaved
        )
    }
}

/// Status reported by the executor plugin for a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorStatus {
    StatusUnknown,
    Queued,
    Running,
    Complete,
    Succeeded,
    Failed,
    Cancelled,
}

/// Executor -> TRAC status mapping. `COMPLETE`/`SUCCEEDED` map to `FINISHING`
/// because the TRAC status only advances to `SUCCEEDED` once results are published.
pub fn executor_to_trac(status: ExecutorStatus) -> TracStatus {
    match status {
        ExecutorStatus::Queued => TracStatus::Submitted,
        ExecutorStatus::Running => TracStatus::Running,
        ExecutorStatus::Complete => TracStatus::Finishing,
        ExecutorStatus::Succeeded => TracStatus::Finishing,
        ExecutorStatus::Failed => TracStatus::Failed,
        ExecutorStatus::Cancelled => TracStatus::Cancelled,
        ExecutorStatus::StatusUnknown => TracStatus::Failed,
    }
}

/// Human-readable message for a `STATUS_UNKNOWN` executor report.
pub const STATUS_UNKNOWN_MESSAGE: &str = "Job status could not be determined";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_unknown_maps_to_failed() {
        assert_eq!(executor_to_trac(ExecutorStatus::StatusUnknown), TracStatus::Failed);
    }

    #[test]
    fn terminal_trac_status_does_not_include_running() {
        assert!(!TracStatus::Running.is_terminal());
        assert!(TracStatus::Succeeded.is_terminal());
        assert!(TracStatus::Failed.is_terminal());
        assert!(TracStatus::Cancelled.is_terminal());
    }

    #[test]
    fn finishing_window_covers_executor_and_results_prefixes() {
        assert!(CacheStatus::ExecutorSucceeded.is_finishing_window());
        assert!(CacheStatus::ResultsSaved.is_finishing_window());
        assert!(!CacheStatus::ReadyToRemove.is_finishing_window());
    }

    #[test]
    fn queued_in_trac_is_for_launch_only_not_for_update() {
        // Launch scheduling only ever happens through the capacity-gated
        // launch pass; the general update pass must not also pick it up.
        assert!(CacheStatus::QueuedInTrac.is_for_launch());
        assert!(!CacheStatus::QueuedInTrac.is_for_update());
        assert!(CacheStatus::LaunchScheduled.is_for_update());
        assert!(!CacheStatus::LaunchScheduled.is_for_launch());
    }
}
