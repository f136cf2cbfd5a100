use std::time::Duration;

use jobctl_core::JobKey;
use jobctl_executor::ExecutorJobInfo;

/// Unit of work submitted onto the manager's single worker-pool channel.
/// The cache poller, the executor poller, and chained re-dispatches all
/// submit onto the same channel, so the channel's consumer count is the
/// single point of concurrency control.
#[derive(Debug)]
pub enum Task {
    /// The generic per-update task: dispatch by the entry's
    /// current `cacheStatus` per the dispatch table.
    ProcessUpdate {
        job_key: JobKey,
        revision: u64,
        lease: Duration,
    },
    /// The executor poller's `recordPollStatus` task: carries the freshly observed [`ExecutorJobInfo`]
    /// rather than re-deriving it from dispatch.
    RecordStatus {
        job_key: JobKey,
        revision: u64,
        info: ExecutorJobInfo,
    },
    /// Fired once after a fixed delay following a transition to
    /// `REMOVAL_SCHEDULED`; physically removes the entry.
    Remove { job_key: JobKey, revision: u64 },
}
