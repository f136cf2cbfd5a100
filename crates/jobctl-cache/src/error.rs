use jobctl_core::JobKey;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no such cache entry for key {0}")]
    Missing(JobKey),
    #[error("ticket for key {0} at revision {1} was superseded")]
    TicketSuperseded(JobKey, u64),
    #[error("ticket for key {0} has expired")]
    TicketExpired(JobKey),
    #[error("cache entry already exists for key {0}")]
    AlreadyExists(JobKey),
}
