use std::sync::Arc;
use std::time::Instant;

use jobctl_core::JobKey;

use crate::Inner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Granted,
    Superseded,
    Missing,
}

/// A short-lived, exclusive lease over a cache key at a given revision.
///
/// Acquisition is scoped: dropping a granted ticket releases it, mirroring
/// "guaranteed release on all exit paths" regardless of which branch the
/// holder took (success, supersession, or a bailed-out error path).
pub struct Ticket {
    pub(crate) key: JobKey,
    pub(crate) revision: u64,
    pub(crate) expiry: Instant,
    pub(crate) state: TicketState,
    pub(crate) cache: Option<Arc<Inner>>,
}

impl Ticket {
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_granted(&self) -> bool {
        self.state == TicketState::Granted
    }

    pub fn is_superseded(&self) -> bool {
        self.state == TicketState::Superseded
    }

    pub fn is_missing(&self) -> bool {
        self.state == TicketState::Missing
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }

    /// Explicit, idempotent release. Calling this is
    /// optional: dropping the ticket has the same effect.
    pub fn close(&mut self) {
        if let Some(cache) = self.cache.take() {
            cache.release_ticket(&self.key, self.revision);
        }
        self.state = TicketState::Superseded;
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.take() {
            cache.release_ticket(&self.key, self.revision);
        }
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("key", &self.key)
            .field("revision", &self.revision)
            .field("state", &self.state)
            .finish()
    }
}
