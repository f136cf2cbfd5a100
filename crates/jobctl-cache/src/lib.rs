//! Versioned-ticket cache: at-most-one-writer-per-key semantics,
//! supersession detection, and queryability by status.
//!
//! Concrete backing store: an in-process table keyed by [`JobKey`], one
//! `parking_lot::Mutex`-guarded slot per entry, held in a `dashmap::DashMap`
//! so unrelated keys never contend.

pub mod error;
pub mod ticket;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use jobctl_core::JobKey;
use parking_lot::Mutex;

pub use error::CacheError;
pub use ticket::{Ticket, TicketState};

/// A single cache entry: current revision, status, and the serialized value,
/// plus whatever ticket is presently outstanding against it.
struct Slot<S, V> {
    revision: u64,
    status: S,
    value: V,
    ticket_revision: Option<u64>,
    ticket_expiry: Option<Instant>,
}

/// A snapshot of an entry returned by reads.
#[derive(Debug, Clone)]
pub struct Entry<S, V> {
    pub key: JobKey,
    pub revision: u64,
    pub status: S,
    pub value: V,
}

pub(crate) struct Inner {
    // Type-erased release hook keyed by job, so `Ticket::drop` doesn't need
    // to know the entry's value/status types. Keeping this separate from
    // `Cache<S, V>` lets a single `Ticket` type serve every instantiation.
    release: Box<dyn Fn(&JobKey, u64) + Send + Sync>,
}

impl Inner {
    pub(crate) fn release_ticket(&self, key: &JobKey, revision: u64) {
        (self.release)(key, revision)
    }
}

/// The cache itself, generic over the status enum `S` and the stored value
/// `V` (in this crate's callers, [`jobctl_core::CacheStatus`] and
/// [`jobctl_core::JobState`] respectively — kept generic here so the cache
/// has no dependency on job semantics).
pub struct Cache<S, V> {
    table: Arc<DashMap<JobKey, Mutex<Slot<S, V>>>>,
    inner: Arc<Inner>,
}

impl<S, V> Clone for Cache<S, V> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S, V> Default for Cache<S, V>
where
    S: Clone + PartialEq + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, V> Cache<S, V>
where
    S: Clone + PartialEq + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        let table: Arc<DashMap<JobKey, Mutex<Slot<S, V>>>> = Arc::new(DashMap::new());
        let release_table = table.clone();
        let inner = Arc::new(Inner {
            release: Box::new(move |key, revision| {
                if let Some(slot) = release_table.get(key) {
                    let mut slot = slot.lock();
                    if slot.ticket_revision == Some(revision) {
                        slot.ticket_revision = None;
                        slot.ticket_expiry = None;
                    }
                }
            }),
        });
        Self { table, inner }
    }

    /// `openNewTicket(key, duration)`: grants a fresh ticket at
    /// revision 0 unless the key already exists. Two concurrent callers can
    /// both observe an absent key and both be granted a ticket here; the
    /// race is actually closed at [`Self::add_entry`], which re-checks
    /// existence when inserting and rejects the loser with `AlreadyExists`.
    pub fn open_new_ticket(&self, key: &JobKey, duration: Duration) -> Ticket {
        if self.table.contains_key(key) {
            return self.superseded_ticket(key.clone(), 0);
        }
        Ticket {
            key: key.clone(),
            revision: 0,
            expiry: Instant::now() + duration,
            state: TicketState::Granted,
            cache: None,
        }
    }

    /// `openTicket(key, revision, duration)`.
    pub fn open_ticket(&self, key: &JobKey, revision: u64, duration: Duration) -> Ticket {
        let Some(slot) = self.table.get(key) else {
            return Ticket {
                key: key.clone(),
                revision,
                expiry: Instant::now(),
                state: TicketState::Missing,
                cache: None,
            };
        };
        let mut slot = slot.lock();
        let now = Instant::now();
        let ticket_live = slot
            .ticket_expiry
            .map(|expiry| now < expiry)
            .unwrap_or(false);
        if slot.revision != revision || ticket_live {
            tracing::trace!(
                job_key = %key,
                requested_revision = revision,
                current_revision = slot.revision,
                ticket_live,
                "ticket superseded"
            );
            return self.superseded_ticket(key.clone(), revision);
        }
        let expiry = now + duration;
        slot.ticket_revision = Some(revision);
        slot.ticket_expiry = Some(expiry);
        Ticket {
            key: key.clone(),
            revision,
            expiry,
            state: TicketState::Granted,
            cache: Some(self.inner.clone()),
        }
    }

    fn superseded_ticket(&self, key: JobKey, revision: u64) -> Ticket {
        Ticket {
            key,
            revision,
            expiry: Instant::now(),
            state: TicketState::Superseded,
            cache: None,
        }
    }

    /// `addEntry(ticket, status, value)`: insert under a new ticket.
    pub fn add_entry(
        &self,
        ticket: &Ticket,
        status: S,
        value: V,
    ) -> Result<(), CacheError> {
        if !ticket.is_granted() {
            return Err(CacheError::TicketSuperseded(ticket.key.clone(), ticket.revision));
        }
        if self.table.contains_key(&ticket.key) {
            return Err(CacheError::AlreadyExists(ticket.key.clone()));
        }
        self.table.insert(
            ticket.key.clone(),
            Mutex::new(Slot {
                revision: 0,
                status,
                value,
                ticket_revision: None,
                ticket_expiry: None,
            }),
        );
        Ok(())
    }

    /// `getEntry(ticket)`: read the entry a granted ticket refers to.
    pub fn get_entry(&self, ticket: &Ticket) -> Result<Entry<S, V>, CacheError> {
        self.get_latest_entry(&ticket.key)
            .ok_or_else(|| CacheError::Missing(ticket.key.clone()))
    }

    /// `getLatestEntry(key)`: no ticket required.
    pub fn get_latest_entry(&self, key: &JobKey) -> Option<Entry<S, V>> {
        let slot = self.table.get(key)?;
        let slot = slot.lock();
        Some(Entry {
            key: key.clone(),
            revision: slot.revision,
            status: slot.status.clone(),
            value: slot.value.clone(),
        })
    }

    /// `updateEntry(ticket, status, value) -> newRevision`. Fails with
    /// `TicketExpired` if the lease has lapsed; the entry is left untouched.
    pub fn update_entry(
        &self,
        ticket: &Ticket,
        status: S,
        value: V,
    ) -> Result<u64, CacheError> {
        if !ticket.is_granted() {
            return Err(CacheError::TicketSuperseded(ticket.key.clone(), ticket.revision));
        }
        let now = Instant::now();
        if ticket.is_expired(now) {
            return Err(CacheError::TicketExpired(ticket.key.clone()));
        }
        let slot = self
            .table
            .get(&ticket.key)
            .ok_or_else(|| CacheError::Missing(ticket.key.clone()))?;
        let mut slot = slot.lock();
        if slot.revision != ticket.revision {
            return Err(CacheError::TicketSuperseded(ticket.key.clone(), ticket.revision));
        }
        if slot.ticket_revision != Some(ticket.revision)
            || slot.ticket_expiry.map(|e| now >= e).unwrap_or(true)
        {
            return Err(CacheError::TicketExpired(ticket.key.clone()));
        }
        slot.revision += 1;
        slot.status = status;
        slot.value = value;
        Ok(slot.revision)
    }

    /// `removeEntry(ticket)`.
    pub fn remove_entry(&self, ticket: &Ticket) -> Result<(), CacheError> {
        if !ticket.is_granted() {
            return Err(CacheError::TicketSuperseded(ticket.key.clone(), ticket.revision));
        }
        self.table.remove(&ticket.key);
        Ok(())
    }

    /// `queryState(statusSet, includeActiveTickets)`. Snapshot taken
    /// under each entry's own lock; no cross-entry consistency is implied.
    pub fn query_state<F>(&self, matches: F, include_active_tickets: bool) -> Vec<Entry<S, V>>
    where
        F: Fn(&S) -> bool,
    {
        let now = Instant::now();
        let mut out = Vec::new();
        for entry in self.table.iter() {
            let slot = entry.value().lock();
            if !matches(&slot.status) {
                continue;
            }
            if !include_active_tickets {
                let active = slot
                    .ticket_expiry
                    .map(|expiry| now < expiry)
                    .unwrap_or(false);
                if active {
                    continue;
                }
            }
            out.push(Entry {
                key: entry.key().clone(),
                revision: slot.revision,
                status: slot.status.clone(),
                value: slot.value.clone(),
            });
        }
        out
    }

    /// `closeTicket(ticket)`: idempotent, explicit release.
    pub fn close_ticket(&self, ticket: &mut Ticket) {
        ticket.close();
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum St {
        A,
        B,
    }

    fn key(s: &str) -> JobKey {
        JobKey(s.to_string())
    }

    #[test]
    fn open_new_ticket_grants_revision_zero_on_fresh_key() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        assert!(ticket.is_granted());
        assert_eq!(ticket.revision(), 0);
    }

    #[test]
    fn open_new_ticket_is_superseded_if_key_exists() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&ticket, St::A, 1).unwrap();
        let second = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        assert!(second.is_superseded());
    }

    #[test]
    fn update_entry_increments_revision() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&ticket, St::A, 1).unwrap();
        let rev = cache.update_entry(&ticket, St::B, 2).unwrap();
        assert_eq!(rev, 1);
        let entry = cache.get_latest_entry(&key("a")).unwrap();
        assert_eq!(entry.revision, 1);
        assert_eq!(entry.value, 2);
    }

    #[test]
    fn concurrent_duplicate_update_only_one_wins() {
        // S4: two tickets opened against the same (key, revision); exactly
        // one `update_entry` should succeed.
        let cache: Cache<St, i32> = Cache::new();
        let new_ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&new_ticket, St::A, 1).unwrap();
        drop(new_ticket);

        let t1 = cache.open_ticket(&key("a"), 0, Duration::from_secs(5));
        let t2 = cache.open_ticket(&key("a"), 0, Duration::from_secs(5));
        assert!(t1.is_granted());
        assert!(t2.is_superseded());

        let rev = cache.update_entry(&t1, St::B, 2).unwrap();
        assert_eq!(rev, 1);
        assert!(cache.update_entry(&t2, St::B, 3).is_err());
    }

    #[test]
    fn open_ticket_on_missing_key_is_missing() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_ticket(&key("nope"), 0, Duration::from_secs(1));
        assert!(ticket.is_missing());
    }

    #[test]
    fn open_ticket_wrong_revision_is_superseded() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&ticket, St::A, 1).unwrap();
        drop(ticket);
        let stale = cache.open_ticket(&key("a"), 5, Duration::from_secs(1));
        assert!(stale.is_superseded());
    }

    #[test]
    fn ticket_released_on_drop_allows_reacquire() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&ticket, St::A, 1).unwrap();
        drop(ticket);

        let t1 = cache.open_ticket(&key("a"), 0, Duration::from_secs(5));
        assert!(t1.is_granted());
        drop(t1);
        let t2 = cache.open_ticket(&key("a"), 0, Duration::from_secs(5));
        assert!(t2.is_granted());
    }

    #[test]
    fn update_under_expired_ticket_fails_and_leaves_entry_untouched() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&ticket, St::A, 1).unwrap();
        drop(ticket);

        let mut expiring = cache.open_ticket(&key("a"), 0, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        let result = cache.update_entry(&expiring, St::B, 2);
        assert!(matches!(result, Err(CacheError::TicketExpired(_))));
        expiring.close();

        let entry = cache.get_latest_entry(&key("a")).unwrap();
        assert_eq!(entry.revision, 0);
        assert_eq!(entry.value, 1);
    }

    #[test]
    fn query_state_excludes_active_tickets_by_default() {
        let cache: Cache<St, i32> = Cache::new();
        let new_ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&new_ticket, St::A, 1).unwrap();
        drop(new_ticket);

        let _held = cache.open_ticket(&key("a"), 0, Duration::from_secs(5));
        let visible = cache.query_state(|s| *s == St::A, false);
        assert!(visible.is_empty());
        let visible_incl = cache.query_state(|s| *s == St::A, true);
        assert_eq!(visible_incl.len(), 1);
    }

    #[test]
    fn remove_entry_deletes_key() {
        let cache: Cache<St, i32> = Cache::new();
        let ticket = cache.open_new_ticket(&key("a"), Duration::from_secs(1));
        cache.add_entry(&ticket, St::A, 1).unwrap();
        drop(ticket);
        let t = cache.open_ticket(&key("a"), 0, Duration::from_secs(5));
        cache.remove_entry(&t).unwrap();
        assert!(cache.get_latest_entry(&key("a")).is_none());
    }
}
