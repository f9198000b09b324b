//! Index-ordered wait set for queued reads
//!
//! A queued read parks on its own [`ReadSlot`]. The slot is resolved
//! exactly once: by release when the applied index reaches the read index,
//! by a leadership or availability failure, or by the reader's own timeout.
//! Whichever resolution happens first wins; later attempts are no-ops.
//!
//! The wait set itself is not synchronized. It lives inside the recovery
//! coordinator's critical section so admission, release and expiry are
//! serialized with `on_applied`.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use uuid::Uuid;

use crate::consensus::LogIndex;

/// How a queued read was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Applied index reached the read index; the reader may execute
    Released,
    /// Timed out before release
    TimedOut,
    /// Leadership revoked or the group was stopped
    NoLeader,
    /// Apply halted at the given index
    Unavailable(LogIndex),
}

/// Set-once result slot shared between the reader and the wait set.
#[derive(Debug, Default)]
pub struct ReadSlot {
    outcome: Mutex<Option<ReadOutcome>>,
    resolved: Condvar,
}

impl ReadSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ReadOutcome>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves the slot. Returns false if it was already resolved.
    pub fn resolve(&self, outcome: ReadOutcome) -> bool {
        let mut slot = self.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.resolved.notify_all();
        true
    }

    pub fn outcome(&self) -> Option<ReadOutcome> {
        *self.lock()
    }

    /// Blocks until resolved or `deadline` passes.
    ///
    /// Returns `None` on deadline; the caller must then expire the read
    /// through the coordinator, which decides the race.
    pub fn wait_until(&self, deadline: Instant) -> Option<ReadOutcome> {
        let mut slot = self.lock();
        loop {
            if let Some(outcome) = *slot {
                return Some(outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .resolved
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }
}

/// A read waiting for the applied index to reach its read index.
#[derive(Debug)]
pub struct PendingRead {
    pub request_id: Uuid,
    pub read_index: LogIndex,
    pub deadline: Instant,
    pub slot: Arc<ReadSlot>,
}

impl PendingRead {
    pub fn new(read_index: LogIndex, deadline: Instant) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            read_index,
            deadline,
            slot: Arc::new(ReadSlot::new()),
        }
    }

    fn key(&self) -> (LogIndex, Uuid) {
        (self.read_index, self.request_id)
    }
}

/// Pending reads ordered by read index.
#[derive(Debug, Default)]
pub struct WaitSet {
    entries: BTreeMap<(LogIndex, Uuid), PendingRead>,
}

impl WaitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, read: PendingRead) {
        self.entries.insert(read.key(), read);
    }

    /// Removes one read, if it is still pending.
    pub fn remove(&mut self, read_index: LogIndex, request_id: Uuid) -> Option<PendingRead> {
        self.entries.remove(&(read_index, request_id))
    }

    /// Removes and returns every read with `read_index <= applied`, lowest first.
    pub fn take_up_to(&mut self, applied: LogIndex) -> Vec<PendingRead> {
        let remaining = match applied.value().checked_add(1) {
            Some(next) => self.entries.split_off(&(LogIndex::new(next), Uuid::nil())),
            None => BTreeMap::new(),
        };
        let ready = std::mem::replace(&mut self.entries, remaining);
        ready.into_values().collect()
    }

    /// Removes and returns every pending read.
    pub fn take_all(&mut self) -> Vec<PendingRead> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lowest read index still waiting.
    pub fn lowest_read_index(&self) -> Option<LogIndex> {
        self.entries.keys().next().map(|(index, _)| *index)
    }
}
