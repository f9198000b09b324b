//! Recovery coordinator
//!
//! Tracks a replica's progress from restart to serving: the resumed
//! applied index, the replay target, the cached leadership status and the
//! wait set of queued reads. Everything lives behind one mutex, which is
//! the per-group critical section for read admission. Because
//! `on_applied` takes the same lock, a read can never be inserted after
//! the apply that would have released it.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --begin_recovery--> Replaying{redo_target} --applied>=target && leader--> Ready
//!    \------------------------(applied>=target)-------------------------------------^
//! ```

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use uuid::Uuid;

use super::errors::{RecoveryError, RecoveryResult};
use super::state::RecoveryState;
use crate::consensus::{ConsensusGroupId, LeadershipStatus, LogIndex};
use crate::gateway::{PendingRead, ReadError, ReadOutcome, ReadResult, ReadSlot, WaitSet};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Result of admitting a read.
#[derive(Debug)]
pub enum Admission {
    /// The applied state already covers the read index
    Immediate,
    /// Parked until release, failure or expiry
    Queued(ReadTicket),
}

/// Handle a queued reader keeps to wait on and expire its read.
#[derive(Debug, Clone)]
pub struct ReadTicket {
    pub request_id: Uuid,
    pub read_index: LogIndex,
    pub slot: Arc<ReadSlot>,
}

/// Result of expiring a queued read after its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The timeout won; the read was removed from the wait set
    Expired { applied: LogIndex },
    /// Something else resolved the read first
    Resolved(ReadOutcome),
}

/// Result of waiting for the applied index to reach a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedWait {
    Reached,
    TimedOut { applied: LogIndex },
    Halted(LogIndex),
    Closed,
}

struct CoordinatorInner {
    state: RecoveryState,
    applied: LogIndex,
    leadership: LeadershipStatus,
    leadership_observed: bool,
    halted_at: Option<LogIndex>,
    closed: bool,
    waiters: WaitSet,
}

impl CoordinatorInner {
    /// `Replaying -> Ready` once the target is applied and a leader is known.
    fn try_complete(&mut self) -> bool {
        if let RecoveryState::Replaying { redo_target } = self.state {
            if self.applied >= redo_target && self.leadership.is_resolved() {
                self.state = RecoveryState::Ready;
                return true;
            }
        }
        false
    }

    fn release_ready(&mut self) -> usize {
        if !self.state.is_ready() || !self.leadership.is_resolved() || self.halted_at.is_some() {
            return 0;
        }
        let released = self.waiters.take_up_to(self.applied);
        for read in &released {
            read.slot.resolve(ReadOutcome::Released);
        }
        released.len()
    }

    fn fail_all(&mut self, outcome: ReadOutcome) -> usize {
        let failed = self.waiters.take_all();
        for read in &failed {
            read.slot.resolve(outcome);
        }
        failed.len()
    }
}

/// Per-group recovery state and read admission.
pub struct RecoveryCoordinator {
    group: ConsensusGroupId,
    inner: Mutex<CoordinatorInner>,
    progress: Condvar,
    metrics: Arc<MetricsRegistry>,
}

impl RecoveryCoordinator {
    pub fn new(group: ConsensusGroupId, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            group,
            inner: Mutex::new(CoordinatorInner {
                state: RecoveryState::Stopped,
                applied: LogIndex::ZERO,
                leadership: LeadershipStatus::NoLeader,
                leadership_observed: false,
                halted_at: None,
                closed: false,
                waiters: WaitSet::new(),
            }),
            progress: Condvar::new(),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn group(&self) -> ConsensusGroupId {
        self.group
    }

    /// Starts recovery once the adapter has restored.
    ///
    /// Enters `Replaying` when `resumed < redo_target`, otherwise `Ready`.
    pub fn begin_recovery(
        &self,
        resumed: LogIndex,
        redo_target: LogIndex,
    ) -> RecoveryResult<RecoveryState> {
        let (state, released) = {
            let mut inner = self.lock();
            if inner.state != RecoveryState::Stopped {
                return Err(RecoveryError::AlreadyStarted {
                    group: self.group,
                    state: inner.state,
                });
            }
            inner.applied = resumed;
            inner.state = if resumed >= redo_target {
                RecoveryState::Ready
            } else {
                RecoveryState::Replaying { redo_target }
            };
            let released = inner.release_ready();
            self.progress.notify_all();
            (inner.state, released)
        };

        let group = self.group.to_string();
        log_event_with_fields(
            Event::RecoveryBegin,
            &[
                ("group", &group),
                ("redo_target", &redo_target.to_string()),
                ("resumed", &resumed.to_string()),
                ("state", state.as_str()),
            ],
        );
        if state.is_ready() {
            self.log_ready(resumed);
        }
        self.log_released(released, resumed);
        Ok(state)
    }

    /// Records a successful apply of entry `index`.
    ///
    /// Called by the apply thread in strictly increasing order. Completes
    /// recovery when possible and releases every queued read whose read
    /// index is now covered.
    pub fn on_applied(&self, index: LogIndex) {
        let (completed, released) = {
            let mut inner = self.lock();
            if index <= inner.applied {
                return;
            }
            inner.applied = index;
            let completed = inner.try_complete();
            let released = inner.release_ready();
            self.progress.notify_all();
            (completed, released)
        };

        if completed {
            self.log_ready(index);
        }
        self.log_released(released, index);
    }

    /// Records a leadership change reported by the engine.
    ///
    /// Losing the leader fails every queued read with `NoLeaderAvailable`;
    /// gaining one may complete recovery.
    pub fn on_leadership_change(&self, status: LeadershipStatus) {
        let mut inner = self.lock();
        inner.leadership_observed = true;
        self.apply_leadership(inner, status);
    }

    /// Installs the engine's leadership status at startup unless a
    /// notification already delivered a newer one.
    pub fn seed_leadership(&self, status: LeadershipStatus) {
        let inner = self.lock();
        if inner.leadership_observed {
            return;
        }
        self.apply_leadership(inner, status);
    }

    fn apply_leadership(&self, mut inner: MutexGuard<'_, CoordinatorInner>, status: LeadershipStatus) {
        inner.leadership = status;
        let (completed, released, failed) = if status.is_resolved() {
            let completed = inner.try_complete();
            (completed, inner.release_ready(), 0)
        } else {
            (false, 0, inner.fail_all(ReadOutcome::NoLeader))
        };
        let applied = inner.applied;
        self.progress.notify_all();
        drop(inner);

        if completed {
            self.log_ready(applied);
        }
        self.log_released(released, applied);
        if failed > 0 {
            log_event_with_fields(
                Event::ReadRejected,
                &[
                    ("count", &failed.to_string()),
                    ("group", &self.group.to_string()),
                    ("reason", "leadership_revoked"),
                ],
            );
        }
    }

    /// Marks the group unavailable after an apply failure at `index`.
    pub fn halt(&self, index: LogIndex) {
        let mut inner = self.lock();
        if inner.halted_at.is_none() {
            inner.halted_at = Some(index);
        }
        let failed_index = inner.halted_at.unwrap_or(index);
        inner.fail_all(ReadOutcome::Unavailable(failed_index));
        self.progress.notify_all();
    }

    /// Shuts the coordinator down, failing queued reads with
    /// `NoLeaderAvailable` and waking every waiter.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.leadership = LeadershipStatus::NoLeader;
        inner.fail_all(ReadOutcome::NoLeader);
        self.progress.notify_all();
    }

    /// Non-blocking view of the recovery state and applied index.
    pub fn current_state(&self) -> (RecoveryState, LogIndex) {
        let inner = self.lock();
        (inner.state, inner.applied)
    }

    pub fn leadership(&self) -> LeadershipStatus {
        self.lock().leadership
    }

    pub fn halted_at(&self) -> Option<LogIndex> {
        self.lock().halted_at
    }

    pub fn pending_reads(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Admits a read whose read index was taken from the engine.
    ///
    /// The cached leadership is re-checked here, under the lock, so a
    /// revocation that raced the engine query still rejects the read.
    pub fn admit(&self, read_index: LogIndex, deadline: Instant) -> ReadResult<Admission> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ReadError::NoLeaderAvailable(self.group));
        }
        if let Some(failed_index) = inner.halted_at {
            return Err(ReadError::GroupUnavailable {
                group: self.group,
                failed_index,
            });
        }
        if !inner.leadership.is_resolved() {
            return Err(ReadError::NoLeaderAvailable(self.group));
        }
        if inner.state.is_ready() && inner.applied >= read_index {
            return Ok(Admission::Immediate);
        }

        let read = PendingRead::new(read_index, deadline);
        let ticket = ReadTicket {
            request_id: read.request_id,
            read_index,
            slot: Arc::clone(&read.slot),
        };
        inner.waiters.insert(read);
        Ok(Admission::Queued(ticket))
    }

    /// Expires a queued read whose deadline passed.
    pub fn expire(&self, ticket: &ReadTicket) -> Expiry {
        let mut inner = self.lock();
        if inner
            .waiters
            .remove(ticket.read_index, ticket.request_id)
            .is_some()
        {
            ticket.slot.resolve(ReadOutcome::TimedOut);
            return Expiry::Expired {
                applied: inner.applied,
            };
        }
        Expiry::Resolved(ticket.slot.outcome().unwrap_or(ReadOutcome::TimedOut))
    }

    /// Blocks until the applied index reaches `index`.
    pub fn wait_applied(&self, index: LogIndex, deadline: Instant) -> AppliedWait {
        let mut inner = self.lock();
        loop {
            if inner.applied >= index {
                return AppliedWait::Reached;
            }
            if let Some(failed_index) = inner.halted_at {
                return AppliedWait::Halted(failed_index);
            }
            if inner.closed {
                return AppliedWait::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return AppliedWait::TimedOut {
                    applied: inner.applied,
                };
            }
            let (guard, _) = self
                .progress
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    /// Blocks until a leader is confirmed. `None` on deadline or close.
    pub fn wait_for_leader(&self, deadline: Instant) -> Option<LeadershipStatus> {
        let mut inner = self.lock();
        loop {
            if inner.leadership.is_resolved() {
                return Some(inner.leadership);
            }
            let now = Instant::now();
            if inner.closed || now >= deadline {
                return None;
            }
            let (guard, _) = self
                .progress
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    /// Blocks until the replica is `Ready`.
    pub fn wait_ready(&self, deadline: Instant) -> bool {
        let mut inner = self.lock();
        loop {
            if inner.state.is_ready() {
                return true;
            }
            let now = Instant::now();
            if inner.closed || inner.halted_at.is_some() || now >= deadline {
                return false;
            }
            let (guard, _) = self
                .progress
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    fn log_ready(&self, applied: LogIndex) {
        self.metrics.increment_recoveries_completed();
        log_event_with_fields(
            Event::RecoveryReady,
            &[("applied", &applied.to_string()), ("group", &self.group.to_string())],
        );
    }

    fn log_released(&self, released: usize, applied: LogIndex) {
        if released == 0 {
            return;
        }
        log_event_with_fields(
            Event::ReadReleased,
            &[
                ("applied", &applied.to_string()),
                ("count", &released.to_string()),
                ("group", &self.group.to_string()),
            ],
        );
    }
}
