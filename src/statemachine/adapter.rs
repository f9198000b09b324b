//! State machine adapter
//!
//! Owns a group's state machine and the authoritative applied index. The
//! adapter is the only place entries reach business logic, so it is also
//! where sequential apply and the halt-on-failure rule are enforced.
//!
//! The machine and the progress counters sit behind separate locks. An apply
//! may run for a long time; progress queries never wait for it, and reads
//! wait for it only until their deadline.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::errors::{StateMachineError, StateMachineResult};
use super::machine::StateMachine;
use crate::consensus::{ConsensusGroupId, LogEntry, LogIndex};
use crate::observability::{log_event_with_fields, Event};
use crate::snapshot::{SnapshotHandle, SnapshotStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Progress {
    applied: LogIndex,
    halted_at: Option<LogIndex>,
    last_snapshot: LogIndex,
}

/// Exclusive access to the state machine that a waiter can abandon at a
/// deadline.
struct MachineCell {
    machine: Mutex<Box<dyn StateMachine>>,
    busy: Mutex<bool>,
    idle: Condvar,
}

/// Releases the claim on drop, after the machine guard is gone.
struct Claim<'a> {
    cell: &'a MachineCell,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        *lock(&self.cell.busy) = false;
        self.cell.idle.notify_all();
    }
}

struct MachineGuard<'a> {
    machine: MutexGuard<'a, Box<dyn StateMachine>>,
    _claim: Claim<'a>,
}

impl Deref for MachineGuard<'_> {
    type Target = Box<dyn StateMachine>;

    fn deref(&self) -> &Self::Target {
        &self.machine
    }
}

impl DerefMut for MachineGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.machine
    }
}

impl MachineCell {
    fn new(machine: Box<dyn StateMachine>) -> Self {
        Self {
            machine: Mutex::new(machine),
            busy: Mutex::new(false),
            idle: Condvar::new(),
        }
    }

    /// Waits until nobody holds the machine and claims it. `false` when
    /// `deadline` passed first.
    fn claim(&self, deadline: Option<Instant>) -> bool {
        let mut busy = lock(&self.busy);
        while *busy {
            busy = match deadline {
                None => self.idle.wait(busy).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.idle
                        .wait_timeout(busy, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        *busy = true;
        true
    }

    fn guard(&self) -> MachineGuard<'_> {
        MachineGuard {
            machine: lock(&self.machine),
            _claim: Claim { cell: self },
        }
    }

    fn acquire(&self) -> MachineGuard<'_> {
        self.claim(None);
        self.guard()
    }

    fn acquire_until(&self, deadline: Instant) -> Option<MachineGuard<'_>> {
        self.claim(Some(deadline)).then(|| self.guard())
    }
}

/// Applies committed entries to a [`StateMachine`] and tracks progress.
pub struct StateMachineAdapter {
    group: ConsensusGroupId,
    machine: MachineCell,
    progress: Mutex<Progress>,
    snapshots: SnapshotStore,
}

impl StateMachineAdapter {
    pub fn new(
        group: ConsensusGroupId,
        machine: Box<dyn StateMachine>,
        snapshots: SnapshotStore,
    ) -> Self {
        Self {
            group,
            machine: MachineCell::new(machine),
            progress: Mutex::new(Progress {
                applied: LogIndex::ZERO,
                halted_at: None,
                last_snapshot: LogIndex::ZERO,
            }),
            snapshots,
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        lock(&self.progress)
    }

    fn check_halted(&self) -> StateMachineResult<()> {
        match self.progress().halted_at {
            Some(index) => Err(StateMachineError::Halted(index)),
            None => Ok(()),
        }
    }

    pub fn group(&self) -> ConsensusGroupId {
        self.group
    }

    pub fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Loads `snapshot` (if any) into the state machine.
    ///
    /// Called once at startup before recovery begins. Returns the resumed
    /// applied index: the snapshot's last included index, or zero.
    pub fn restore(&self, snapshot: Option<&SnapshotHandle>) -> StateMachineResult<LogIndex> {
        let Some(handle) = snapshot else {
            self.progress().applied = LogIndex::ZERO;
            return Ok(LogIndex::ZERO);
        };

        let state = handle.read_state()?;
        let mut machine = self.machine.acquire();
        machine.restore(&state)?;
        let resumed = handle.last_included_index();
        {
            let mut progress = self.progress();
            progress.applied = resumed;
            progress.last_snapshot = resumed;
        }
        drop(machine);

        log_event_with_fields(
            Event::SnapshotRestored,
            &[
                ("group", &self.group.to_string()),
                ("last_included_index", &resumed.to_string()),
            ],
        );
        Ok(resumed)
    }

    /// Applies the next committed entry.
    ///
    /// The entry must be exactly `applied + 1`. Any failure halts the
    /// adapter: later applies and reads fail with `Halted`.
    pub fn apply(&self, entry: &LogEntry) -> StateMachineResult<Vec<u8>> {
        let mut machine = self.machine.acquire();
        {
            let mut progress = self.progress();
            if let Some(index) = progress.halted_at {
                return Err(StateMachineError::Halted(index));
            }
            let expected = progress.applied.next();
            if entry.index != expected {
                progress.halted_at = Some(entry.index);
                return Err(StateMachineError::OutOfOrder {
                    expected,
                    actual: entry.index,
                });
            }
        }

        // Only apply touches `applied`, and it holds the machine, so the
        // index cannot move while the entry runs.
        let result = machine.apply(entry);
        let mut progress = self.progress();
        match result {
            Ok(output) => {
                progress.applied = entry.index;
                Ok(output)
            }
            Err(e) => {
                progress.halted_at = Some(entry.index);
                Err(e)
            }
        }
    }

    /// Runs a read against the current applied state.
    ///
    /// Waits for an in-flight apply at most until `deadline`, then fails
    /// with `DeadlineExceeded`.
    pub fn read(&self, request: &[u8], deadline: Instant) -> StateMachineResult<Vec<u8>> {
        self.check_halted()?;
        let machine = self
            .machine
            .acquire_until(deadline)
            .ok_or(StateMachineError::DeadlineExceeded)?;
        self.check_halted()?;
        machine.read(request)
    }

    /// Applied index. Never waits for an in-flight apply.
    pub fn applied_index(&self) -> LogIndex {
        self.progress().applied
    }

    /// Index of the failed entry once the adapter has halted.
    pub fn halted_at(&self) -> Option<LogIndex> {
        self.progress().halted_at
    }

    /// Entries applied since the last snapshot taken or restored.
    pub fn entries_since_snapshot(&self) -> u64 {
        let progress = self.progress();
        progress.applied.value() - progress.last_snapshot.value()
    }

    /// Persists the current state.
    ///
    /// Returns `None` when the state machine does not support snapshots or
    /// nothing has been applied yet.
    pub fn snapshot(&self) -> StateMachineResult<Option<SnapshotHandle>> {
        let machine = self.machine.acquire();
        self.check_halted()?;
        let group = self.group.to_string();

        let applied = self.applied_index();
        if applied == LogIndex::ZERO {
            return Ok(None);
        }
        let Some(state) = machine.snapshot() else {
            log_event_with_fields(
                Event::SnapshotSkipped,
                &[("group", &group), ("reason", "unsupported")],
            );
            return Ok(None);
        };

        let handle = self.snapshots.save(applied, &state)?;
        self.progress().last_snapshot = applied;
        drop(machine);

        log_event_with_fields(
            Event::SnapshotTaken,
            &[
                ("group", &group),
                ("last_included_index", &applied.to_string()),
                ("size_bytes", &state.len().to_string()),
            ],
        );
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statemachine::IntegerCounter;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn adapter(temp: &TempDir, counter: IntegerCounter) -> StateMachineAdapter {
        let store = SnapshotStore::open(temp.path()).unwrap();
        StateMachineAdapter::new(ConsensusGroupId::new(1), Box::new(counter), store)
    }

    fn entry(index: u64) -> LogEntry {
        LogEntry::new(LogIndex::new(index), Vec::new())
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_millis(100)
    }

    fn read_value(adapter: &StateMachineAdapter) -> i64 {
        IntegerCounter::decode(&adapter.read(&[], soon()).unwrap()).unwrap()
    }

    #[test]
    fn test_sequential_apply_advances_index() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp, IntegerCounter::new());

        adapter.apply(&entry(1)).unwrap();
        adapter.apply(&entry(2)).unwrap();

        assert_eq!(adapter.applied_index(), LogIndex::new(2));
        assert_eq!(read_value(&adapter), 2);
    }

    #[test]
    fn test_out_of_order_apply_halts() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp, IntegerCounter::new());

        let err = adapter.apply(&entry(2)).unwrap_err();
        assert!(matches!(err, StateMachineError::OutOfOrder { .. }));
        assert_eq!(adapter.halted_at(), Some(LogIndex::new(2)));
        assert!(matches!(adapter.read(&[], soon()), Err(StateMachineError::Halted(_))));
    }

    #[test]
    fn test_apply_failure_halts_without_partial_state() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp, IntegerCounter::new().failing_at(LogIndex::new(2)));

        adapter.apply(&entry(1)).unwrap();
        assert!(adapter.apply(&entry(2)).is_err());

        assert_eq!(adapter.applied_index(), LogIndex::new(1));
        assert!(matches!(
            adapter.apply(&entry(3)),
            Err(StateMachineError::Halted(index)) if index == LogIndex::new(2)
        ));
    }

    #[test]
    fn test_snapshot_then_restore() {
        let temp = TempDir::new().unwrap();
        let first = adapter(&temp, IntegerCounter::new());
        for i in 1..=5 {
            first.apply(&entry(i)).unwrap();
        }
        let handle = first.snapshot().unwrap().unwrap();
        assert_eq!(handle.last_included_index(), LogIndex::new(5));
        assert_eq!(first.entries_since_snapshot(), 0);

        let second = adapter(&temp, IntegerCounter::new());
        let latest = second.snapshot_store().latest().unwrap();
        let resumed = second.restore(latest.as_ref()).unwrap();

        assert_eq!(resumed, LogIndex::new(5));
        assert_eq!(read_value(&second), 5);
        second.apply(&entry(6)).unwrap();
        assert_eq!(read_value(&second), 6);
    }

    #[test]
    fn test_snapshot_unsupported_returns_none() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp, IntegerCounter::new().without_snapshots());
        adapter.apply(&entry(1)).unwrap();

        assert!(adapter.snapshot().unwrap().is_none());
        assert!(adapter.snapshot_store().latest().unwrap().is_none());
    }

    #[test]
    fn test_restore_without_snapshot_starts_at_zero() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp, IntegerCounter::new());
        assert_eq!(adapter.restore(None).unwrap(), LogIndex::ZERO);
    }

    #[test]
    fn test_read_gives_up_at_deadline_during_slow_apply() {
        let temp = TempDir::new().unwrap();
        let stall = Duration::from_millis(400);
        let adapter = Arc::new(adapter(&temp, IntegerCounter::new().with_stall(stall)));
        adapter.apply(&entry(1)).unwrap();

        let applier = {
            let adapter = Arc::clone(&adapter);
            thread::spawn(move || adapter.apply(&entry(2)))
        };
        thread::sleep(Duration::from_millis(50));

        // Progress queries do not wait for the running apply.
        assert_eq!(adapter.applied_index(), LogIndex::new(1));

        let started = Instant::now();
        let result = adapter.read(&[], started + Duration::from_millis(50));
        assert!(matches!(result, Err(StateMachineError::DeadlineExceeded)));
        assert!(started.elapsed() < Duration::from_millis(250));

        applier.join().unwrap().unwrap();
        assert_eq!(read_value(&adapter), 2);
    }
}
