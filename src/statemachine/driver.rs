//! Apply driver
//!
//! One thread per group applies committed entries in index order:
//!
//! 1. Wait (condvar) until the known commit index passes the applied index
//! 2. Fetch the committed range from the engine
//! 3. Apply each entry through the adapter
//! 4. Report `on_applied` to the recovery coordinator after each entry
//! 5. Take an automatic snapshot every `snapshot_interval` entries
//!
//! The thread exits on shutdown or on the first apply failure, which halts
//! the group. Shutdown is checked between entries, never mid-apply.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::adapter::StateMachineAdapter;
use crate::consensus::{ConsensusEngine, ConsensusGroupId, LogIndex};
use crate::observability::{
    log_event_at, log_event_with_fields, Event, MetricsRegistry, ObservationScope, Severity,
};
use crate::recovery::RecoveryCoordinator;

#[derive(Debug, Default)]
struct SignalState {
    commit_index: LogIndex,
    shutdown: bool,
}

/// Wakes the apply thread when new entries commit.
#[derive(Debug, Default)]
pub struct ApplySignal {
    state: Mutex<SignalState>,
    wake: Condvar,
}

impl ApplySignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records that entries up to `commit_index` are committed.
    pub fn notify_commit(&self, commit_index: LogIndex) {
        let mut state = self.lock();
        if commit_index > state.commit_index {
            state.commit_index = commit_index;
            self.wake.notify_all();
        }
    }

    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.wake.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Blocks until there is something past `applied` to apply.
    ///
    /// Returns the commit index to apply up to, or `None` on shutdown.
    fn wait_for_work(&self, applied: LogIndex) -> Option<LogIndex> {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if state.commit_index > applied {
                return Some(state.commit_index);
            }
            state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Everything the apply thread needs for one group.
pub struct ApplyContext {
    pub group: ConsensusGroupId,
    pub engine: Arc<dyn ConsensusEngine>,
    pub adapter: Arc<StateMachineAdapter>,
    pub coordinator: Arc<RecoveryCoordinator>,
    pub metrics: Arc<MetricsRegistry>,
    /// Entries between automatic snapshots; `None` disables them
    pub snapshot_interval: Option<u64>,
}

/// Owns the apply thread of one group.
pub struct ApplyDriver {
    signal: Arc<ApplySignal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ApplyDriver {
    /// Spawns the apply thread, which immediately replays up to `redo_target`.
    pub fn start(
        ctx: ApplyContext,
        signal: Arc<ApplySignal>,
        redo_target: LogIndex,
    ) -> io::Result<Self> {
        signal.notify_commit(redo_target);
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name(format!("apply-{}", ctx.group))
            .spawn(move || run(ctx, thread_signal, redo_target))?;

        Ok(Self {
            signal,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn signal(&self) -> &Arc<ApplySignal> {
        &self.signal
    }

    /// Stops the thread after its current entry and joins it.
    pub fn stop(&self) {
        self.signal.shutdown();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for ApplyDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(ctx: ApplyContext, signal: Arc<ApplySignal>, redo_target: LogIndex) {
    let group = ctx.group.to_string();
    let mut replay = if ctx.adapter.applied_index() < redo_target {
        Some(ObservationScope::with_fields(
            "REPLAY",
            &[
                ("group", group.as_str()),
                ("redo_target", &redo_target.to_string()),
                ("resumed", &ctx.adapter.applied_index().to_string()),
            ],
        ))
    } else {
        None
    };
    let mut auto_snapshot = ctx.snapshot_interval.filter(|n| *n > 0);

    loop {
        let applied = ctx.adapter.applied_index();
        let Some(target) = signal.wait_for_work(applied) else {
            return;
        };

        let entries = match ctx.engine.entries(ctx.group, applied.next(), target) {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => {
                halt(&ctx, applied.next(), "committed entries missing from log", replay.take());
                return;
            }
            // A closed group looks like a missing one; that is a stop, not a failure.
            Err(_) if signal.is_shutdown() => return,
            Err(e) => {
                halt(&ctx, applied.next(), &e.to_string(), replay.take());
                return;
            }
        };

        for entry in entries {
            if signal.is_shutdown() {
                return;
            }
            if let Err(e) = ctx.adapter.apply(&entry) {
                halt(&ctx, entry.index, &e.to_string(), replay.take());
                return;
            }

            ctx.metrics.increment_entries_applied(entry.index <= redo_target);
            ctx.coordinator.on_applied(entry.index);
            log_event_with_fields(
                Event::WriteApplied,
                &[("group", &group), ("index", &entry.index.to_string())],
            );

            if entry.index >= redo_target {
                if let Some(scope) = replay.take() {
                    scope.complete_with_fields(&[("applied", &entry.index.to_string())]);
                }
            }

            if let Some(interval) = auto_snapshot {
                if ctx.adapter.entries_since_snapshot() >= interval {
                    match ctx.adapter.snapshot() {
                        Ok(Some(_)) => ctx.metrics.increment_snapshots_taken(),
                        Ok(None) => auto_snapshot = None,
                        Err(e) => log_event_at(
                            Severity::Warn,
                            Event::SnapshotSkipped,
                            &[("group", &group), ("reason", &e.to_string())],
                        ),
                    }
                }
            }
        }
    }
}

fn halt(
    ctx: &ApplyContext,
    index: LogIndex,
    reason: &str,
    replay: Option<ObservationScope<'static>>,
) {
    ctx.metrics.increment_apply_failures();
    ctx.coordinator.halt(index);
    log_event_with_fields(
        Event::ApplyFailed,
        &[
            ("group", &ctx.group.to_string()),
            ("index", &index.to_string()),
            ("reason", reason),
        ],
    );
    if let Some(scope) = replay {
        scope.fail(reason);
    }
}
