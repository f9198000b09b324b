//! Read gateway: the read-index protocol with recovery gating
//!
//! 1. Ask the engine for leadership; `NoLeader` rejects the read
//! 2. Take `read_index = commit_index`
//! 3. Admit under the coordinator lock: serve immediately when the
//!    replica is `Ready` and `applied >= read_index`
//! 4. Otherwise park in the wait set until release, failure or deadline
//!
//! A replica that has just restarted reports no leader until elected, and
//! stays out of `Ready` until replay reaches the redo target, so a
//! recovering replica either rejects or blocks. It never answers from a
//! state older than the read index.

use std::sync::Arc;
use std::time::Instant;

use super::errors::{ReadError, ReadResult};
use super::wait_set::ReadOutcome;
use crate::consensus::{ConsensusEngine, ConsensusError, ConsensusGroupId, LogIndex};
use crate::observability::{log_event_at, log_event_with_fields, Event, MetricsRegistry, Severity};
use crate::recovery::{Admission, Expiry, ReadTicket, RecoveryCoordinator};
use crate::statemachine::{StateMachineAdapter, StateMachineError};

/// Linearizable read path of one group.
pub struct ReadGateway {
    group: ConsensusGroupId,
    engine: Arc<dyn ConsensusEngine>,
    adapter: Arc<StateMachineAdapter>,
    coordinator: Arc<RecoveryCoordinator>,
    metrics: Arc<MetricsRegistry>,
}

impl ReadGateway {
    pub fn new(
        group: ConsensusGroupId,
        engine: Arc<dyn ConsensusEngine>,
        adapter: Arc<StateMachineAdapter>,
        coordinator: Arc<RecoveryCoordinator>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            group,
            engine,
            adapter,
            coordinator,
            metrics,
        }
    }

    pub fn group(&self) -> ConsensusGroupId {
        self.group
    }

    /// Serves `request` linearizably or fails with a typed error.
    ///
    /// Blocks at most until `deadline`.
    pub fn read(&self, request: &[u8], deadline: Instant) -> ReadResult<Vec<u8>> {
        let leadership = self
            .engine
            .leadership_status(self.group)
            .map_err(|e| self.engine_error(e))?;
        if !leadership.is_resolved() {
            return Err(self.reject(ReadError::NoLeaderAvailable(self.group)));
        }

        let read_index = self
            .engine
            .commit_index(self.group)
            .map_err(|e| self.engine_error(e))?;

        match self.coordinator.admit(read_index, deadline) {
            Err(e) => Err(self.reject(e)),
            Ok(Admission::Immediate) => {
                self.metrics.increment_reads_fast_path();
                log_event_with_fields(
                    Event::ReadFastPath,
                    &[("group", &self.group.to_string()), ("read_index", &read_index.to_string())],
                );
                self.execute(request, read_index, deadline)
            }
            Ok(Admission::Queued(ticket)) => {
                self.metrics.increment_reads_queued();
                log_event_with_fields(
                    Event::ReadQueued,
                    &[("group", &self.group.to_string()), ("read_index", &read_index.to_string())],
                );
                self.await_release(&ticket, request, deadline)
            }
        }
    }

    fn await_release(
        &self,
        ticket: &ReadTicket,
        request: &[u8],
        deadline: Instant,
    ) -> ReadResult<Vec<u8>> {
        let outcome = match ticket.slot.wait_until(deadline) {
            Some(outcome) => outcome,
            None => match self.coordinator.expire(ticket) {
                Expiry::Expired { applied } => return Err(self.timeout(ticket.read_index, applied)),
                Expiry::Resolved(outcome) => outcome,
            },
        };

        match outcome {
            ReadOutcome::Released => {
                self.metrics.add_reads_released(1);
                self.execute(request, ticket.read_index, deadline)
            }
            ReadOutcome::TimedOut => {
                let (_, applied) = self.coordinator.current_state();
                Err(self.timeout(ticket.read_index, applied))
            }
            ReadOutcome::NoLeader => Err(self.reject(ReadError::NoLeaderAvailable(self.group))),
            ReadOutcome::Unavailable(failed_index) => Err(self.reject(ReadError::GroupUnavailable {
                group: self.group,
                failed_index,
            })),
        }
    }

    // Applied state only grows, so reading after admission or release
    // observes every entry up to the read index. The next apply may already
    // hold the state machine; waiting for it is bounded by the deadline.
    fn execute(&self, request: &[u8], read_index: LogIndex, deadline: Instant) -> ReadResult<Vec<u8>> {
        match self.adapter.read(request, deadline) {
            Ok(value) => Ok(value),
            Err(StateMachineError::DeadlineExceeded) => {
                Err(self.timeout(read_index, self.adapter.applied_index()))
            }
            Err(StateMachineError::Halted(failed_index)) => {
                Err(self.reject(ReadError::GroupUnavailable {
                    group: self.group,
                    failed_index,
                }))
            }
            Err(e) => Err(ReadError::StateMachine(e)),
        }
    }

    fn timeout(&self, read_index: LogIndex, applied: LogIndex) -> ReadError {
        self.metrics.increment_reads_timed_out();
        log_event_at(
            Severity::Warn,
            Event::ReadTimeout,
            &[
                ("applied", &applied.to_string()),
                ("group", &self.group.to_string()),
                ("read_index", &read_index.to_string()),
            ],
        );
        ReadError::ReadTimeout {
            group: self.group,
            read_index,
            applied,
        }
    }

    fn reject(&self, err: ReadError) -> ReadError {
        let reason = match &err {
            ReadError::NoLeaderAvailable(_) => {
                self.metrics.increment_reads_rejected_no_leader();
                "no_leader"
            }
            ReadError::GroupUnavailable { .. } => {
                self.metrics.increment_reads_rejected_unavailable();
                "unavailable"
            }
            _ => "error",
        };
        log_event_with_fields(
            Event::ReadRejected,
            &[("group", &self.group.to_string()), ("reason", reason)],
        );
        err
    }

    fn engine_error(&self, err: ConsensusError) -> ReadError {
        match err {
            ConsensusError::GroupNotFound(group) => ReadError::GroupNotFound(group),
            other => ReadError::Consensus(other),
        }
    }
}
