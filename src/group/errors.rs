//! Group manager error types

use thiserror::Error;

use crate::consensus::{ConsensusError, ConsensusGroupId, LogIndex, Peer};
use crate::gateway::ReadError;
use crate::recovery::RecoveryError;
use crate::snapshot::SnapshotError;
use crate::statemachine::StateMachineError;

pub type GroupResult<T> = Result<T, GroupError>;

#[derive(Debug, Error)]
pub enum GroupError {
    /// A local peer for the group is already running
    #[error("{0}: local peer already exists")]
    AlreadyExists(ConsensusGroupId),

    #[error("{0}: group not found")]
    GroupNotFound(ConsensusGroupId),

    /// Write proposed on a non-leader; `leader` is the redirect target
    #[error("{group}: not leader (current leader: {leader:?})")]
    NotLeader {
        group: ConsensusGroupId,
        leader: Option<Peer>,
    },

    /// Committed but not applied locally before the deadline
    #[error("{group}: entry {index} not applied before deadline (applied {applied})")]
    WriteTimeout {
        group: ConsensusGroupId,
        index: LogIndex,
        applied: LogIndex,
    },

    #[error("{group}: group unavailable after apply failure at entry {failed_index}")]
    GroupUnavailable {
        group: ConsensusGroupId,
        failed_index: LogIndex,
    },

    #[error("{0}: no leader elected before deadline")]
    NoLeaderAvailable(ConsensusGroupId),

    #[error("{0}: group stopped")]
    Stopped(ConsensusGroupId),

    #[error("read error: {0}")]
    Read(#[from] ReadError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GroupError {
    /// Whether the caller may retry, possibly against another replica.
    pub fn is_retryable(&self) -> bool {
        match self {
            GroupError::NotLeader { .. }
            | GroupError::WriteTimeout { .. }
            | GroupError::NoLeaderAvailable(_) => true,
            GroupError::Read(e) => e.is_retryable(),
            _ => false,
        }
    }
}
