//! Read path error types

use thiserror::Error;

use crate::consensus::{ConsensusError, ConsensusGroupId, LogIndex};
use crate::statemachine::StateMachineError;

/// Result type for gateway reads
pub type ReadResult<T> = Result<T, ReadError>;

#[derive(Debug, Error)]
pub enum ReadError {
    /// No confirmed leader, or leadership was revoked while queued
    #[error("{0}: no leader available")]
    NoLeaderAvailable(ConsensusGroupId),

    /// The applied index did not reach the read index before the deadline
    #[error("{group}: read timed out (read_index {read_index}, applied {applied})")]
    ReadTimeout {
        group: ConsensusGroupId,
        read_index: LogIndex,
        applied: LogIndex,
    },

    /// The group's apply loop halted; no read is served from partial state
    #[error("{group}: group unavailable after apply failure at entry {failed_index}")]
    GroupUnavailable {
        group: ConsensusGroupId,
        failed_index: LogIndex,
    },

    #[error("{0}: group not found")]
    GroupNotFound(ConsensusGroupId),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),
}

impl ReadError {
    /// Whether the caller may retry the read later or elsewhere.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReadError::NoLeaderAvailable(_) | ReadError::ReadTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let group = ConsensusGroupId::new(1);
        assert!(ReadError::NoLeaderAvailable(group).is_retryable());
        assert!(ReadError::ReadTimeout {
            group,
            read_index: LogIndex::new(10),
            applied: LogIndex::new(3),
        }
        .is_retryable());
        assert!(!ReadError::GroupUnavailable {
            group,
            failed_index: LogIndex::new(4),
        }
        .is_retryable());
    }

    #[test]
    fn test_timeout_message_carries_indexes() {
        let err = ReadError::ReadTimeout {
            group: ConsensusGroupId::new(2),
            read_index: LogIndex::new(10),
            applied: LogIndex::new(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("group-2"));
        assert!(msg.contains("read_index 10"));
        assert!(msg.contains("applied 3"));
    }
}
