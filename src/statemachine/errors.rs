//! State machine error types

use thiserror::Error;

use crate::consensus::{ConsensusError, LogIndex};
use crate::snapshot::SnapshotError;

/// Result type for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;

#[derive(Debug, Error)]
pub enum StateMachineError {
    /// Business logic rejected a committed entry. Fatal for the group.
    #[error("apply of entry {index} failed: {reason}")]
    ApplyFailed { index: LogIndex, reason: String },

    /// Entries must arrive as `applied + 1`
    #[error("entry {actual} out of order (expected {expected})")]
    OutOfOrder { expected: LogIndex, actual: LogIndex },

    /// The apply loop stopped after a failure at the given index
    #[error("group halted after apply failure at entry {0}")]
    Halted(LogIndex),

    #[error("read failed: {0}")]
    ReadFailed(String),

    /// An apply held the state machine past the read's deadline
    #[error("state machine busy until read deadline")]
    DeadlineExceeded,

    #[error("restore failed: {0}")]
    RestoreFailed(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

impl StateMachineError {
    /// Whether this error stops the group's apply loop.
    pub fn halts_group(&self) -> bool {
        matches!(
            self,
            StateMachineError::ApplyFailed { .. }
                | StateMachineError::OutOfOrder { .. }
                | StateMachineError::Halted(_)
        )
    }
}
