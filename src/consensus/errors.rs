//! Consensus engine error types

use thiserror::Error;

use super::types::{ConsensusGroupId, Peer};
use crate::log::LogError;

/// Result type for consensus engine operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors surfaced by a consensus engine binding
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Proposal rejected: the local replica is not the leader
    #[error("{group}: not leader (current leader: {leader:?})")]
    NotLeader {
        group: ConsensusGroupId,
        leader: Option<Peer>,
    },

    #[error("{0}: group not found")]
    GroupNotFound(ConsensusGroupId),

    #[error("{0}: group already open")]
    GroupAlreadyOpen(ConsensusGroupId),

    /// Persisted group metadata could not be read or written
    #[error("{group}: metadata error: {reason}")]
    Metadata {
        group: ConsensusGroupId,
        reason: String,
    },

    #[error("log error: {0}")]
    Log(#[from] LogError),
}

impl ConsensusError {
    /// Whether the caller may retry (possibly against another replica).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConsensusError::NotLeader { .. })
    }
}
