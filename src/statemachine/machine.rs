//! Pluggable state machine contract.

use std::sync::Arc;

use super::errors::StateMachineResult;
use crate::consensus::{ConsensusGroupId, LogEntry};

/// Business logic driven by the committed log of one group.
///
/// Entries are applied strictly in index order from a single thread. A
/// failing `apply` is fatal for the group; implementations must not leave
/// partial effects visible to `read`.
pub trait StateMachine: Send {
    /// Applies a committed entry, returning the write result.
    fn apply(&mut self, entry: &LogEntry) -> StateMachineResult<Vec<u8>>;

    /// Answers a read against the current applied state.
    fn read(&self, request: &[u8]) -> StateMachineResult<Vec<u8>>;

    /// Serializes the current state, or `None` when snapshots are
    /// unsupported or disabled. `None` forces full log replay on restart.
    fn snapshot(&self) -> Option<Vec<u8>>;

    /// Replaces the current state with a snapshot blob.
    fn restore(&mut self, state: &[u8]) -> StateMachineResult<()>;
}

/// Builds a fresh state machine for a group when it is created or restarted.
pub type StateMachineProvider =
    Arc<dyn Fn(ConsensusGroupId) -> Box<dyn StateMachine> + Send + Sync>;
