//! Capability interface of the consensus engine.
//!
//! The gateway never embeds a specific Raft implementation. It consumes the
//! narrow surface below; any conforming engine (in-process, networked) is
//! interchangeable.

use std::sync::Arc;

use super::errors::ConsensusResult;
use super::types::{ConsensusGroupId, LeadershipStatus, LogEntry, LogIndex, Peer};

/// Receives engine notifications for one group.
///
/// Engines must deliver notifications outside of their own locks and in the
/// order the underlying events happened.
pub trait ConsensusListener: Send + Sync {
    /// Entries up to `commit_index` are committed and eligible for apply.
    fn on_commit(&self, group: ConsensusGroupId, commit_index: LogIndex);

    /// The group's leadership status changed.
    fn on_leadership_change(&self, group: ConsensusGroupId, status: LeadershipStatus);
}

/// Replicated log, leader election and commit-index tracking.
pub trait ConsensusEngine: Send + Sync {
    /// Binds a group on this node, loading any persisted log.
    ///
    /// A freshly opened group has no confirmed leader.
    fn open_group(&self, group: ConsensusGroupId, members: &[Peer]) -> ConsensusResult<()>;

    /// Unbinds a group. Persisted state stays on disk.
    fn close_group(&self, group: ConsensusGroupId) -> ConsensusResult<()>;

    /// Whether persisted state exists for the group on this node.
    fn has_persisted_state(&self, group: ConsensusGroupId) -> bool;

    /// Groups with persisted state on this node, with their members.
    fn persisted_groups(&self) -> ConsensusResult<Vec<(ConsensusGroupId, Vec<Peer>)>>;

    /// Proposes a payload. Fails with `NotLeader` on non-leaders.
    ///
    /// Returns once the entry is committed.
    fn append(&self, group: ConsensusGroupId, payload: Vec<u8>) -> ConsensusResult<LogIndex>;

    /// Highest index durably replicated to a majority.
    fn commit_index(&self, group: ConsensusGroupId) -> ConsensusResult<LogIndex>;

    /// Current leadership status as seen locally.
    fn leadership_status(&self, group: ConsensusGroupId) -> ConsensusResult<LeadershipStatus>;

    /// Members of an open group, as persisted when it was first created.
    fn members(&self, group: ConsensusGroupId) -> ConsensusResult<Vec<Peer>>;

    /// Committed entries with `from <= index <= to`.
    fn entries(
        &self,
        group: ConsensusGroupId,
        from: LogIndex,
        to: LogIndex,
    ) -> ConsensusResult<Vec<LogEntry>>;

    /// Registers a listener for commit and leadership notifications.
    fn register_listener(
        &self,
        group: ConsensusGroupId,
        listener: Arc<dyn ConsensusListener>,
    ) -> ConsensusResult<()>;
}
