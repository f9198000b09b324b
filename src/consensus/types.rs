//! Core consensus group types: group ids, peers, log indexes, leadership.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a replication group (one per data partition).
///
/// Opaque to the gateway; rendered as `group-<n>` for directory names and
/// log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsensusGroupId(pub u32);

impl ConsensusGroupId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Directory name used for the group's persisted state.
    pub fn dir_name(self) -> String {
        format!("group-{}", self.0)
    }

    /// Parses a directory name produced by [`dir_name`](Self::dir_name).
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix("group-")?.parse().ok().map(Self)
    }
}

impl fmt::Display for ConsensusGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Node identifier, unique across the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// A member of a consensus group.
///
/// Membership is immutable for the lifetime of a group instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub node_id: NodeId,
    pub group_id: ConsensusGroupId,
}

impl Peer {
    pub fn new(node_id: NodeId, group_id: ConsensusGroupId) -> Self {
        Self { node_id, group_id }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node_id, self.group_id)
    }
}

/// Log index (1-based; 0 means "nothing applied").
///
/// Used for commit index, applied index and read index alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LogIndex(pub u64);

impl LogIndex {
    pub const ZERO: LogIndex = LogIndex(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> LogIndex {
        LogIndex(self.0 + 1)
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committed entry handed to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub index: LogIndex,
    pub payload: Vec<u8>,
}

impl LogEntry {
    pub fn new(index: LogIndex, payload: Vec<u8>) -> Self {
        Self { index, payload }
    }
}

/// Leadership status of a group as seen by the local replica.
///
/// Supplied by the consensus engine; may change at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadershipStatus {
    /// No confirmed leader (election in progress, or just restarted)
    NoLeader,
    /// A remote peer is the confirmed leader
    LeaderKnown(Peer),
    /// The local replica is the leader
    SelfLeader,
}

impl LeadershipStatus {
    /// Whether a leader is confirmed (self or remote).
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::NoLeader)
    }

    /// Short label for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoLeader => "no_leader",
            Self::LeaderKnown(_) => "leader_known",
            Self::SelfLeader => "self_leader",
        }
    }
}

impl fmt::Display for LeadershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLeader => write!(f, "NoLeader"),
            Self::LeaderKnown(peer) => write!(f, "LeaderKnown({})", peer),
            Self::SelfLeader => write!(f, "SelfLeader"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_dir_name_parses_back() {
        let gid = ConsensusGroupId::new(42);
        assert_eq!(gid.dir_name(), "group-42");
        assert_eq!(ConsensusGroupId::from_dir_name("group-42"), Some(gid));
        assert_eq!(ConsensusGroupId::from_dir_name("group-x"), None);
        assert_eq!(ConsensusGroupId::from_dir_name("snapshot"), None);
    }

    #[test]
    fn test_log_index_ordering() {
        assert!(LogIndex::ZERO < LogIndex::new(1));
        assert_eq!(LogIndex::new(9).next(), LogIndex::new(10));
    }

    #[test]
    fn test_leadership_resolution() {
        let peer = Peer::new(NodeId(2), ConsensusGroupId::new(1));
        assert!(!LeadershipStatus::NoLeader.is_resolved());
        assert!(LeadershipStatus::LeaderKnown(peer).is_resolved());
        assert!(LeadershipStatus::SelfLeader.is_resolved());
    }
}
