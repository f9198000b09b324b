//! Consensus engine boundary
//!
//! The Raft engine is an external collaborator. This module defines the
//! types shared with it, the capability trait the rest of the crate
//! consumes, and [`LocalConsensus`], an in-process implementation that
//! persists one log per group and lets callers drive leadership.

mod engine;
mod errors;
mod local;
mod types;

pub use engine::{ConsensusEngine, ConsensusListener};
pub use errors::{ConsensusError, ConsensusResult};
pub use local::{GroupMetadata, LocalConsensus, MEMBERS_FILE};
pub use types::{ConsensusGroupId, LeadershipStatus, LogEntry, LogIndex, NodeId, Peer};
