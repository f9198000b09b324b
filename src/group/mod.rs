//! Group management
//!
//! [`GroupManager`] owns the local peers of consensus groups on a node.
//! Each peer wires together the engine binding, the state machine adapter,
//! the recovery coordinator, the read gateway and the apply thread.
//!
//! Restart is the same path as creation: a group with persisted state
//! restores its snapshot and replays its log before it serves reads.

mod config;
mod errors;
mod manager;
mod replica;

pub use config::GroupConfig;
pub use errors::{GroupError, GroupResult};
pub use manager::{GroupManager, GroupStatus, WriteStatus};
