//! Read gateway subsystem
//!
//! The public read path of a consensus group:
//!
//! - fast path: the replica is `Ready` and already applied the read index
//! - queued path: an index-ordered wait set released by apply progress
//! - rejection: no leader, halted group, or deadline passed
//!
//! Failures are returned as typed results and never retried here.

mod errors;
mod read_gateway;
mod wait_set;

pub use errors::{ReadError, ReadResult};
pub use read_gateway::ReadGateway;
pub use wait_set::{PendingRead, ReadOutcome, ReadSlot, WaitSet};
