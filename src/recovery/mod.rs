//! Recovery subsystem
//!
//! After a restart a replica restores its latest snapshot (if any) and
//! replays the persisted log up to the commit index observed at startup,
//! the redo target. Until replay reaches that target and a leader is
//! confirmed, its state may be older than what clients have already seen,
//! so the read path must not serve it.
//!
//! # Startup Sequence
//!
//! 1. Open the group log in the consensus engine
//! 2. Restore the adapter from the latest snapshot
//! 3. `begin_recovery(resumed, commit_index)`
//! 4. Start the apply driver; every apply reports `on_applied`
//! 5. `Ready` once applied >= redo target and a leader is confirmed
//!
//! # Invariants
//!
//! - Recovery state moves forward only, once per process lifetime
//! - Queued reads are released only by apply progress or leadership
//!   changes, never by polling
//! - Every queued read is resolved exactly once

mod coordinator;
mod errors;
mod state;

pub use coordinator::{Admission, AppliedWait, Expiry, ReadTicket, RecoveryCoordinator};
pub use errors::{RecoveryError, RecoveryResult};
pub use state::RecoveryState;
