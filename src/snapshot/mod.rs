//! Snapshot subsystem
//!
//! A snapshot is a durable, checksummed copy of a group's state machine
//! together with the last log index it contains. Restart restores the
//! latest snapshot and replays only the log tail after it. Without a
//! snapshot the whole persisted log is replayed.
//!
//! # Design Principles
//!
//! - Atomic visibility (manifest rename is the commit point)
//! - Full durability (fsync blob, manifest and directory)
//! - Explicit integrity verification on load
//! - Snapshot is NOT compaction: the log is never truncated here

mod errors;
mod manifest;
mod store;

pub use errors::{Severity, SnapshotError, SnapshotErrorCode, SnapshotResult};
pub use manifest::{SnapshotManifest, FORMAT_VERSION};
pub use store::{SnapshotHandle, SnapshotStore, MANIFEST_FILE, SNAPSHOT_DIR};
