//! Persisted group log
//!
//! The log tail is the authoritative record of every committed entry of a
//! consensus group. Replay after restart reads it sequentially from index 1
//! (or from the snapshot boundary) and applies each entry in order.
//!
//! # Invariants
//!
//! - fsync before an append is acknowledged
//! - indexes start at 1 and never skip
//! - every record carries a CRC32 checksum
//! - corruption halts the reader, never skipped

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, format_checksum, parse_checksum, verify_checksum};
pub use errors::{LogError, LogErrorCode, LogResult, Severity};
pub use reader::{scan_last_index, LogReader};
pub use record::RECORD_OVERHEAD;
pub use writer::{log_path, LogWriter, LOG_DIR, LOG_FILE};
