//! Observable events of a consensus node
//!
//! Events are explicit and typed; each has a stable name used as the
//! `event` field of the emitted log line.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Node lifecycle
    /// Node startup begins
    NodeStart,
    /// Node stopped, all groups closed
    NodeStop,
    /// Configuration loaded
    ConfigLoaded,

    // Group lifecycle
    /// New local peer created
    GroupCreated,
    /// Group bound to the consensus engine
    GroupOpened,
    /// Group stopped on this node
    GroupStopped,
    /// Group removed from this node
    GroupRemoved,

    // Leadership
    /// Leadership status changed
    LeadershipChanged,

    // Recovery
    /// Recovery target determined
    RecoveryBegin,
    /// Replica caught up and confirmed a leader
    RecoveryReady,

    // Apply
    /// State machine rejected an entry; apply halted (FATAL)
    ApplyFailed,

    // Snapshot
    /// Snapshot written
    SnapshotTaken,
    /// Snapshot unsupported or disabled by the state machine
    SnapshotSkipped,
    /// Snapshot restored at startup
    SnapshotRestored,

    // Reads
    /// Read answered without queuing
    ReadFastPath,
    /// Read queued until the applied index reaches its read index
    ReadQueued,
    /// Queued read released by apply progress
    ReadReleased,
    /// Read deadline elapsed while queued
    ReadTimeout,
    /// Read refused (no leader, group unavailable)
    ReadRejected,

    // Writes
    /// Write applied
    WriteApplied,
    /// Write refused (not leader, group unavailable)
    WriteRejected,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::NodeStart => "NODE_START",
            Event::NodeStop => "NODE_STOP",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::GroupCreated => "GROUP_CREATED",
            Event::GroupOpened => "GROUP_OPENED",
            Event::GroupStopped => "GROUP_STOPPED",
            Event::GroupRemoved => "GROUP_REMOVED",

            Event::LeadershipChanged => "LEADERSHIP_CHANGED",

            Event::RecoveryBegin => "RECOVERY_BEGIN",
            Event::RecoveryReady => "RECOVERY_READY",

            Event::ApplyFailed => "APPLY_FAILED",

            Event::SnapshotTaken => "SNAPSHOT_TAKEN",
            Event::SnapshotSkipped => "SNAPSHOT_SKIPPED",
            Event::SnapshotRestored => "SNAPSHOT_RESTORED",

            Event::ReadFastPath => "READ_FAST_PATH",
            Event::ReadQueued => "READ_QUEUED",
            Event::ReadReleased => "READ_RELEASED",
            Event::ReadTimeout => "READ_TIMEOUT",
            Event::ReadRejected => "READ_REJECTED",

            Event::WriteApplied => "WRITE_APPLIED",
            Event::WriteRejected => "WRITE_REJECTED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ApplyFailed)
    }

    /// Returns true for per-request events that are logged at TRACE
    pub fn is_hot_path(&self) -> bool {
        matches!(
            self,
            Event::ReadFastPath | Event::ReadQueued | Event::ReadReleased | Event::WriteApplied
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
