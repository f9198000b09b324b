//! Replica recovery lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consensus::LogIndex;

/// Where a replica is in its restart lifecycle.
///
/// Moves only `Stopped -> Replaying -> Ready` (or `Stopped -> Ready` when
/// nothing needs replay) during a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecoveryState {
    /// Not started; adapter not yet restored
    Stopped,
    /// Replaying the persisted log up to `redo_target`
    Replaying { redo_target: LogIndex },
    /// Replay complete and a leader has been confirmed
    Ready,
}

impl RecoveryState {
    pub fn is_ready(&self) -> bool {
        matches!(self, RecoveryState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryState::Stopped => "stopped",
            RecoveryState::Replaying { .. } => "replaying",
            RecoveryState::Ready => "ready",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            RecoveryState::Stopped => 0,
            RecoveryState::Replaying { .. } => 1,
            RecoveryState::Ready => 2,
        }
    }

    /// Whether moving to `next` keeps the lifecycle forward-only.
    pub fn can_transition_to(&self, next: &RecoveryState) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryState::Replaying { redo_target } => {
                write!(f, "replaying(redo_target={})", redo_target)
            }
            other => write!(f, "{}", other.as_str()),
        }
    }
}
