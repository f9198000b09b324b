//! Integer counter state machine
//!
//! Every entry adds to an `i64`: an empty payload increments by one, an
//! 8-byte little-endian payload adds that delta. Reads return the current
//! value as 8 little-endian bytes.
//!
//! Knobs for exercising recovery: a per-apply stall, disabled snapshots and
//! an injected apply failure.

use std::thread;
use std::time::Duration;

use super::errors::{StateMachineError, StateMachineResult};
use super::machine::StateMachine;
use crate::consensus::{LogEntry, LogIndex};

#[derive(Debug, Clone, Default)]
pub struct IntegerCounter {
    value: i64,
    stall: Option<Duration>,
    snapshots_disabled: bool,
    fail_at: Option<LogIndex>,
}

impl IntegerCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `stall` inside every apply.
    pub fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = Some(stall);
        self
    }

    /// Makes `snapshot()` return `None`.
    pub fn without_snapshots(mut self) -> Self {
        self.snapshots_disabled = true;
        self
    }

    /// Fails the apply of entry `index`.
    pub fn failing_at(mut self, index: LogIndex) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Write payload adding `delta`.
    pub fn add_payload(delta: i64) -> Vec<u8> {
        delta.to_le_bytes().to_vec()
    }

    /// Write payload adding one.
    pub fn increment_payload() -> Vec<u8> {
        Vec::new()
    }

    /// Decodes a read or write result.
    pub fn decode(bytes: &[u8]) -> Option<i64> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(i64::from_le_bytes(raw))
    }
}

impl StateMachine for IntegerCounter {
    fn apply(&mut self, entry: &LogEntry) -> StateMachineResult<Vec<u8>> {
        if self.fail_at == Some(entry.index) {
            return Err(StateMachineError::ApplyFailed {
                index: entry.index,
                reason: "injected failure".to_string(),
            });
        }

        let delta = if entry.payload.is_empty() {
            1
        } else {
            Self::decode(&entry.payload).ok_or_else(|| StateMachineError::ApplyFailed {
                index: entry.index,
                reason: format!("malformed payload of {} bytes", entry.payload.len()),
            })?
        };

        if let Some(stall) = self.stall {
            thread::sleep(stall);
        }

        self.value = self.value.wrapping_add(delta);
        Ok(self.value.to_le_bytes().to_vec())
    }

    fn read(&self, _request: &[u8]) -> StateMachineResult<Vec<u8>> {
        Ok(self.value.to_le_bytes().to_vec())
    }

    fn snapshot(&self) -> Option<Vec<u8>> {
        if self.snapshots_disabled {
            None
        } else {
            Some(self.value.to_le_bytes().to_vec())
        }
    }

    fn restore(&mut self, state: &[u8]) -> StateMachineResult<()> {
        self.value = Self::decode(state).ok_or_else(|| {
            StateMachineError::RestoreFailed(format!("expected 8 bytes, got {}", state.len()))
        })?;
        Ok(())
    }
}
