//! Per-group settings

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::consensus::ConsensusGroupId;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    /// Root directory; each group lives in `<data_dir>/group-<id>/`
    pub data_dir: PathBuf,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Applied entries between automatic snapshots; `None` = on demand only
    pub snapshot_interval: Option<u64>,
}

impl GroupConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            snapshot_interval: None,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Option<u64>) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn group_dir(&self, group: ConsensusGroupId) -> PathBuf {
        self.data_dir.join(group.dir_name())
    }

    /// Deadline for a read issued now.
    pub fn read_deadline(&self) -> Instant {
        Instant::now() + self.read_timeout
    }

    /// Deadline for a write issued now.
    pub fn write_deadline(&self) -> Instant {
        Instant::now() + self.write_timeout
    }
}
