//! Group log writer with fsync enforcement
//!
//! - Append-only, single file per group
//! - Every append is followed by fsync
//! - Indexes are strictly consecutive starting at 1
//!
//! An entry is never reported as appended before fsync returns.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::errors::{LogError, LogResult};
use super::reader::LogReader;
use crate::consensus::{LogEntry, LogIndex};

/// Directory under the group directory holding the log file
pub const LOG_DIR: &str = "log";

/// Log file name
pub const LOG_FILE: &str = "raft.log";

/// Returns the log file path for a group directory.
pub fn log_path(group_dir: &Path) -> PathBuf {
    group_dir.join(LOG_DIR).join(LOG_FILE)
}

/// Append-only writer for one group's log.
pub struct LogWriter {
    /// Path to the log file
    log_path: PathBuf,
    /// Underlying file handle
    file: File,
    /// Next index to assign (starts at 1, never reused)
    next_index: LogIndex,
}

impl LogWriter {
    /// Opens or creates the log under `<group_dir>/log/raft.log`.
    ///
    /// Scans any existing content to find the next index; a corrupted tail
    /// is reported rather than truncated.
    pub fn open(group_dir: &Path) -> LogResult<Self> {
        let log_path = log_path(group_dir);
        if let Some(dir) = log_path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                LogError::append_failed(
                    format!("Failed to create log directory: {}", dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                LogError::append_failed(
                    format!("Failed to open log file: {}", log_path.display()),
                    e,
                )
            })?;

        let next_index = Self::determine_next_index(&log_path)?;

        Ok(Self {
            log_path,
            file,
            next_index,
        })
    }

    fn determine_next_index(log_path: &Path) -> LogResult<LogIndex> {
        match fs::metadata(log_path) {
            Ok(m) if m.len() == 0 => return Ok(LogIndex::new(1)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LogIndex::new(1)),
            Err(e) => {
                return Err(LogError::append_failed("Failed to read log metadata", e));
            }
        }

        let mut reader = LogReader::open(log_path)?;
        while reader.read_next()?.is_some() {}
        Ok(reader.last_index().next())
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the index the next append will receive.
    pub fn next_index(&self) -> LogIndex {
        self.next_index
    }

    /// Returns the last persisted index, or zero for an empty log.
    pub fn last_index(&self) -> LogIndex {
        LogIndex::new(self.next_index.value() - 1)
    }

    /// Appends a payload, assigning the next index.
    pub fn append(&mut self, payload: Vec<u8>) -> LogResult<LogIndex> {
        let entry = LogEntry::new(self.next_index, payload);
        self.write_entry(&entry)?;
        Ok(entry.index)
    }

    fn write_entry(&mut self, entry: &LogEntry) -> LogResult<()> {
        let serialized = entry.serialize();

        self.file.write_all(&serialized).map_err(|e| {
            LogError::append_failed(
                format!("Failed to write log record at index {}", entry.index),
                e,
            )
        })?;

        self.file.sync_all().map_err(|e| {
            LogError::fsync_failed(
                format!("fsync failed after log append at index {}", entry.index),
                e,
            )
        })?;

        self.next_index = self.next_index.next();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_index_is_one() {
        let temp = TempDir::new().unwrap();
        let mut writer = LogWriter::open(temp.path()).unwrap();
        assert_eq!(writer.last_index(), LogIndex::ZERO);
        assert_eq!(writer.append(b"a".to_vec()).unwrap(), LogIndex::new(1));
        assert_eq!(writer.append(b"b".to_vec()).unwrap(), LogIndex::new(2));
        assert_eq!(writer.last_index(), LogIndex::new(2));
    }

    #[test]
    fn test_reopen_continues_sequence() {
        let temp = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(temp.path()).unwrap();
            for _ in 0..5 {
                writer.append(b"inc".to_vec()).unwrap();
            }
        }
        let mut writer = LogWriter::open(temp.path()).unwrap();
        assert_eq!(writer.next_index(), LogIndex::new(6));
        assert_eq!(writer.append(b"inc".to_vec()).unwrap(), LogIndex::new(6));
    }

    #[test]
    fn test_log_path_layout() {
        let temp = TempDir::new().unwrap();
        let writer = LogWriter::open(temp.path()).unwrap();
        assert_eq!(writer.path(), temp.path().join("log").join("raft.log"));
        assert!(writer.path().exists());
    }
}
