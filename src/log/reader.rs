//! Group log reader with strict corruption detection
//!
//! - Corruption halts the read, no skipping, no repair
//! - Indexes must start at 1 and be strictly consecutive
//! - Reading is sequential and single-threaded

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::errors::{LogError, LogResult};
use super::record::RECORD_OVERHEAD;
use super::writer::log_path;
use crate::consensus::{LogEntry, LogIndex};

/// Sequential reader over one group's log.
pub struct LogReader {
    log_path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    last_index: LogIndex,
}

impl LogReader {
    /// Opens a log file for reading.
    pub fn open(log_path: &Path) -> LogResult<Self> {
        let file = File::open(log_path).map_err(|e| {
            LogError::corruption(format!(
                "Failed to open log file: {}: {}",
                log_path.display(),
                e
            ))
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| LogError::corruption(format!("Failed to read log metadata: {}", e)))?
            .len();

        Ok(Self {
            log_path: log_path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            last_index: LogIndex::ZERO,
        })
    }

    /// Opens the log of a group directory (`<group_dir>/log/raft.log`).
    pub fn open_from_group_dir(group_dir: &Path) -> LogResult<Self> {
        Self::open(&log_path(group_dir))
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the current byte offset.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Returns the last successfully read index.
    pub fn last_index(&self) -> LogIndex {
        self.last_index
    }

    /// Reads the next entry.
    ///
    /// - `Ok(Some(entry))` on success
    /// - `Ok(None)` at a clean end of file
    /// - `Err` on checksum failure, truncation or an index gap
    pub fn read_next(&mut self) -> LogResult<Option<LogEntry>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < RECORD_OVERHEAD as u64 {
            return Err(LogError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Truncated log: {} bytes remaining, minimum record size is {}",
                    remaining, RECORD_OVERHEAD
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            LogError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record length: {}", e),
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < RECORD_OVERHEAD as u64 || record_length > remaining {
            return Err(LogError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Invalid record length {} with {} bytes remaining",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            LogError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record body: {}", e),
            )
        })?;

        let (entry, consumed) = LogEntry::deserialize(&record_buf)
            .map_err(|e| LogError::corruption_at_offset(self.current_offset, e.to_string()))?;

        let expected = self.last_index.next();
        if entry.index != expected {
            return Err(LogError::index_gap(expected.value(), entry.index.value()));
        }

        self.current_offset += consumed as u64;
        self.last_index = entry.index;

        Ok(Some(entry))
    }

    /// Reads every remaining entry.
    pub fn read_all(&mut self) -> LogResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_next()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Reads the entries with `from <= index <= to`.
    ///
    /// Continues from the current position when `from` lies ahead of it, so
    /// a caller following the log with increasing ranges reads each record
    /// once. A range at or behind the position rescans from the start. Never
    /// reads past `to`.
    pub fn read_range(&mut self, from: LogIndex, to: LogIndex) -> LogResult<Vec<LogEntry>> {
        if from <= self.last_index {
            self.reset()?;
        }
        self.refresh_size()?;

        let mut entries = Vec::new();
        while self.last_index < to {
            match self.read_next()? {
                Some(entry) if entry.index >= from => entries.push(entry),
                Some(_) => {}
                None => break,
            }
        }
        Ok(entries)
    }

    // Picks up records appended since the reader was opened.
    fn refresh_size(&mut self) -> LogResult<()> {
        self.file_size = self
            .reader
            .get_ref()
            .metadata()
            .map_err(|e| LogError::corruption(format!("Failed to read log metadata: {}", e)))?
            .len();
        Ok(())
    }

    /// Resets the reader to the beginning of the log.
    pub fn reset(&mut self) -> LogResult<()> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| LogError::corruption(format!("Failed to seek to start of log: {}", e)))?;
        self.current_offset = 0;
        self.last_index = LogIndex::ZERO;
        Ok(())
    }

    /// Returns whether unread bytes remain.
    pub fn has_more(&self) -> bool {
        self.current_offset < self.file_size
    }
}

/// Scans a group's log and returns its last index (zero when absent).
pub fn scan_last_index(group_dir: &Path) -> LogResult<LogIndex> {
    let path = log_path(group_dir);
    match std::fs::metadata(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LogIndex::ZERO),
        Err(e) => return Err(LogError::corruption(format!("Failed to stat log: {}", e))),
    }
    let mut reader = LogReader::open(&path)?;
    while reader.read_next()?.is_some() {}
    Ok(reader.last_index())
}
