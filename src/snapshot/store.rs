//! Per-group snapshot store
//!
//! Layout under `<group_dir>/snapshot/`:
//!
//! - `state-<index>.bin`: opaque state machine blob
//! - `manifest.json`: points at the current blob
//!
//! Save sequence:
//! 1. write `state-<index>.bin.tmp`, fsync, rename
//! 2. write manifest via temp file, fsync, rename (commit point)
//! 3. fsync the snapshot directory
//! 4. delete blobs no longer referenced by the manifest
//!
//! A crash before step 2 leaves the previous snapshot intact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::errors::{SnapshotError, SnapshotResult};
use super::manifest::SnapshotManifest;
use crate::consensus::LogIndex;
use crate::log::{compute_checksum, format_checksum};

/// Snapshot directory name inside a group directory
pub const SNAPSHOT_DIR: &str = "snapshot";

/// Manifest file name inside the snapshot directory
pub const MANIFEST_FILE: &str = "manifest.json";

fn state_file_name(index: LogIndex) -> String {
    format!("state-{}.bin", index)
}

fn fsync_dir(path: &Path) -> SnapshotResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| SnapshotError::io_error_at_path(path, e))?;

    dir.sync_all().map_err(|e| {
        SnapshotError::io_error(format!("fsync directory failed: {}", path.display()), e)
    })
}

/// A durable snapshot: its manifest and the location of its blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    manifest: SnapshotManifest,
    state_path: PathBuf,
}

impl SnapshotHandle {
    pub fn manifest(&self) -> &SnapshotManifest {
        &self.manifest
    }

    /// Highest log index contained in the snapshot.
    pub fn last_included_index(&self) -> LogIndex {
        self.manifest.last_included_index
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Reads the blob and verifies it against the manifest checksum.
    pub fn read_state(&self) -> SnapshotResult<Vec<u8>> {
        let bytes = fs::read(&self.state_path)
            .map_err(|e| SnapshotError::io_error_at_path(&self.state_path, e))?;
        let actual = format_checksum(compute_checksum(&bytes));
        if actual != self.manifest.checksum {
            return Err(SnapshotError::corruption(&self.manifest.checksum, &actual)
                .with_details(format!("path: {}", self.state_path.display())));
        }
        Ok(bytes)
    }
}

/// Reads and writes the snapshot of one consensus group.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Opens the store under `group_dir`, creating the directory if needed.
    pub fn open(group_dir: &Path) -> SnapshotResult<Self> {
        let dir = group_dir.join(SNAPSHOT_DIR);
        fs::create_dir_all(&dir).map_err(|e| SnapshotError::io_error_at_path(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Durably stores `state` as the snapshot covering `last_included_index`.
    pub fn save(&self, last_included_index: LogIndex, state: &[u8]) -> SnapshotResult<SnapshotHandle> {
        let file_name = state_file_name(last_included_index);
        let state_path = self.dir.join(&file_name);
        let tmp_path = self.dir.join(format!("{}.tmp", file_name));

        let mut file = File::create(&tmp_path)
            .map_err(|e| SnapshotError::io_error_at_path(&tmp_path, e))?;
        file.write_all(state)
            .map_err(|e| SnapshotError::io_error_at_path(&tmp_path, e))?;
        file.sync_all().map_err(|e| {
            SnapshotError::io_error(format!("fsync failed: {}", tmp_path.display()), e)
        })?;
        drop(file);
        fs::rename(&tmp_path, &state_path)
            .map_err(|e| SnapshotError::io_error_at_path(&state_path, e))?;

        let manifest = SnapshotManifest::new(
            last_included_index,
            Utc::now().to_rfc3339(),
            file_name.clone(),
            format_checksum(compute_checksum(state)),
            state.len() as u64,
        );
        manifest.write_to_file(&self.manifest_path())?;
        fsync_dir(&self.dir)?;

        self.remove_stale_blobs(&file_name);

        Ok(SnapshotHandle {
            manifest,
            state_path,
        })
    }

    // Best effort: a leftover blob is never referenced again.
    fn remove_stale_blobs(&self, keep: &str) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with("state-") && name != keep {
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    /// Returns the current snapshot, if any, with its blob verified.
    ///
    /// A manifest whose blob is missing or fails its checksum is an error:
    /// restoring from it would silently lose applied entries.
    pub fn latest(&self) -> SnapshotResult<Option<SnapshotHandle>> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }
        let manifest = SnapshotManifest::read_from_file(&manifest_path)?;
        let handle = SnapshotHandle {
            state_path: self.dir.join(&manifest.state_file),
            manifest,
        };
        handle.read_state()?;
        Ok(Some(handle))
    }
}
