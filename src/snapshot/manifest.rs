//! Snapshot manifest structure and serialization
//!
//! `manifest.json` is the authoritative snapshot descriptor. A snapshot
//! exists only once its manifest has been renamed into place.
//!
//! Format:
//! ```json
//! {
//!   "last_included_index": 10,
//!   "created_at": "2026-02-04T11:30:00Z",
//!   "state_file": "state-10.bin",
//!   "checksum": "crc32:deadbeef",
//!   "size_bytes": 8,
//!   "format_version": 1
//! }
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{SnapshotError, SnapshotResult};
use crate::consensus::LogIndex;

/// Current manifest format version
pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotManifest {
    /// Highest log index whose effect is contained in the state blob
    pub last_included_index: LogIndex,

    /// Creation timestamp (RFC3339)
    pub created_at: String,

    /// State blob file name, relative to the snapshot directory
    pub state_file: String,

    /// CRC32 of the state blob (`crc32:xxxxxxxx`)
    pub checksum: String,

    pub size_bytes: u64,

    pub format_version: u8,
}

impl SnapshotManifest {
    pub fn new(
        last_included_index: LogIndex,
        created_at: impl Into<String>,
        state_file: impl Into<String>,
        checksum: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            last_included_index,
            created_at: created_at.into(),
            state_file: state_file.into(),
            checksum: checksum.into(),
            size_bytes,
            format_version: FORMAT_VERSION,
        }
    }

    /// Serializes the manifest to pretty-printed JSON.
    pub fn to_json(&self) -> SnapshotResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            SnapshotError::manifest_error(format!("Failed to serialize manifest: {}", e))
        })
    }

    /// Deserializes a manifest from JSON, rejecting unknown format versions.
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let manifest: Self = serde_json::from_str(json).map_err(|e| {
            SnapshotError::manifest_error(format!("Failed to parse manifest: {}", e))
        })?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(SnapshotError::manifest_error(format!(
                "Unsupported manifest format version {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }

    /// Writes the manifest atomically: temp file, fsync, rename.
    pub fn write_to_file(&self, path: &Path) -> SnapshotResult<()> {
        let json = self.to_json()?;
        let tmp_path = path.with_extension("json.tmp");

        let mut file = File::create(&tmp_path).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to create manifest file: {}", tmp_path.display()),
                e,
            )
        })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to write manifest: {}", tmp_path.display()),
                e,
            )
        })?;

        file.sync_all().map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to fsync manifest: {}", tmp_path.display()),
                e,
            )
        })?;

        fs::rename(&tmp_path, path).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to publish manifest: {}", path.display()),
                e,
            )
        })
    }

    /// Reads a manifest from a file.
    pub fn read_from_file(path: &Path) -> SnapshotResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to read manifest: {}", path.display()),
                e,
            )
        })?;

        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> SnapshotManifest {
        SnapshotManifest::new(
            LogIndex::new(10),
            "2026-02-04T11:30:00Z",
            "state-10.bin",
            "crc32:deadbeef",
            8,
        )
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = sample().to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["last_included_index"], 10);
        assert_eq!(parsed["created_at"], "2026-02-04T11:30:00Z");
        assert_eq!(parsed["state_file"], "state-10.bin");
        assert_eq!(parsed["checksum"], "crc32:deadbeef");
        assert_eq!(parsed["format_version"], 1);
    }

    #[test]
    fn test_manifest_write_and_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("manifest.json");

        let original = sample();
        original.write_to_file(&manifest_path).unwrap();

        assert!(manifest_path.exists());
        assert!(!temp_dir.path().join("manifest.json.tmp").exists());
        assert_eq!(SnapshotManifest::read_from_file(&manifest_path).unwrap(), original);
    }

    #[test]
    fn test_manifest_rejects_unknown_version() {
        let mut manifest = sample();
        manifest.format_version = 9;
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(SnapshotManifest::from_json(&json).is_err());
    }

    #[test]
    fn test_manifest_invalid_json() {
        assert!(SnapshotManifest::from_json("not valid json").is_err());
    }

    #[test]
    fn test_manifest_missing_file() {
        let path = Path::new("/nonexistent/path/manifest.json");
        assert!(SnapshotManifest::read_from_file(path).is_err());
    }
}
