//! Snapshot error types
//!
//! Error codes:
//! - TSC_SNAPSHOT_IO_FAILED (ERROR severity)
//! - TSC_SNAPSHOT_MANIFEST (ERROR severity)
//! - TSC_SNAPSHOT_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for snapshot errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, group continues
    Error,
    /// The group cannot restore from this snapshot and must not start
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Snapshot-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotErrorCode {
    /// I/O failure while writing or reading a snapshot
    TscSnapshotIoFailed,
    /// Manifest generation, write or parse failure
    TscSnapshotManifest,
    /// Snapshot blob does not match its manifest checksum
    TscSnapshotCorruption,
}

impl SnapshotErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SnapshotErrorCode::TscSnapshotIoFailed => "TSC_SNAPSHOT_IO_FAILED",
            SnapshotErrorCode::TscSnapshotManifest => "TSC_SNAPSHOT_MANIFEST",
            SnapshotErrorCode::TscSnapshotCorruption => "TSC_SNAPSHOT_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SnapshotErrorCode::TscSnapshotIoFailed => Severity::Error,
            SnapshotErrorCode::TscSnapshotManifest => Severity::Error,
            SnapshotErrorCode::TscSnapshotCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for SnapshotErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot error with code, message and optional context
#[derive(Debug)]
pub struct SnapshotError {
    code: SnapshotErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl SnapshotError {
    /// Create a snapshot I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::TscSnapshotIoFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a snapshot I/O error with path context
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::TscSnapshotIoFailed,
            message: format!("I/O error at path: {}", path.display()),
            details: None,
            source: Some(source),
        }
    }

    /// Create a manifest error
    pub fn manifest_error(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::TscSnapshotManifest,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a manifest error with IO source
    pub fn manifest_io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::TscSnapshotManifest,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a checksum mismatch error
    pub fn corruption(expected: &str, actual: &str) -> Self {
        Self {
            code: SnapshotErrorCode::TscSnapshotCorruption,
            message: "snapshot checksum mismatch".to_string(),
            details: Some(format!("expected: {}, actual: {}", expected, actual)),
            source: None,
        }
    }

    /// Add details to an error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn code(&self) -> SnapshotErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the group must refuse to start
    pub fn is_fatal(&self) -> bool {
        self.code.severity() == Severity::Fatal
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SnapshotErrorCode::TscSnapshotIoFailed.code(), "TSC_SNAPSHOT_IO_FAILED");
        assert_eq!(SnapshotErrorCode::TscSnapshotManifest.code(), "TSC_SNAPSHOT_MANIFEST");
        assert_eq!(SnapshotErrorCode::TscSnapshotCorruption.code(), "TSC_SNAPSHOT_CORRUPTION");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        let err = SnapshotError::io_error("io failed", io::Error::new(io::ErrorKind::Other, "x"));
        assert!(!err.is_fatal());
        assert!(!SnapshotError::manifest_error("bad").is_fatal());
        assert!(SnapshotError::corruption("crc32:00000001", "crc32:00000002").is_fatal());
    }

    #[test]
    fn test_error_display_contains_required_fields() {
        let err = SnapshotError::manifest_error("manifest unreadable").with_details("group-3");
        let display = format!("{}", err);
        assert!(display.contains("TSC_SNAPSHOT_MANIFEST"));
        assert!(display.contains("ERROR"));
        assert!(display.contains("manifest unreadable"));
        assert!(display.contains("group-3"));
    }

    #[test]
    fn test_io_error_with_path() {
        let path = std::path::Path::new("/data/group-1/snapshot/state-10.bin");
        let err = SnapshotError::io_error_at_path(
            path,
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.message().contains("state-10.bin"));
        assert_eq!(err.code(), SnapshotErrorCode::TscSnapshotIoFailed);
    }
}
