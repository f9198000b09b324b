//! Group log error types
//!
//! Error codes:
//! - TSC_LOG_APPEND_FAILED (ERROR severity)
//! - TSC_LOG_FSYNC_FAILED (FATAL severity)
//! - TSC_LOG_CORRUPTION (FATAL severity)
//! - TSC_LOG_INDEX_GAP (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for log errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, group continues
    Error,
    /// Group must stop
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

/// Log-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogErrorCode {
    /// Write to the log file failed
    TscLogAppendFailed,
    /// fsync of the log file failed
    TscLogFsyncFailed,
    /// Checksum or structure failure while reading
    TscLogCorruption,
    /// Append or read would leave a hole in the index sequence
    TscLogIndexGap,
}

impl LogErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            LogErrorCode::TscLogAppendFailed => "TSC_LOG_APPEND_FAILED",
            LogErrorCode::TscLogFsyncFailed => "TSC_LOG_FSYNC_FAILED",
            LogErrorCode::TscLogCorruption => "TSC_LOG_CORRUPTION",
            LogErrorCode::TscLogIndexGap => "TSC_LOG_INDEX_GAP",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            LogErrorCode::TscLogAppendFailed => Severity::Error,
            LogErrorCode::TscLogFsyncFailed => Severity::Fatal,
            LogErrorCode::TscLogCorruption => Severity::Fatal,
            LogErrorCode::TscLogIndexGap => Severity::Fatal,
        }
    }
}

impl fmt::Display for LogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Log error with code, message and optional context
#[derive(Debug)]
pub struct LogError {
    code: LogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl LogError {
    /// Create a log append failed error
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LogErrorCode::TscLogAppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a log fsync failed error
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LogErrorCode::TscLogFsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a log corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::TscLogCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::TscLogCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create an index gap error
    pub fn index_gap(expected: u64, actual: u64) -> Self {
        Self {
            code: LogErrorCode::TscLogIndexGap,
            message: format!("expected log index {}, got {}", expected, actual),
            details: None,
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> LogErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal for the group
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for LogError {
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

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for log operations
pub type LogResult<T> = Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LogErrorCode::TscLogAppendFailed.code(), "TSC_LOG_APPEND_FAILED");
        assert_eq!(LogErrorCode::TscLogFsyncFailed.code(), "TSC_LOG_FSYNC_FAILED");
        assert_eq!(LogErrorCode::TscLogCorruption.code(), "TSC_LOG_CORRUPTION");
        assert_eq!(LogErrorCode::TscLogIndexGap.code(), "TSC_LOG_INDEX_GAP");
    }

    #[test]
    fn test_append_failed_is_not_fatal() {
        let err = LogError::append_failed(
            "write failed",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_corruption_and_gap_are_fatal() {
        assert!(LogError::corruption("checksum mismatch").is_fatal());
        assert!(LogError::index_gap(3, 5).is_fatal());
    }

    #[test]
    fn test_display_contains_context() {
        let err = LogError::corruption_at_offset(128, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("TSC_LOG_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("byte_offset: 128"));
    }
}
