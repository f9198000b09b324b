//! CLI-specific error types
//!
//! Every CLI error terminates the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::consensus::ConsensusError;
use crate::gateway::ReadError;
use crate::group::GroupError;
use crate::log::LogError;
use crate::snapshot::SnapshotError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (filesystem, stdout)
    IoError,
    /// Configuration file already exists
    AlreadyInitialized,
    /// A group operation failed
    GroupError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "TSC_CLI_CONFIG_ERROR",
            Self::IoError => "TSC_CLI_IO_ERROR",
            Self::AlreadyInitialized => "TSC_CLI_ALREADY_INITIALIZED",
            Self::GroupError => "TSC_CLI_GROUP_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn group_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::GroupError, msg)
    }

    pub fn already_initialized(path: &std::path::Path) -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            format!("Configuration already exists: {}", path.display()),
        )
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<GroupError> for CliError {
    fn from(e: GroupError) -> Self {
        Self::group_error(e.to_string())
    }
}

impl From<ReadError> for CliError {
    fn from(e: ReadError) -> Self {
        Self::group_error(e.to_string())
    }
}

impl From<ConsensusError> for CliError {
    fn from(e: ConsensusError) -> Self {
        Self::group_error(e.to_string())
    }
}

impl From<LogError> for CliError {
    fn from(e: LogError) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<SnapshotError> for CliError {
    fn from(e: SnapshotError) -> Self {
        Self::io_error(e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
