//! Node configuration
//!
//! Loaded from a JSON file. Only `data_dir` is required:
//!
//! ```json
//! {
//!   "node_id": 1,
//!   "data_dir": "./data",
//!   "read_timeout_ms": 10000,
//!   "write_timeout_ms": 10000,
//!   "snapshot_interval": 1000,
//!   "election_delay_ms": 200,
//!   "apply_stall_ms": 0
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::NodeId;
use crate::group::GroupConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Local node identifier
    #[serde(default = "default_node_id")]
    pub node_id: u32,

    /// Root of all persisted group state (required)
    pub data_dir: String,

    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Applied entries between automatic snapshots (`None` = on demand only)
    #[serde(default)]
    pub snapshot_interval: Option<u64>,

    /// Self-election delay for the in-process engine (`None` = manual)
    #[serde(default)]
    pub election_delay_ms: Option<u64>,

    /// Per-apply stall of the demo counter
    #[serde(default)]
    pub apply_stall_ms: u64,
}

fn default_node_id() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl NodeConfig {
    /// Defaults for a fresh node rooted at `data_dir`.
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            node_id: default_node_id(),
            data_dir: data_dir.into(),
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
            snapshot_interval: None,
            election_delay_ms: None,
            apply_stall_ms: 0,
        }
    }

    /// Loads and validates configuration from a file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be > 0".into()));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("write_timeout_ms must be > 0".into()));
        }
        if self.snapshot_interval == Some(0) {
            return Err(ConfigError::Invalid(
                "snapshot_interval must be > 0 (omit it to disable)".into(),
            ));
        }
        Ok(())
    }

    pub fn node(&self) -> NodeId {
        NodeId(self.node_id)
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    pub fn election_delay(&self) -> Option<Duration> {
        self.election_delay_ms.map(Duration::from_millis)
    }

    pub fn apply_stall(&self) -> Option<Duration> {
        (self.apply_stall_ms > 0).then(|| Duration::from_millis(self.apply_stall_ms))
    }

    /// Per-group settings used by the group manager.
    pub fn group_config(&self) -> GroupConfig {
        GroupConfig::new(self.data_path())
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_write_timeout(Duration::from_millis(self.write_timeout_ms))
            .with_snapshot_interval(self.snapshot_interval)
    }
}
