//! CLI command implementations

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;
use crate::consensus::{ConsensusEngine, ConsensusGroupId, LocalConsensus, LogIndex, Peer};
use crate::group::{GroupManager, GroupStatus};
use crate::log::scan_last_index;
use crate::observability::{log_event, log_event_with_fields, Event, MetricsSnapshot};
use crate::snapshot::{SnapshotManifest, MANIFEST_FILE, SNAPSHOT_DIR};
use crate::statemachine::{IntegerCounter, StateMachine, StateMachineProvider};

use super::args::{Cli, Command, LogFormat};
use super::errors::{CliError, CliResult};

/// How long the demo's first post-restart read may wait
const GATED_READ_WINDOW: Duration = Duration::from_millis(50);

/// Installs the tracing subscriber. Logs go to stderr; `RUST_LOG` overrides
/// the default filter.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tsconsensus=info,warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Parse arguments, install logging and run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_format);
    log_event(Event::NodeStart);
    let result = run_command(cli.command);
    log_event(Event::NodeStop);
    result
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config, data_dir } => init(&config, &data_dir),
        Command::Demo {
            config,
            writes,
            group,
        } => demo(&config, writes, ConsensusGroupId::new(group)),
        Command::Inspect { config } => inspect(&config),
    }
}

fn load_config(path: &Path) -> CliResult<NodeConfig> {
    let config = NodeConfig::load(path)?;
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("data_dir", &config.data_dir), ("node_id", &config.node_id.to_string())],
    );
    Ok(config)
}

fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
    stdout.flush()?;
    Ok(())
}

/// Writes a default configuration and creates the data directory.
///
/// Refuses to overwrite an existing configuration file.
pub fn init(config_path: &Path, data_dir: &str) -> CliResult<()> {
    if config_path.exists() {
        return Err(CliError::already_initialized(config_path));
    }
    let config = NodeConfig::new(data_dir);
    config.validate()?;
    fs::create_dir_all(config.data_path())?;
    config.save(config_path)?;
    Ok(())
}

/// One node's engine and group manager, as opened by the demo.
struct DemoNode {
    engine: Arc<LocalConsensus>,
    manager: GroupManager,
}

impl DemoNode {
    fn open(config: &NodeConfig, stall: Option<Duration>) -> CliResult<Self> {
        let engine = Arc::new(
            LocalConsensus::new(config.node(), config.data_path())
                .with_election_delay(config.election_delay()),
        );
        let provider: StateMachineProvider =
            Arc::new(move |_: ConsensusGroupId| -> Box<dyn StateMachine> {
                match stall {
                    Some(stall) => Box::new(IntegerCounter::new().with_stall(stall)),
                    None => Box::new(IntegerCounter::new()),
                }
            });
        let manager = GroupManager::new(config.group_config(), engine.clone(), provider);
        manager.start()?;
        Ok(Self { engine, manager })
    }

    /// Elects the local node unless the engine elects on its own.
    fn ensure_leader(&self, config: &NodeConfig, group: ConsensusGroupId) -> CliResult<()> {
        if config.election_delay().is_none() {
            self.engine.campaign(group)?;
        }
        self.manager
            .wait_for_leader(group, Duration::from_millis(config.read_timeout_ms))?;
        Ok(())
    }

    fn read_counter(&self, group: ConsensusGroupId, deadline: Instant) -> CliResult<i64> {
        let bytes = self.manager.read(group, &[], deadline)?;
        IntegerCounter::decode(&bytes)
            .ok_or_else(|| CliError::group_error("counter returned a malformed value"))
    }
}

/// Report printed by `demo`.
#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub group: ConsensusGroupId,
    pub writes: u64,
    pub last_index: LogIndex,
    pub value_before_restart: i64,
    /// Outcome of a read issued right after restart, before any election
    pub read_during_recovery: String,
    pub value_after_restart: i64,
    pub status_after_restart: GroupStatus,
    pub metrics: MetricsSnapshot,
}

/// Writes `writes` increments, restarts the node with the configured apply
/// stall, and reads the counter through the gateway.
pub fn demo_report(config: &NodeConfig, writes: u64, group: ConsensusGroupId) -> CliResult<DemoReport> {
    let group_config = config.group_config();

    let (last_index, value_before_restart) = {
        let node = DemoNode::open(config, None)?;
        if !node.manager.groups().contains(&group) {
            node.manager
                .create_local_peer(group, &[Peer::new(config.node(), group)])?;
        }
        node.ensure_leader(config, group)?;

        let mut last_index = LogIndex::ZERO;
        for _ in 0..writes {
            let status = node.manager.write(
                group,
                IntegerCounter::increment_payload(),
                group_config.write_deadline(),
            )?;
            last_index = status.index;
        }
        let value = node.read_counter(group, group_config.read_deadline())?;
        (last_index, value)
    };

    let node = DemoNode::open(config, config.apply_stall())?;
    let read_during_recovery = match node.read_counter(group, Instant::now() + GATED_READ_WINDOW) {
        Ok(value) => format!("value {}", value),
        Err(e) => format!("rejected: {}", e),
    };
    node.ensure_leader(config, group)?;
    let value_after_restart = node.read_counter(group, group_config.read_deadline())?;

    Ok(DemoReport {
        group,
        writes,
        last_index,
        value_before_restart,
        read_during_recovery,
        value_after_restart,
        status_after_restart: node.manager.group_status(group)?,
        metrics: node.manager.metrics(),
    })
}

/// Runs the demo and prints its JSON report.
pub fn demo(config_path: &Path, writes: u64, group: ConsensusGroupId) -> CliResult<()> {
    let config = load_config(config_path)?;
    let report = demo_report(&config, writes, group)?;
    write_json(&report)
}

/// Persisted state of one group, as printed by `inspect`.
#[derive(Debug, Serialize)]
pub struct GroupReport {
    pub group: ConsensusGroupId,
    pub members: Vec<Peer>,
    pub log_last_index: LogIndex,
    pub snapshot: Option<SnapshotManifest>,
}

/// Reads persisted group state without starting any group.
pub fn inspect_report(config: &NodeConfig) -> CliResult<Vec<GroupReport>> {
    let engine = LocalConsensus::new(config.node(), config.data_path());
    let group_config = config.group_config();

    let mut reports = Vec::new();
    for (group, members) in engine.persisted_groups()? {
        let dir = group_config.group_dir(group);
        let manifest_path = dir.join(SNAPSHOT_DIR).join(MANIFEST_FILE);
        let snapshot = if manifest_path.exists() {
            Some(SnapshotManifest::read_from_file(&manifest_path)?)
        } else {
            None
        };
        reports.push(GroupReport {
            group,
            members,
            log_last_index: scan_last_index(&dir)?,
            snapshot,
        });
    }
    Ok(reports)
}

/// Prints persisted group state as JSON.
pub fn inspect(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    write_json(&inspect_report(&config)?)
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> NodeConfig {
        let mut config = NodeConfig::new(temp.path().join("data").to_string_lossy());
        config.read_timeout_ms = 5_000;
        config.write_timeout_ms = 5_000;
        config
    }

    #[test]
    fn test_init_writes_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("tsconsensus.json");
        let data_dir = temp.path().join("data");

        init(&config_path, &data_dir.to_string_lossy()).unwrap();

        assert!(data_dir.is_dir());
        let loaded = NodeConfig::load(&config_path).unwrap();
        assert_eq!(loaded.data_path(), data_dir.as_path());
    }

    #[test]
    fn test_init_refuses_reinit() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("tsconsensus.json");
        let data_dir = temp.path().join("data").to_string_lossy().into_owned();
        init(&config_path, &data_dir).unwrap();

        let err = init(&config_path, &data_dir).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::AlreadyInitialized);
    }

    #[test]
    fn test_demo_gates_read_during_recovery() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.apply_stall_ms = 2;

        let report = demo_report(&config, 5, ConsensusGroupId::new(1)).unwrap();

        assert_eq!(report.value_before_restart, 5);
        assert_eq!(report.value_after_restart, 5);
        assert!(report.read_during_recovery.starts_with("rejected"));
        assert_eq!(report.metrics.entries_replayed, 5);
    }

    #[test]
    fn test_inspect_lists_persisted_groups() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.snapshot_interval = Some(2);
        demo_report(&config, 3, ConsensusGroupId::new(4)).unwrap();

        let reports = inspect_report(&config).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].group, ConsensusGroupId::new(4));
        assert_eq!(reports[0].log_last_index, LogIndex::new(3));
        let snapshot = reports[0].snapshot.as_ref().unwrap();
        assert_eq!(snapshot.last_included_index, LogIndex::new(2));
    }

    #[test]
    fn test_inspect_empty_data_dir() {
        let temp = TempDir::new().unwrap();
        assert!(inspect_report(&config(&temp)).unwrap().is_empty());
    }
}
