//! Single-node harness for the integration tests
//!
//! A node is an in-process consensus engine plus a group manager over one
//! data directory. Restarting drops both and opens fresh ones over the
//! same directory, optionally with a different state machine provider.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tsconsensus::consensus::{ConsensusGroupId, LocalConsensus, LogIndex, NodeId, Peer};
use tsconsensus::gateway::ReadResult;
use tsconsensus::group::{GroupConfig, GroupManager};
use tsconsensus::statemachine::{IntegerCounter, StateMachine, StateMachineProvider};

pub const LOCAL_NODE: NodeId = NodeId(1);
pub const WAIT: Duration = Duration::from_secs(5);

pub fn gid(id: u32) -> ConsensusGroupId {
    ConsensusGroupId::new(id)
}

/// Provider building a fresh counter per group with `make`.
pub fn provider<F>(make: F) -> StateMachineProvider
where
    F: Fn(ConsensusGroupId) -> IntegerCounter + Send + Sync + 'static,
{
    Arc::new(move |group: ConsensusGroupId| -> Box<dyn StateMachine> { Box::new(make(group)) })
}

pub fn counter_provider() -> StateMachineProvider {
    provider(|_| IntegerCounter::new())
}

/// Counters that sleep `stall` per entry and never snapshot, forcing a
/// slow full replay.
pub fn stalled_provider(stall: Duration) -> StateMachineProvider {
    provider(move |_| IntegerCounter::new().with_stall(stall).without_snapshots())
}

pub fn group_config(dir: &Path) -> GroupConfig {
    GroupConfig::new(dir)
        .with_read_timeout(WAIT)
        .with_write_timeout(WAIT)
}

pub struct Node {
    pub dir: PathBuf,
    pub config: GroupConfig,
    pub engine: Arc<LocalConsensus>,
    pub manager: GroupManager,
}

impl Node {
    /// Opens a node and restarts every persisted group.
    pub fn open(dir: &Path, config: GroupConfig, provider: StateMachineProvider) -> Node {
        let engine = Arc::new(LocalConsensus::new(LOCAL_NODE, dir));
        let manager = GroupManager::new(config.clone(), engine.clone(), provider);
        manager.start().expect("restart persisted groups");
        Node {
            dir: dir.to_path_buf(),
            config,
            engine,
            manager,
        }
    }

    /// Drops this node and opens a new one over the same directory.
    pub fn restart(self, provider: StateMachineProvider) -> Node {
        let dir = self.dir.clone();
        let config = self.config.clone();
        drop(self);
        Node::open(&dir, config, provider)
    }

    pub fn create(&self, group: ConsensusGroupId) {
        self.manager
            .create_local_peer(group, &[Peer::new(LOCAL_NODE, group)])
            .expect("create group");
    }

    /// Elects the local node and waits until the group observed it.
    pub fn elect(&self, group: ConsensusGroupId) {
        self.engine.campaign(group).expect("campaign");
        self.manager
            .wait_for_leader(group, WAIT)
            .expect("leader confirmed");
    }

    /// Writes `count` increments serially; returns the last index.
    pub fn write_increments(&self, group: ConsensusGroupId, count: u64) -> LogIndex {
        let mut last = LogIndex::ZERO;
        for _ in 0..count {
            last = self
                .manager
                .write(group, IntegerCounter::increment_payload(), Instant::now() + WAIT)
                .expect("write applied")
                .index;
        }
        last
    }

    pub fn read_value(&self, group: ConsensusGroupId, deadline: Instant) -> ReadResult<i64> {
        let bytes = self.manager.read(group, &[], deadline)?;
        Ok(IntegerCounter::decode(&bytes).expect("counter value"))
    }

    pub fn read_now(&self, group: ConsensusGroupId) -> ReadResult<i64> {
        self.read_value(group, Instant::now() + WAIT)
    }
}

/// Creates `group`, elects the local node and writes `writes` increments.
pub fn seeded_node(dir: &Path, config: GroupConfig, group: ConsensusGroupId, writes: u64) -> Node {
    let node = Node::open(dir, config, counter_provider());
    node.create(group);
    node.elect(group);
    node.write_increments(group, writes);
    node
}
