//! One running local peer: adapter, coordinator, gateway and apply thread.

use std::sync::Arc;

use super::config::GroupConfig;
use super::errors::{GroupError, GroupResult};
use crate::consensus::{
    ConsensusEngine, ConsensusError, ConsensusGroupId, ConsensusListener, LeadershipStatus,
    LogIndex, Peer,
};
use crate::gateway::ReadGateway;
use crate::observability::MetricsRegistry;
use crate::recovery::RecoveryCoordinator;
use crate::snapshot::SnapshotStore;
use crate::statemachine::{
    ApplyContext, ApplyDriver, ApplySignal, StateMachine, StateMachineAdapter, StateMachineError,
};

/// Routes engine notifications: commits to the apply thread, leadership
/// to the coordinator.
struct GroupListener {
    signal: Arc<ApplySignal>,
    coordinator: Arc<RecoveryCoordinator>,
}

impl ConsensusListener for GroupListener {
    fn on_commit(&self, _group: ConsensusGroupId, commit_index: LogIndex) {
        self.signal.notify_commit(commit_index);
    }

    fn on_leadership_change(&self, _group: ConsensusGroupId, status: LeadershipStatus) {
        self.coordinator.on_leadership_change(status);
    }
}

pub(crate) struct GroupReplica {
    pub(crate) id: ConsensusGroupId,
    pub(crate) members: Vec<Peer>,
    pub(crate) adapter: Arc<StateMachineAdapter>,
    pub(crate) coordinator: Arc<RecoveryCoordinator>,
    pub(crate) gateway: ReadGateway,
    driver: ApplyDriver,
    /// Snapshot restored at startup, if any
    pub(crate) restored_from: Option<LogIndex>,
}

impl GroupReplica {
    /// Binds the group in the engine and runs the startup sequence.
    ///
    /// For a group with persisted state this is the restart path: restore
    /// the latest snapshot, then replay the log tail up to the commit index.
    pub(crate) fn open(
        group: ConsensusGroupId,
        members: &[Peer],
        engine: &Arc<dyn ConsensusEngine>,
        machine: Box<dyn StateMachine>,
        config: &GroupConfig,
        metrics: &Arc<MetricsRegistry>,
    ) -> GroupResult<Self> {
        engine.open_group(group, members).map_err(|e| match e {
            ConsensusError::GroupAlreadyOpen(group) => GroupError::AlreadyExists(group),
            other => GroupError::Consensus(other),
        })?;

        let started = Self::start(group, engine, machine, config, metrics);
        if started.is_err() {
            let _ = engine.close_group(group);
        }
        started
    }

    fn start(
        group: ConsensusGroupId,
        engine: &Arc<dyn ConsensusEngine>,
        machine: Box<dyn StateMachine>,
        config: &GroupConfig,
        metrics: &Arc<MetricsRegistry>,
    ) -> GroupResult<Self> {
        // A restarted group keeps the members it was created with.
        let members = engine.members(group)?;
        let store = SnapshotStore::open(&config.group_dir(group))?;
        let adapter = Arc::new(StateMachineAdapter::new(group, machine, store));
        let coordinator = Arc::new(RecoveryCoordinator::new(group, Arc::clone(metrics)));
        let signal = Arc::new(ApplySignal::new());

        // Register before reading leadership so no change is missed.
        engine.register_listener(
            group,
            Arc::new(GroupListener {
                signal: Arc::clone(&signal),
                coordinator: Arc::clone(&coordinator),
            }),
        )?;
        coordinator.seed_leadership(engine.leadership_status(group)?);

        let snapshot = adapter.snapshot_store().latest()?;
        let resumed = adapter.restore(snapshot.as_ref())?;
        if snapshot.is_some() {
            metrics.increment_snapshots_restored();
        }

        let redo_target = engine.commit_index(group)?;
        if resumed > redo_target {
            return Err(GroupError::StateMachine(StateMachineError::RestoreFailed(
                format!(
                    "snapshot at {} is beyond commit index {}",
                    resumed, redo_target
                ),
            )));
        }
        coordinator.begin_recovery(resumed, redo_target)?;

        let driver = ApplyDriver::start(
            ApplyContext {
                group,
                engine: Arc::clone(engine),
                adapter: Arc::clone(&adapter),
                coordinator: Arc::clone(&coordinator),
                metrics: Arc::clone(metrics),
                snapshot_interval: config.snapshot_interval,
            },
            signal,
            redo_target,
        )?;

        let gateway = ReadGateway::new(
            group,
            Arc::clone(engine),
            Arc::clone(&adapter),
            Arc::clone(&coordinator),
            Arc::clone(metrics),
        );

        Ok(Self {
            id: group,
            members,
            adapter,
            coordinator,
            gateway,
            driver,
            restored_from: snapshot.map(|handle| handle.last_included_index()),
        })
    }

    /// Fails outstanding reads, unbinds the group and joins the apply thread.
    pub(crate) fn shutdown(&self, engine: &Arc<dyn ConsensusEngine>) {
        self.coordinator.close();
        // Flag shutdown first so the apply thread reads the unbound group as a stop.
        self.driver.signal().shutdown();
        let _ = engine.close_group(self.id);
        self.driver.stop();
    }
}
