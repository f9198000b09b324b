//! Group manager
//!
//! Creates, restarts and stops the local peers of consensus groups, and is
//! the caller-facing entry point for writes and linearizable reads.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::config::GroupConfig;
use super::errors::{GroupError, GroupResult};
use super::replica::GroupReplica;
use crate::consensus::{
    ConsensusEngine, ConsensusError, ConsensusGroupId, LeadershipStatus, LogIndex, Peer,
};
use crate::gateway::{ReadError, ReadResult};
use crate::observability::{
    log_event_with_fields, Event, MetricsRegistry, MetricsSnapshot,
};
use crate::recovery::{AppliedWait, RecoveryState};
use crate::snapshot::SnapshotHandle;
use crate::statemachine::StateMachineProvider;

/// Acknowledgement of a write applied on the local replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteStatus {
    pub group: ConsensusGroupId,
    pub index: LogIndex,
}

/// Point-in-time view of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    pub group: ConsensusGroupId,
    pub members: Vec<Peer>,
    pub recovery: RecoveryState,
    pub applied_index: LogIndex,
    pub commit_index: LogIndex,
    pub leadership: LeadershipStatus,
    pub pending_reads: usize,
    pub halted_at: Option<LogIndex>,
    pub restored_from: Option<LogIndex>,
}

pub struct GroupManager {
    config: GroupConfig,
    engine: Arc<dyn ConsensusEngine>,
    provider: StateMachineProvider,
    groups: RwLock<HashMap<ConsensusGroupId, Arc<GroupReplica>>>,
    metrics: Arc<MetricsRegistry>,
}

impl GroupManager {
    pub fn new(
        config: GroupConfig,
        engine: Arc<dyn ConsensusEngine>,
        provider: StateMachineProvider,
    ) -> Self {
        Self {
            config,
            engine,
            provider,
            groups: RwLock::new(HashMap::new()),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    fn read_groups(&self) -> RwLockReadGuard<'_, HashMap<ConsensusGroupId, Arc<GroupReplica>>> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_groups(&self) -> RwLockWriteGuard<'_, HashMap<ConsensusGroupId, Arc<GroupReplica>>> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn replica(&self, group: ConsensusGroupId) -> GroupResult<Arc<GroupReplica>> {
        self.read_groups()
            .get(&group)
            .cloned()
            .ok_or(GroupError::GroupNotFound(group))
    }

    fn open_replica(&self, group: ConsensusGroupId, members: &[Peer]) -> GroupResult<GroupReplica> {
        GroupReplica::open(
            group,
            members,
            &self.engine,
            (self.provider)(group),
            &self.config,
            &self.metrics,
        )
    }

    /// Restarts every group with persisted state on this node.
    ///
    /// Returns the groups started. Groups already running are skipped.
    pub fn start(&self) -> GroupResult<Vec<ConsensusGroupId>> {
        let mut started = Vec::new();
        for (group, members) in self.engine.persisted_groups()? {
            let mut groups = self.write_groups();
            if groups.contains_key(&group) {
                continue;
            }
            let replica = self.open_replica(group, &members)?;
            log_event_with_fields(
                Event::GroupCreated,
                &[
                    ("group", &group.to_string()),
                    ("members", &members.len().to_string()),
                    ("restarted", "true"),
                ],
            );
            groups.insert(group, Arc::new(replica));
            started.push(group);
        }
        Ok(started)
    }

    /// Creates the local peer of `group`.
    ///
    /// Runs the restart sequence when the group has persisted state.
    /// Fails with `AlreadyExists` if the local peer is already running.
    pub fn create_local_peer(&self, group: ConsensusGroupId, members: &[Peer]) -> GroupResult<()> {
        let mut groups = self.write_groups();
        if groups.contains_key(&group) {
            return Err(GroupError::AlreadyExists(group));
        }

        let restarted = self.engine.has_persisted_state(group);
        let replica = self.open_replica(group, members)?;
        log_event_with_fields(
            Event::GroupCreated,
            &[
                ("group", &group.to_string()),
                ("members", &replica.members.len().to_string()),
                ("restarted", if restarted { "true" } else { "false" }),
            ],
        );
        groups.insert(group, Arc::new(replica));
        Ok(())
    }

    /// Proposes `request` and waits until it is applied locally.
    pub fn write(
        &self,
        group: ConsensusGroupId,
        request: Vec<u8>,
        deadline: Instant,
    ) -> GroupResult<WriteStatus> {
        let replica = self.replica(group)?;
        let index = match self.engine.append(group, request) {
            Ok(index) => index,
            Err(ConsensusError::NotLeader { group, leader }) => {
                self.metrics.increment_writes_rejected();
                log_event_with_fields(
                    Event::WriteRejected,
                    &[("group", &group.to_string()), ("reason", "not_leader")],
                );
                return Err(GroupError::NotLeader { group, leader });
            }
            Err(ConsensusError::GroupNotFound(group)) => return Err(GroupError::GroupNotFound(group)),
            Err(e) => return Err(e.into()),
        };

        match replica.coordinator.wait_applied(index, deadline) {
            AppliedWait::Reached => {
                self.metrics.increment_writes_applied();
                Ok(WriteStatus { group, index })
            }
            AppliedWait::TimedOut { applied } => Err(GroupError::WriteTimeout {
                group,
                index,
                applied,
            }),
            AppliedWait::Halted(failed_index) => Err(GroupError::GroupUnavailable {
                group,
                failed_index,
            }),
            AppliedWait::Closed => Err(GroupError::Stopped(group)),
        }
    }

    /// Linearizable read through the group's gateway.
    pub fn read(
        &self,
        group: ConsensusGroupId,
        request: &[u8],
        deadline: Instant,
    ) -> ReadResult<Vec<u8>> {
        let replica = self
            .replica(group)
            .map_err(|_| ReadError::GroupNotFound(group))?;
        replica.gateway.read(request, deadline)
    }

    /// Blocks until the group has a confirmed leader.
    pub fn wait_for_leader(
        &self,
        group: ConsensusGroupId,
        timeout: Duration,
    ) -> GroupResult<LeadershipStatus> {
        let replica = self.replica(group)?;
        replica
            .coordinator
            .wait_for_leader(Instant::now() + timeout)
            .ok_or(GroupError::NoLeaderAvailable(group))
    }

    /// Blocks until the group finished replay and has a leader.
    pub fn wait_ready(&self, group: ConsensusGroupId, timeout: Duration) -> GroupResult<bool> {
        let replica = self.replica(group)?;
        Ok(replica.coordinator.wait_ready(Instant::now() + timeout))
    }

    /// Stops the local peer. Persisted state stays on disk.
    pub fn stop(&self, group: ConsensusGroupId) -> GroupResult<()> {
        let replica = self
            .write_groups()
            .remove(&group)
            .ok_or(GroupError::GroupNotFound(group))?;
        replica.shutdown(&self.engine);
        log_event_with_fields(Event::GroupStopped, &[("group", &group.to_string())]);
        Ok(())
    }

    /// Stops every running group.
    pub fn shutdown(&self) {
        let replicas: Vec<_> = self.write_groups().drain().collect();
        for (group, replica) in replicas {
            replica.shutdown(&self.engine);
            log_event_with_fields(Event::GroupStopped, &[("group", &group.to_string())]);
        }
    }

    /// Stops the group if running and deletes its persisted state.
    pub fn remove_group(&self, group: ConsensusGroupId) -> GroupResult<()> {
        let running = match self.stop(group) {
            Ok(()) => true,
            Err(GroupError::GroupNotFound(_)) => false,
            Err(e) => return Err(e),
        };

        let dir = self.config.group_dir(group);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        } else if !running {
            return Err(GroupError::GroupNotFound(group));
        }

        log_event_with_fields(Event::GroupRemoved, &[("group", &group.to_string())]);
        Ok(())
    }

    /// Takes a snapshot now. `None` when the state machine has snapshots
    /// disabled or nothing is applied yet.
    pub fn take_snapshot(&self, group: ConsensusGroupId) -> GroupResult<Option<SnapshotHandle>> {
        let replica = self.replica(group)?;
        let handle = replica.adapter.snapshot()?;
        if handle.is_some() {
            self.metrics.increment_snapshots_taken();
        }
        Ok(handle)
    }

    pub fn group_status(&self, group: ConsensusGroupId) -> GroupResult<GroupStatus> {
        let replica = self.replica(group)?;
        let (recovery, _) = replica.coordinator.current_state();
        Ok(GroupStatus {
            group,
            members: replica.members.clone(),
            recovery,
            applied_index: replica.adapter.applied_index(),
            commit_index: self.engine.commit_index(group)?,
            leadership: replica.coordinator.leadership(),
            pending_reads: replica.coordinator.pending_reads(),
            halted_at: replica.adapter.halted_at(),
            restored_from: replica.restored_from,
        })
    }

    /// Applied index of the local replica.
    ///
    /// Diagnostic only: this is local progress, not a linearizable read.
    pub fn applied_index(&self, group: ConsensusGroupId) -> GroupResult<LogIndex> {
        Ok(self.replica(group)?.adapter.applied_index())
    }

    /// Running groups, in id order.
    pub fn groups(&self) -> Vec<ConsensusGroupId> {
        let mut groups: Vec<_> = self.read_groups().keys().copied().collect();
        groups.sort();
        groups
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for GroupManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{LocalConsensus, NodeId};
    use crate::statemachine::{IntegerCounter, StateMachine};
    use tempfile::TempDir;

    fn gid() -> ConsensusGroupId {
        ConsensusGroupId::new(1)
    }

    fn manager(temp: &TempDir) -> (Arc<LocalConsensus>, GroupManager) {
        let engine = Arc::new(LocalConsensus::new(NodeId(1), temp.path()));
        let provider: StateMachineProvider =
            Arc::new(|_: ConsensusGroupId| -> Box<dyn StateMachine> { Box::new(IntegerCounter::new()) });
        let manager = GroupManager::new(GroupConfig::new(temp.path()), engine.clone(), provider);
        (engine, manager)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_create_twice_already_exists() {
        let temp = TempDir::new().unwrap();
        let (_engine, manager) = manager(&temp);
        let members = [Peer::new(NodeId(1), gid())];

        manager.create_local_peer(gid(), &members).unwrap();
        assert!(matches!(
            manager.create_local_peer(gid(), &members),
            Err(GroupError::AlreadyExists(_))
        ));
        assert_eq!(manager.groups(), vec![gid()]);
    }

    #[test]
    fn test_write_requires_leader() {
        let temp = TempDir::new().unwrap();
        let (engine, manager) = manager(&temp);
        manager.create_local_peer(gid(), &[]).unwrap();

        assert!(matches!(
            manager.write(gid(), Vec::new(), deadline()),
            Err(GroupError::NotLeader { leader: None, .. })
        ));

        engine.campaign(gid()).unwrap();
        let status = manager.write(gid(), Vec::new(), deadline()).unwrap();
        assert_eq!(status.index, LogIndex::new(1));
        assert_eq!(manager.applied_index(gid()).unwrap(), LogIndex::new(1));
    }

    #[test]
    fn test_status_reports_progress() {
        let temp = TempDir::new().unwrap();
        let (engine, manager) = manager(&temp);
        manager.create_local_peer(gid(), &[]).unwrap();
        engine.campaign(gid()).unwrap();
        for _ in 0..3 {
            manager.write(gid(), Vec::new(), deadline()).unwrap();
        }

        let status = manager.group_status(gid()).unwrap();
        assert_eq!(status.recovery, RecoveryState::Ready);
        assert_eq!(status.applied_index, LogIndex::new(3));
        assert_eq!(status.commit_index, LogIndex::new(3));
        assert_eq!(status.leadership, LeadershipStatus::SelfLeader);
        assert_eq!(status.pending_reads, 0);
    }

    #[test]
    fn test_stop_and_remove() {
        let temp = TempDir::new().unwrap();
        let (_engine, manager) = manager(&temp);
        manager.create_local_peer(gid(), &[]).unwrap();

        manager.stop(gid()).unwrap();
        assert!(matches!(manager.stop(gid()), Err(GroupError::GroupNotFound(_))));
        assert!(temp.path().join("group-1").exists());

        manager.remove_group(gid()).unwrap();
        assert!(!temp.path().join("group-1").exists());
        assert!(matches!(
            manager.remove_group(gid()),
            Err(GroupError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_restart_keeps_persisted_members() {
        let temp = TempDir::new().unwrap();
        let (_engine, manager) = manager(&temp);
        let original = vec![Peer::new(NodeId(1), gid()), Peer::new(NodeId(2), gid())];
        manager.create_local_peer(gid(), &original).unwrap();
        manager.stop(gid()).unwrap();

        manager
            .create_local_peer(gid(), &[Peer::new(NodeId(1), gid())])
            .unwrap();
        assert_eq!(manager.group_status(gid()).unwrap().members, original);
    }

    #[test]
    fn test_read_unknown_group() {
        let temp = TempDir::new().unwrap();
        let (_engine, manager) = manager(&temp);
        assert!(matches!(
            manager.read(gid(), &[], deadline()),
            Err(ReadError::GroupNotFound(_))
        ));
    }
}
