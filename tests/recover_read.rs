//! Reads across restart
//!
//! A group is written, stopped and restarted with a stalled full replay.
//! Reads issued while the replay runs must either be rejected or block
//! until the replay covers everything committed before the read arrived.
//! They never observe a partially replayed counter.

mod common;

use std::time::{Duration, Instant};

use common::{counter_provider, gid, group_config, seeded_node, stalled_provider, Node, WAIT};
use tempfile::TempDir;
use tsconsensus::consensus::{ConsensusEngine, LogIndex};
use tsconsensus::gateway::ReadError;
use tsconsensus::recovery::RecoveryState;

const STALL: Duration = Duration::from_millis(20);

// =============================================================================
// No restart
// =============================================================================

#[test]
fn test_fast_path_read_after_writes() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 10);

    assert_eq!(node.read_now(group).unwrap(), 10);

    let metrics = node.manager.metrics();
    assert_eq!(metrics.writes_applied, 10);
    assert_eq!(metrics.reads_fast_path, 1);
    assert_eq!(metrics.reads_queued, 0);
}

#[test]
fn test_read_after_each_write_sees_it() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 0);

    for expected in 1..=20 {
        node.write_increments(group, 1);
        assert_eq!(node.read_now(group).unwrap(), expected);
    }
}

// =============================================================================
// Restart with stalled replay
// =============================================================================

/// A read issued right after restart is gated: rejected, or the full value.
#[test]
fn test_read_during_replay_never_sees_partial_state() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 10);

    let node = node.restart(stalled_provider(STALL));
    let result = node.read_value(group, Instant::now() + Duration::from_millis(50));

    match result {
        Ok(value) => assert_eq!(value, 10, "read exposed partially replayed state"),
        Err(ReadError::NoLeaderAvailable(g)) => assert_eq!(g, group),
        Err(other) => panic!("unexpected read error: {other}"),
    }
}

#[test]
fn test_read_before_leader_is_rejected() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 10);

    let node = node.restart(stalled_provider(STALL));
    let started = Instant::now();
    let err = node.read_now(group).unwrap_err();

    assert!(matches!(err, ReadError::NoLeaderAvailable(_)));
    assert!(err.is_retryable());
    // Rejection does not wait for the deadline.
    assert!(started.elapsed() < WAIT);
    assert_eq!(node.manager.metrics().reads_rejected_no_leader, 1);
}

#[test]
fn test_read_blocks_until_replay_reaches_read_index() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 10);

    let node = node.restart(stalled_provider(Duration::from_millis(50)));
    node.elect(group);

    let before = node.manager.applied_index(group).unwrap();
    assert!(before < LogIndex::new(10), "replay finished before the read");
    assert_eq!(node.read_now(group).unwrap(), 10);
    assert_eq!(node.manager.applied_index(group).unwrap(), LogIndex::new(10));

    let metrics = node.manager.metrics();
    assert_eq!(metrics.entries_replayed, 10);
    assert_eq!(metrics.reads_queued, 1);
    assert_eq!(metrics.reads_fast_path, 0);
    assert_eq!(metrics.reads_released, 1);
}

#[test]
fn test_large_backlog_read_released_after_replay() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 50);

    let node = node.restart(stalled_provider(Duration::from_millis(5)));
    node.elect(group);

    let before = node.manager.applied_index(group).unwrap();
    assert!(before < LogIndex::new(50), "replay finished before the read");
    assert_eq!(node.read_now(group).unwrap(), 50);
    let status = node.manager.group_status(group).unwrap();
    assert_eq!(status.recovery, RecoveryState::Ready);
    assert_eq!(status.applied_index, LogIndex::new(50));
    assert_eq!(status.pending_reads, 0);

    let metrics = node.manager.metrics();
    assert_eq!(metrics.reads_queued, 1);
    assert_eq!(metrics.reads_fast_path, 0);
}

/// With no writes in between, repeated reads share a read index and agree.
#[test]
fn test_repeated_reads_after_ready_agree() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 12);

    let node = node.restart(stalled_provider(Duration::from_millis(2)));
    node.elect(group);
    assert!(node.manager.wait_ready(group, WAIT).unwrap());

    let commit = node.engine.commit_index(group).unwrap();
    let first = node.read_now(group).unwrap();
    let second = node.read_now(group).unwrap();
    assert_eq!(node.engine.commit_index(group).unwrap(), commit);

    assert_eq!(first, second);
    assert_eq!(first, 12);
    assert_eq!(node.manager.metrics().reads_fast_path, 2);
}

#[test]
fn test_full_replay_without_snapshots() {
    let temp = TempDir::new().unwrap();
    let group = gid(3);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 25);

    let node = node.restart(stalled_provider(Duration::from_millis(1)));
    node.elect(group);
    assert!(node.manager.wait_ready(group, WAIT).unwrap());

    let status = node.manager.group_status(group).unwrap();
    assert_eq!(status.restored_from, None);
    assert_eq!(status.applied_index, LogIndex::new(25));
    assert_eq!(node.manager.metrics().entries_replayed, 25);
    assert_eq!(node.read_now(group).unwrap(), 25);
}

#[test]
fn test_restart_from_snapshot_replays_only_tail() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let config = group_config(temp.path()).with_snapshot_interval(Some(4));
    let node = seeded_node(temp.path(), config, group, 10);
    assert_eq!(node.manager.metrics().snapshots_taken, 2);

    let node = node.restart(counter_provider());
    node.elect(group);
    assert_eq!(node.read_now(group).unwrap(), 10);

    let status = node.manager.group_status(group).unwrap();
    assert_eq!(status.restored_from, Some(LogIndex::new(8)));
    let metrics = node.manager.metrics();
    assert_eq!(metrics.snapshots_restored, 1);
    assert_eq!(metrics.entries_replayed, 2);
}

#[test]
fn test_on_demand_snapshot_survives_restart() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 6);

    let handle = node.manager.take_snapshot(group).unwrap().unwrap();
    assert_eq!(handle.last_included_index(), LogIndex::new(6));
    node.write_increments(group, 3);

    let node = node.restart(counter_provider());
    node.elect(group);
    assert_eq!(node.read_now(group).unwrap(), 9);
    assert_eq!(node.manager.metrics().entries_replayed, 3);
}

#[test]
fn test_writes_continue_after_recovery() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 5);

    let node = node.restart(stalled_provider(Duration::from_millis(2)));
    node.elect(group);
    let last = node.write_increments(group, 5);

    assert_eq!(last, LogIndex::new(10));
    assert_eq!(node.read_now(group).unwrap(), 10);
}

#[test]
fn test_restart_with_automatic_election() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = seeded_node(temp.path(), group_config(temp.path()), group, 10);
    let config = node.config.clone();
    drop(node);

    let engine = std::sync::Arc::new(
        tsconsensus::consensus::LocalConsensus::new(common::LOCAL_NODE, temp.path())
            .with_election_delay(Some(Duration::from_millis(30))),
    );
    let manager = tsconsensus::group::GroupManager::new(
        config,
        engine.clone(),
        stalled_provider(Duration::from_millis(5)),
    );
    assert_eq!(manager.start().unwrap(), vec![group]);

    assert!(manager.wait_ready(group, WAIT).unwrap());
    let bytes = manager.read(group, &[], Instant::now() + WAIT).unwrap();
    assert_eq!(tsconsensus::statemachine::IntegerCounter::decode(&bytes), Some(10));
}

#[test]
fn test_restart_of_empty_group() {
    let temp = TempDir::new().unwrap();
    let group = gid(1);
    let node = Node::open(temp.path(), group_config(temp.path()), counter_provider());
    node.create(group);

    let node = node.restart(counter_provider());
    assert_eq!(node.manager.groups(), vec![group]);
    node.elect(group);
    assert!(node.manager.wait_ready(group, WAIT).unwrap());
    assert_eq!(node.read_now(group).unwrap(), 0);
}
