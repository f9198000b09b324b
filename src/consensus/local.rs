//! In-process consensus engine.
//!
//! A single-node stand-in for the external Raft engine: every group keeps a
//! persisted log on local disk, an append by the local leader commits
//! immediately, and leadership is driven explicitly through
//! [`LocalConsensus::campaign`], [`LocalConsensus::follow`] and
//! [`LocalConsensus::step_down`] (or by an optional election timer).
//!
//! After `open_group`, including a restart, a group has no leader until
//! one is elected, which is exactly the window in which a recovering
//! replica must refuse reads.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::engine::{ConsensusEngine, ConsensusListener};
use super::errors::{ConsensusError, ConsensusResult};
use super::types::{ConsensusGroupId, LeadershipStatus, LogEntry, LogIndex, NodeId, Peer};
use crate::log::{log_path, LogReader, LogWriter};
use crate::observability::{log_event_with_fields, Event};

/// Members file kept next to the group log
pub const MEMBERS_FILE: &str = "members.json";

/// Persisted group metadata (`<data_dir>/<group>/members.json`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMetadata {
    pub group_id: ConsensusGroupId,
    pub members: Vec<Peer>,
    /// RFC3339 creation timestamp
    pub created_at: String,
}

impl GroupMetadata {
    fn load(path: &Path, group: ConsensusGroupId) -> ConsensusResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| ConsensusError::Metadata {
            group,
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&json).map_err(|e| ConsensusError::Metadata {
            group,
            reason: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    fn store(&self, path: &Path) -> ConsensusResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ConsensusError::Metadata {
            group: self.group_id,
            reason: format!("failed to serialize members: {}", e),
        })?;
        fs::write(path, json).map_err(|e| ConsensusError::Metadata {
            group: self.group_id,
            reason: format!("failed to write {}: {}", path.display(), e),
        })
    }
}

struct LocalGroup {
    id: ConsensusGroupId,
    dir: PathBuf,
    members: Vec<Peer>,
    inner: Mutex<LocalGroupInner>,
    /// Log reader kept open between `entries` calls.
    cursor: Mutex<Option<LogReader>>,
    /// Serializes notification delivery so listeners observe events in order.
    notify: Mutex<()>,
}

struct LocalGroupInner {
    writer: LogWriter,
    commit_index: LogIndex,
    leadership: LeadershipStatus,
    listeners: Vec<Arc<dyn ConsensusListener>>,
    closed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocalGroup {
    fn set_leadership(&self, status: LeadershipStatus) {
        let _order = lock(&self.notify);
        let listeners = {
            let mut inner = lock(&self.inner);
            if inner.closed || inner.leadership == status {
                return;
            }
            inner.leadership = status;
            inner.listeners.clone()
        };

        let status_str = status.to_string();
        log_event_with_fields(
            Event::LeadershipChanged,
            &[("group", &self.id.to_string()), ("status", &status_str)],
        );

        for listener in listeners {
            listener.on_leadership_change(self.id, status);
        }
    }
}

/// Single-process consensus engine backed by one log file per group.
pub struct LocalConsensus {
    node_id: NodeId,
    data_dir: PathBuf,
    election_delay: Option<Duration>,
    groups: RwLock<HashMap<ConsensusGroupId, Arc<LocalGroup>>>,
}

impl LocalConsensus {
    /// Creates an engine rooted at `data_dir`.
    pub fn new(node_id: NodeId, data_dir: impl AsRef<Path>) -> Self {
        Self {
            node_id,
            data_dir: data_dir.as_ref().to_path_buf(),
            election_delay: None,
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Elects the local node automatically `delay` after each group opens.
    pub fn with_election_delay(mut self, delay: Option<Duration>) -> Self {
        self.election_delay = delay;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding a group's persisted state.
    pub fn group_dir(&self, group: ConsensusGroupId) -> PathBuf {
        self.data_dir.join(group.dir_name())
    }

    fn group(&self, group: ConsensusGroupId) -> ConsensusResult<Arc<LocalGroup>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group)
            .cloned()
            .ok_or(ConsensusError::GroupNotFound(group))
    }

    /// Makes the local node the leader of `group`.
    pub fn campaign(&self, group: ConsensusGroupId) -> ConsensusResult<()> {
        self.group(group)?.set_leadership(LeadershipStatus::SelfLeader);
        Ok(())
    }

    /// Records `leader` as the confirmed remote leader of `group`.
    pub fn follow(&self, group: ConsensusGroupId, leader: NodeId) -> ConsensusResult<()> {
        let peer = Peer::new(leader, group);
        self.group(group)?
            .set_leadership(LeadershipStatus::LeaderKnown(peer));
        Ok(())
    }

    /// Drops leadership; the group has no leader until the next election.
    pub fn step_down(&self, group: ConsensusGroupId) -> ConsensusResult<()> {
        self.group(group)?.set_leadership(LeadershipStatus::NoLeader);
        Ok(())
    }

    fn schedule_election(&self, group: &Arc<LocalGroup>) {
        let Some(delay) = self.election_delay else {
            return;
        };
        let group = Arc::clone(group);
        thread::spawn(move || {
            thread::sleep(delay);
            group.set_leadership(LeadershipStatus::SelfLeader);
        });
    }
}

impl ConsensusEngine for LocalConsensus {
    fn open_group(&self, group: ConsensusGroupId, members: &[Peer]) -> ConsensusResult<()> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        if groups.contains_key(&group) {
            return Err(ConsensusError::GroupAlreadyOpen(group));
        }

        let dir = self.group_dir(group);
        fs::create_dir_all(&dir).map_err(|e| ConsensusError::Metadata {
            group,
            reason: format!("failed to create {}: {}", dir.display(), e),
        })?;

        let members_path = dir.join(MEMBERS_FILE);
        let members = if members_path.exists() {
            GroupMetadata::load(&members_path, group)?.members
        } else {
            let metadata = GroupMetadata {
                group_id: group,
                members: members.to_vec(),
                created_at: chrono::Utc::now().to_rfc3339(),
            };
            metadata.store(&members_path)?;
            metadata.members
        };

        let writer = LogWriter::open(&dir)?;
        // Every persisted entry was committed before it was written.
        let commit_index = writer.last_index();

        let local = Arc::new(LocalGroup {
            id: group,
            dir,
            members,
            inner: Mutex::new(LocalGroupInner {
                writer,
                commit_index,
                leadership: LeadershipStatus::NoLeader,
                listeners: Vec::new(),
                closed: false,
            }),
            cursor: Mutex::new(None),
            notify: Mutex::new(()),
        });

        log_event_with_fields(
            Event::GroupOpened,
            &[
                ("commit_index", &commit_index.to_string()),
                ("group", &group.to_string()),
                ("members", &local.members.len().to_string()),
            ],
        );

        self.schedule_election(&local);
        groups.insert(group, local);
        Ok(())
    }

    fn close_group(&self, group: ConsensusGroupId) -> ConsensusResult<()> {
        let local = self
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&group)
            .ok_or(ConsensusError::GroupNotFound(group))?;

        let _order = lock(&local.notify);
        let mut inner = lock(&local.inner);
        inner.closed = true;
        inner.leadership = LeadershipStatus::NoLeader;
        inner.listeners.clear();
        Ok(())
    }

    fn has_persisted_state(&self, group: ConsensusGroupId) -> bool {
        log_path(&self.group_dir(group)).exists()
    }

    fn persisted_groups(&self) -> ConsensusResult<Vec<(ConsensusGroupId, Vec<Peer>)>> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ConsensusError::Metadata {
                    group: ConsensusGroupId::new(0),
                    reason: format!("failed to list {}: {}", self.data_dir.display(), e),
                })
            }
        };

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(group) = name.to_str().and_then(ConsensusGroupId::from_dir_name) else {
                continue;
            };
            let members_path = entry.path().join(MEMBERS_FILE);
            if !members_path.exists() {
                continue;
            }
            let metadata = GroupMetadata::load(&members_path, group)?;
            found.push((group, metadata.members));
        }
        found.sort_by_key(|(group, _)| *group);
        Ok(found)
    }

    fn append(&self, group: ConsensusGroupId, payload: Vec<u8>) -> ConsensusResult<LogIndex> {
        let local = self.group(group)?;
        let _order = lock(&local.notify);

        let (index, listeners) = {
            let mut inner = lock(&local.inner);
            match inner.leadership {
                LeadershipStatus::SelfLeader => {}
                LeadershipStatus::LeaderKnown(peer) => {
                    return Err(ConsensusError::NotLeader {
                        group,
                        leader: Some(peer),
                    })
                }
                LeadershipStatus::NoLeader => {
                    return Err(ConsensusError::NotLeader {
                        group,
                        leader: None,
                    })
                }
            }
            let index = inner.writer.append(payload)?;
            inner.commit_index = index;
            (index, inner.listeners.clone())
        };

        for listener in listeners {
            listener.on_commit(group, index);
        }
        Ok(index)
    }

    fn commit_index(&self, group: ConsensusGroupId) -> ConsensusResult<LogIndex> {
        let local = self.group(group)?;
        let inner = lock(&local.inner);
        Ok(inner.commit_index)
    }

    fn leadership_status(&self, group: ConsensusGroupId) -> ConsensusResult<LeadershipStatus> {
        let local = self.group(group)?;
        let inner = lock(&local.inner);
        Ok(inner.leadership)
    }

    fn members(&self, group: ConsensusGroupId) -> ConsensusResult<Vec<Peer>> {
        Ok(self.group(group)?.members.clone())
    }

    fn entries(
        &self,
        group: ConsensusGroupId,
        from: LogIndex,
        to: LogIndex,
    ) -> ConsensusResult<Vec<LogEntry>> {
        let local = self.group(group)?;
        let commit_index = lock(&local.inner).commit_index;
        let to = to.min(commit_index);
        if from > to {
            return Ok(Vec::new());
        }

        let mut cursor = lock(&local.cursor);
        let reader = match cursor.take() {
            Some(reader) => reader,
            None => LogReader::open_from_group_dir(&local.dir)?,
        };
        let reader = cursor.insert(reader);
        let result = reader.read_range(from, to);
        if result.is_err() {
            *cursor = None;
        }
        Ok(result?)
    }

    fn register_listener(
        &self,
        group: ConsensusGroupId,
        listener: Arc<dyn ConsensusListener>,
    ) -> ConsensusResult<()> {
        let local = self.group(group)?;
        lock(&local.inner).listeners.push(listener);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn gid() -> ConsensusGroupId {
        ConsensusGroupId::new(1)
    }

    fn members() -> Vec<Peer> {
        vec![Peer::new(NodeId(1), gid()), Peer::new(NodeId(2), gid())]
    }

    #[derive(Default)]
    struct Recorder {
        commit: AtomicU64,
        changes: Mutex<Vec<LeadershipStatus>>,
    }

    impl ConsensusListener for Recorder {
        fn on_commit(&self, _group: ConsensusGroupId, commit_index: LogIndex) {
            self.commit.store(commit_index.value(), Ordering::SeqCst);
        }

        fn on_leadership_change(&self, _group: ConsensusGroupId, status: LeadershipStatus) {
            self.changes.lock().unwrap().push(status);
        }
    }

    #[test]
    fn test_append_requires_leadership() {
        let temp = TempDir::new().unwrap();
        let engine = LocalConsensus::new(NodeId(1), temp.path());
        engine.open_group(gid(), &members()).unwrap();

        let err = engine.append(gid(), b"inc".to_vec()).unwrap_err();
        assert!(matches!(err, ConsensusError::NotLeader { leader: None, .. }));

        engine.follow(gid(), NodeId(2)).unwrap();
        let err = engine.append(gid(), b"inc".to_vec()).unwrap_err();
        assert!(matches!(err, ConsensusError::NotLeader { leader: Some(_), .. }));
        assert!(err.is_retryable());

        engine.campaign(gid()).unwrap();
        assert_eq!(engine.append(gid(), b"inc".to_vec()).unwrap(), LogIndex::new(1));
        assert_eq!(engine.commit_index(gid()).unwrap(), LogIndex::new(1));
    }

    #[test]
    fn test_listener_sees_commits_and_leadership() {
        let temp = TempDir::new().unwrap();
        let engine = LocalConsensus::new(NodeId(1), temp.path());
        engine.open_group(gid(), &members()).unwrap();
        let recorder = Arc::new(Recorder::default());
        engine.register_listener(gid(), recorder.clone()).unwrap();

        engine.campaign(gid()).unwrap();
        engine.append(gid(), b"a".to_vec()).unwrap();
        engine.append(gid(), b"b".to_vec()).unwrap();
        engine.step_down(gid()).unwrap();

        assert_eq!(recorder.commit.load(Ordering::SeqCst), 2);
        assert_eq!(
            *recorder.changes.lock().unwrap(),
            vec![LeadershipStatus::SelfLeader, LeadershipStatus::NoLeader]
        );
    }

    #[test]
    fn test_reopen_restores_commit_index_without_leader() {
        let temp = TempDir::new().unwrap();
        {
            let engine = LocalConsensus::new(NodeId(1), temp.path());
            engine.open_group(gid(), &members()).unwrap();
            engine.campaign(gid()).unwrap();
            for _ in 0..10 {
                engine.append(gid(), b"inc".to_vec()).unwrap();
            }
            engine.close_group(gid()).unwrap();
        }

        let engine = LocalConsensus::new(NodeId(1), temp.path());
        assert!(engine.has_persisted_state(gid()));
        let persisted = engine.persisted_groups().unwrap();
        assert_eq!(persisted, vec![(gid(), members())]);

        engine.open_group(gid(), &[]).unwrap();
        assert_eq!(engine.commit_index(gid()).unwrap(), LogIndex::new(10));
        assert_eq!(
            engine.leadership_status(gid()).unwrap(),
            LeadershipStatus::NoLeader
        );

        let entries = engine
            .entries(gid(), LogIndex::new(9), LogIndex::new(20))
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].index, LogIndex::new(10));
    }

    #[test]
    fn test_entries_reuse_one_reader() {
        let temp = TempDir::new().unwrap();
        let engine = LocalConsensus::new(NodeId(1), temp.path());
        engine.open_group(gid(), &members()).unwrap();
        engine.campaign(gid()).unwrap();
        for _ in 0..3 {
            engine.append(gid(), b"inc".to_vec()).unwrap();
        }

        let first = engine.entries(gid(), LogIndex::new(1), LogIndex::new(3)).unwrap();
        assert_eq!(first.len(), 3);
        engine.append(gid(), b"inc".to_vec()).unwrap();
        engine.append(gid(), b"inc".to_vec()).unwrap();

        let next = engine.entries(gid(), LogIndex::new(4), LogIndex::new(5)).unwrap();
        let indexes: Vec<u64> = next.iter().map(|e| e.index.value()).collect();
        assert_eq!(indexes, vec![4, 5]);

        let local = engine.group(gid()).unwrap();
        let log_len = fs::metadata(log_path(&local.dir)).unwrap().len();
        {
            let cursor = lock(&local.cursor);
            let reader = cursor.as_ref().unwrap();
            assert_eq!(reader.last_index(), LogIndex::new(5));
            assert_eq!(reader.current_offset(), log_len);
        }

        // Going back still works.
        let again = engine.entries(gid(), LogIndex::new(2), LogIndex::new(2)).unwrap();
        assert_eq!(again[0].index, LogIndex::new(2));
    }

    #[test]
    fn test_members_come_from_persisted_metadata() {
        let temp = TempDir::new().unwrap();
        {
            let engine = LocalConsensus::new(NodeId(1), temp.path());
            engine.open_group(gid(), &members()).unwrap();
            assert_eq!(engine.members(gid()).unwrap(), members());
            engine.close_group(gid()).unwrap();
        }

        let engine = LocalConsensus::new(NodeId(1), temp.path());
        engine
            .open_group(gid(), &[Peer::new(NodeId(1), gid())])
            .unwrap();
        assert_eq!(engine.members(gid()).unwrap(), members());
        assert!(matches!(
            engine.members(ConsensusGroupId::new(9)),
            Err(ConsensusError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_open_twice_rejected() {
        let temp = TempDir::new().unwrap();
        let engine = LocalConsensus::new(NodeId(1), temp.path());
        engine.open_group(gid(), &members()).unwrap();
        assert!(matches!(
            engine.open_group(gid(), &members()),
            Err(ConsensusError::GroupAlreadyOpen(_))
        ));
    }

    #[test]
    fn test_election_delay_elects_self() {
        let temp = TempDir::new().unwrap();
        let engine = LocalConsensus::new(NodeId(1), temp.path())
            .with_election_delay(Some(Duration::from_millis(10)));
        engine.open_group(gid(), &members()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.leadership_status(gid()).unwrap() != LeadershipStatus::SelfLeader {
            assert!(std::time::Instant::now() < deadline, "election never happened");
            thread::sleep(Duration::from_millis(5));
        }
    }
}
