//! Lock manager: owns one `GroupRecord` per paxos group of a topic, recovers
//! them at start, and serves checkpoint bookkeeping to the consensus layer.

mod group;
mod recovery;
mod observer;

use std::path::PathBuf;
use std::sync::Arc;

use crate::utils::{LocksmithError, SteadyClock, MonotonicClock};
use crate::lockdb::{LockDb, DEFAULT_COMPACT_THRESHOLD};

use tokio::task::JoinSet;

pub use group::GroupRecord;
pub use observer::{LockMgrObserver, NullObserver};

/// Topic ID type.
pub type TopicId = u32;

/// Paxos group index within a topic.
pub type GroupId = usize;

/// Consensus log position.
pub type InstanceId = u64;

/// The consensus layer's "no checkpoint" sentinel.
pub const NO_CHECKPOINT: InstanceId = u64::MAX;

/// Configuration parameters struct.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LockMgrConfig {
    /// Topic served by this manager.
    pub topic_id: TopicId,

    /// Number of paxos groups; fixed for the manager's lifetime.
    pub nr_group: usize,

    /// Recover groups as concurrent tasks instead of one by one.
    pub recover_concurrently: bool,

    /// Stale durable log frames tolerated before compacting on open.
    pub compact_threshold: usize,
}

impl Default for LockMgrConfig {
    fn default() -> Self {
        LockMgrConfig {
            topic_id: 0,
            nr_group: 1,
            recover_concurrently: false,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

impl LockMgrConfig {
    /// Composes a config from defaults overridden by an optional TOML
    /// string.
    pub fn parse(config_str: Option<&str>) -> Result<Self, LocksmithError> {
        parsed_config!(config_str => LockMgrConfig;
                       topic_id, nr_group, recover_concurrently,
                       compact_threshold)
    }
}

/// Logs and builds the error for a group id the manager does not own.
fn group_out_of_range(group_id: GroupId, nr_group: usize) -> LocksmithError {
    pf_error!("group id {} out of range (have {} groups)", group_id, nr_group);
    LocksmithError::config(format!(
        "group id {} out of range (have {} groups)",
        group_id, nr_group
    ))
}

/// Recovery and checkpoint core of one topic.
pub struct LockManager {
    config: LockMgrConfig,

    /// Steady clock used to restamp lease deadlines.
    clock: Arc<dyn SteadyClock>,

    /// Instrumentation hooks.
    observer: Arc<dyn LockMgrObserver>,

    /// One record per paxos group, indexed by group id; empty before `init`
    /// and after `dispose`.
    groups: Vec<GroupRecord>,
}

impl LockManager {
    /// Creates an uninitialized manager using the monotonic clock and no
    /// observer.
    pub fn new(config: LockMgrConfig) -> Self {
        LockManager {
            config,
            clock: Arc::new(MonotonicClock::new()),
            observer: Arc::new(NullObserver),
            groups: vec![],
        }
    }

    /// Replaces the clock used to restamp lease deadlines.
    pub fn with_clock(mut self, clock: Arc<dyn SteadyClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the instrumentation observer.
    pub fn with_observer(mut self, observer: Arc<dyn LockMgrObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn topic_id(&self) -> TopicId {
        self.config.topic_id
    }

    pub fn nr_group(&self) -> usize {
        self.config.nr_group
    }

    /// Directory of a group's durable store: `base_path` with the group id
    /// appended verbatim.
    pub fn group_dir(base_path: &str, group_id: GroupId) -> PathBuf {
        PathBuf::from(format!("{}{}", base_path, group_id))
    }

    /// Recovers every group from the durable stores under `base_path`.
    /// Either all groups come up or none do: on error the manager is left
    /// uninitialized.
    pub async fn init(&mut self, base_path: &str) -> Result<(), LocksmithError> {
        if !self.groups.is_empty() {
            pf_error!("topic {} init already done", self.config.topic_id);
            return Err(LocksmithError::config("init already done"));
        }
        if self.config.nr_group == 0 {
            pf_error!("topic {} invalid nr_group 0", self.config.topic_id);
            return Err(LocksmithError::config("invalid nr_group 0"));
        }

        let groups = if self.config.recover_concurrently {
            self.recover_concurrently(base_path).await?
        } else {
            self.recover_sequentially(base_path).await?
        };
        debug_assert_eq!(groups.len(), self.config.nr_group);
        self.groups = groups;

        pf_info!(
            "topic {} recovered {} groups from '{}'",
            self.config.topic_id,
            self.groups.len(),
            base_path
        );
        Ok(())
    }

    async fn recover_sequentially(
        &self,
        base_path: &str,
    ) -> Result<Vec<GroupRecord>, LocksmithError> {
        let mut groups = Vec::with_capacity(self.config.nr_group);
        for group_id in 0..self.config.nr_group {
            let dir = Self::group_dir(base_path, group_id);
            let group = GroupRecord::recover(
                self.config.topic_id,
                group_id,
                &dir,
                self.config.compact_threshold,
                self.clock.clone(),
                self.observer.clone(),
            )
            .await?;
            groups.push(group);
        }
        Ok(groups)
    }

    async fn recover_concurrently(
        &self,
        base_path: &str,
    ) -> Result<Vec<GroupRecord>, LocksmithError> {
        let mut join_set = JoinSet::new();
        for group_id in 0..self.config.nr_group {
            let dir = Self::group_dir(base_path, group_id);
            let topic_id = self.config.topic_id;
            let compact_threshold = self.config.compact_threshold;
            let clock = self.clock.clone();
            let observer = self.observer.clone();
            join_set.spawn(async move {
                let result = GroupRecord::recover(
                    topic_id,
                    group_id,
                    &dir,
                    compact_threshold,
                    clock,
                    observer,
                )
                .await;
                (group_id, result)
            });
        }

        // install results in group id order regardless of completion order
        let mut slots: Vec<Option<GroupRecord>> =
            (0..self.config.nr_group).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (group_id, result) = joined?;
            match result {
                Ok(group) => slots[group_id] = Some(group),
                Err(e) => {
                    join_set.abort_all();
                    return Err(e);
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(group_id, slot)| {
                slot.ok_or_else(|| {
                    LocksmithError::msg(format!(
                        "group {} missing after recovery",
                        group_id
                    ))
                })
            })
            .collect()
    }

    /// Closes every group's stores, continuing past failures. Returns the
    /// last error seen, or `Ok(())` if there was nothing to close.
    pub async fn dispose(&mut self) -> Result<(), LocksmithError> {
        let mut result = Ok(());
        for group in self.groups.iter_mut() {
            if let Err(e) = group.dispose().await {
                result = Err(e);
            }
        }
        self.groups.clear();
        result
    }

    /// Returns the record of a group; fails closed on unknown ids.
    pub fn group(&self, group_id: GroupId) -> Result<&GroupRecord, LocksmithError> {
        self.groups
            .get(group_id)
            .ok_or_else(|| group_out_of_range(group_id, self.groups.len()))
    }

    /// Returns the record of a group mutably; fails closed on unknown ids.
    pub fn group_mut(
        &mut self,
        group_id: GroupId,
    ) -> Result<&mut GroupRecord, LocksmithError> {
        let nr_group = self.groups.len();
        self.groups
            .get_mut(group_id)
            .ok_or_else(|| group_out_of_range(group_id, nr_group))
    }

    /// Reads a group's checkpoint marker; see
    /// `GroupRecord::read_checkpoint`.
    pub async fn read_checkpoint(
        &mut self,
        group_id: GroupId,
    ) -> Result<InstanceId, LocksmithError> {
        self.group_mut(group_id)?.read_checkpoint().await
    }

    /// Sets and persists a group's checkpoint; see
    /// `GroupRecord::write_checkpoint`.
    pub async fn write_checkpoint(
        &mut self,
        group_id: GroupId,
        checkpoint: InstanceId,
    ) -> Result<(), LocksmithError> {
        self.group_mut(group_id)?.write_checkpoint(checkpoint).await
    }

    /// Reads a group's restart checkpoint marker.
    pub async fn read_restart_checkpoint(
        &mut self,
        group_id: GroupId,
    ) -> Result<InstanceId, LocksmithError> {
        self.group_mut(group_id)?.read_restart_checkpoint().await
    }

    /// Persists a group's restart checkpoint.
    pub async fn write_restart_checkpoint(
        &mut self,
        group_id: GroupId,
        restart_checkpoint: InstanceId,
    ) -> Result<(), LocksmithError> {
        self.group_mut(group_id)?
            .write_restart_checkpoint(restart_checkpoint)
            .await
    }

    pub fn durable_db(&self, group_id: GroupId) -> Result<&dyn LockDb, LocksmithError> {
        Ok(self.group(group_id)?.durable())
    }

    pub fn durable_db_mut(
        &mut self,
        group_id: GroupId,
    ) -> Result<&mut dyn LockDb, LocksmithError> {
        Ok(self.group_mut(group_id)?.durable_mut())
    }

    pub fn volatile_db(&self, group_id: GroupId) -> Result<&dyn LockDb, LocksmithError> {
        Ok(self.group(group_id)?.volatile())
    }

    pub fn volatile_db_mut(
        &mut self,
        group_id: GroupId,
    ) -> Result<&mut dyn LockDb, LocksmithError> {
        Ok(self.group_mut(group_id)?.volatile_mut())
    }

    pub fn last_instance_id(
        &self,
        group_id: GroupId,
    ) -> Result<InstanceId, LocksmithError> {
        Ok(self.group(group_id)?.last_instance_id())
    }

    pub fn set_last_instance_id(
        &mut self,
        group_id: GroupId,
        instance_id: InstanceId,
    ) -> Result<(), LocksmithError> {
        self.group_mut(group_id)?.set_last_instance_id(instance_id);
        Ok(())
    }

    pub fn checkpoint(&self, group_id: GroupId) -> Result<InstanceId, LocksmithError> {
        Ok(self.group(group_id)?.checkpoint())
    }

    pub fn restart_checkpoint(
        &self,
        group_id: GroupId,
    ) -> Result<InstanceId, LocksmithError> {
        Ok(self.group(group_id)?.restart_checkpoint())
    }
}
