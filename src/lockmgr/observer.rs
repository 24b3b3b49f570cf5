//! Instrumentation hooks on checkpoint traffic.

use crate::lockmgr::{GroupId, InstanceId, TopicId};

/// Observer notified on checkpoint reads/writes and group recovery. Calls are
/// synchronous and return nothing, so an observer can never change the
/// outcome of the operation it watches. All methods default to no-ops.
pub trait LockMgrObserver: Send + Sync {
    fn on_read_checkpoint(&self, _topic_id: TopicId, _group_id: GroupId) {}

    fn on_write_checkpoint(
        &self,
        _topic_id: TopicId,
        _group_id: GroupId,
        _checkpoint: InstanceId,
    ) {
    }

    fn on_read_restart_checkpoint(
        &self,
        _topic_id: TopicId,
        _group_id: GroupId,
    ) {
    }

    fn on_write_restart_checkpoint(
        &self,
        _topic_id: TopicId,
        _group_id: GroupId,
        _restart_checkpoint: InstanceId,
    ) {
    }

    /// Called once a group finishes recovery.
    fn on_group_recovered(
        &self,
        _topic_id: TopicId,
        _group_id: GroupId,
        _nr_leases: usize,
        _checkpoint: InstanceId,
    ) {
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl LockMgrObserver for NullObserver {}
