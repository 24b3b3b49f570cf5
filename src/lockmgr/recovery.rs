//! Group recovery at process start.

use std::path::Path;
use std::sync::Arc;

use crate::utils::{LocksmithError, SteadyClock};
use crate::lockdb::{LockDb, LockDbKind, open_lock_db};
use crate::lockmgr::{GroupId, TopicId, NO_CHECKPOINT};
use crate::lockmgr::group::GroupRecord;
use crate::lockmgr::observer::LockMgrObserver;

impl GroupRecord {
    /// Recovers one group from the durable store in directory `dir`. See
    /// `recover_from` for what happens once the stores are open.
    pub(crate) async fn recover(
        topic_id: TopicId,
        group_id: GroupId,
        dir: &Path,
        compact_threshold: usize,
        clock: Arc<dyn SteadyClock>,
        observer: Arc<dyn LockMgrObserver>,
    ) -> Result<Self, LocksmithError> {
        // open durable store
        let durable =
            match open_lock_db(LockDbKind::Durable, dir, compact_threshold)
                .await
            {
                Ok(db) => db,
                Err(e) => {
                    return logged_err!(
                        "topic {} group {} open durable store '{}' err: {}",
                        topic_id,
                        group_id,
                        dir.display(),
                        e
                    );
                }
            };

        // open empty volatile index
        let volatile =
            match open_lock_db(LockDbKind::Volatile, dir, compact_threshold)
                .await
            {
                Ok(db) => db,
                Err(e) => {
                    return logged_err!(
                        "topic {} group {} open volatile index err: {}",
                        topic_id,
                        group_id,
                        e
                    );
                }
            };

        Self::recover_from(
            topic_id, group_id, durable, volatile, clock, observer,
        )
        .await
    }

    /// Recovers one group over already opened stores: rebuilds the volatile
    /// lease index with deadlines restamped on `clock`, reconciles the
    /// checkpoint with the restart checkpoint, and resumes
    /// `last_instance_id` from the result.
    pub(crate) async fn recover_from(
        topic_id: TopicId,
        group_id: GroupId,
        durable: Box<dyn LockDb>,
        volatile: Box<dyn LockDb>,
        clock: Arc<dyn SteadyClock>,
        observer: Arc<dyn LockMgrObserver>,
    ) -> Result<Self, LocksmithError> {
        let mut group =
            GroupRecord::new(topic_id, group_id, durable, volatile, observer);
        group.replay_leases(clock.as_ref()).await?;
        group.reconcile_checkpoints().await?;

        // resume consensus from the effective checkpoint
        let checkpoint = group.checkpoint();
        group.set_last_instance_id(checkpoint);

        let nr_leases = group.volatile().len();
        pf_info!(
            "topic {} group {} recovered {} leases, last_instance_id {}",
            topic_id,
            group_id,
            nr_leases,
            checkpoint
        );
        group.observer().on_group_recovered(
            topic_id,
            group_id,
            nr_leases,
            checkpoint,
        );
        Ok(group)
    }

    /// Copies every lease in the durable store into the volatile index,
    /// restamping deadlines as `now + lease_time_ms`.
    async fn replay_leases(
        &mut self,
        clock: &dyn SteadyClock,
    ) -> Result<(), LocksmithError> {
        let (topic_id, group_id) = (self.topic_id(), self.group_id());

        self.durable_mut().seek_to_first();
        while self.durable().valid() {
            match self.durable().get_current() {
                Ok((lock_key, mut lease)) => {
                    lease.reset_expire_time(clock.now_ms());
                    self.volatile_mut().put_lease(&lock_key, lease, true).await?;
                }
                Err(LocksmithError::Ignored(key)) => {
                    pf_info!(
                        "topic {} group {} key '{}' ignored in replay",
                        topic_id,
                        group_id,
                        key
                    );
                }
                Err(e) => {
                    return logged_err!(
                        "topic {} group {} replay err: {}",
                        topic_id,
                        group_id,
                        e
                    );
                }
            }
            self.durable_mut().next();
        }

        Ok(())
    }

    /// Reads both checkpoint markers and, if the restart checkpoint is ahead
    /// (or the checkpoint is absent), promotes it to the checkpoint.
    ///
    /// The durable promotion is best effort: a failed write is logged, the
    /// in-memory checkpoint still takes the promoted value, and nothing is
    /// retried. The restart marker is left in place, so the next start will
    /// attempt the same promotion again.
    async fn reconcile_checkpoints(&mut self) -> Result<(), LocksmithError> {
        let (topic_id, group_id) = (self.topic_id(), self.group_id());

        let checkpoint = match self.read_checkpoint().await {
            Ok(cp) => {
                pf_info!(
                    "topic {} group {} checkpoint {} ok",
                    topic_id,
                    group_id,
                    cp
                );
                cp
            }
            Err(LocksmithError::NotFound(_)) => {
                pf_warn!(
                    "topic {} group {} checkpoint not exist",
                    topic_id,
                    group_id
                );
                NO_CHECKPOINT
            }
            Err(e) => {
                return logged_err!(
                    "topic {} group {} read checkpoint err: {}",
                    topic_id,
                    group_id,
                    e
                );
            }
        };

        let restart_checkpoint = match self.read_restart_checkpoint().await {
            Ok(rcp) => {
                pf_info!(
                    "topic {} group {} restart_checkpoint {} ok",
                    topic_id,
                    group_id,
                    rcp
                );
                rcp
            }
            Err(LocksmithError::NotFound(_)) => {
                pf_info!(
                    "topic {} group {} restart_checkpoint not exist",
                    topic_id,
                    group_id
                );
                NO_CHECKPOINT
            }
            Err(e) => {
                return logged_err!(
                    "topic {} group {} read restart_checkpoint err: {}",
                    topic_id,
                    group_id,
                    e
                );
            }
        };

        if restart_checkpoint != NO_CHECKPOINT
            && (checkpoint == NO_CHECKPOINT || restart_checkpoint > checkpoint)
        {
            match self.write_checkpoint(restart_checkpoint).await {
                Ok(()) => pf_info!(
                    "topic {} group {} checkpoint {} -> restart_checkpoint {}",
                    topic_id,
                    group_id,
                    checkpoint,
                    restart_checkpoint
                ),
                Err(e) => pf_error!(
                    "topic {} group {} promote restart_checkpoint {} err: {}",
                    topic_id,
                    group_id,
                    restart_checkpoint,
                    e
                ),
            }
        }

        Ok(())
    }
}
