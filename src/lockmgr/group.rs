//! Per paxos group record and its checkpoint markers.

use std::sync::Arc;

use crate::utils::LocksmithError;
use crate::lockdb::{LockDb, KEY_CHECKPOINT, KEY_RESTART_CHECKPOINT};
use crate::lockmgr::{GroupId, InstanceId, TopicId, NO_CHECKPOINT};
use crate::lockmgr::observer::LockMgrObserver;

/// State owned by one paxos group: its durable store, its volatile lease
/// index, and the checkpoint bookkeeping handed to the consensus layer.
pub struct GroupRecord {
    /// Topic this group belongs to, for logging and observer calls.
    topic_id: TopicId,

    /// Index of this group within the topic.
    group_id: GroupId,

    /// Durable store of lock state and checkpoint markers.
    durable: Box<dyn LockDb>,

    /// Volatile lease index, rebuilt on every start.
    volatile: Box<dyn LockDb>,

    /// Last instance known applied and durable.
    checkpoint: InstanceId,

    /// Last restart checkpoint read or written by this process.
    restart_checkpoint: InstanceId,

    /// Next instance to apply.
    last_instance_id: InstanceId,

    observer: Arc<dyn LockMgrObserver>,
}

impl GroupRecord {
    /// Creates a record around freshly opened stores. All instance ids
    /// start at `NO_CHECKPOINT`.
    pub(crate) fn new(
        topic_id: TopicId,
        group_id: GroupId,
        durable: Box<dyn LockDb>,
        volatile: Box<dyn LockDb>,
        observer: Arc<dyn LockMgrObserver>,
    ) -> Self {
        GroupRecord {
            topic_id,
            group_id,
            durable,
            volatile,
            checkpoint: NO_CHECKPOINT,
            restart_checkpoint: NO_CHECKPOINT,
            last_instance_id: NO_CHECKPOINT,
            observer,
        }
    }

    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub(crate) fn observer(&self) -> &dyn LockMgrObserver {
        self.observer.as_ref()
    }

    pub fn durable(&self) -> &dyn LockDb {
        self.durable.as_ref()
    }

    pub fn durable_mut(&mut self) -> &mut dyn LockDb {
        self.durable.as_mut()
    }

    pub fn volatile(&self) -> &dyn LockDb {
        self.volatile.as_ref()
    }

    pub fn volatile_mut(&mut self) -> &mut dyn LockDb {
        self.volatile.as_mut()
    }

    pub fn checkpoint(&self) -> InstanceId {
        self.checkpoint
    }

    pub fn restart_checkpoint(&self) -> InstanceId {
        self.restart_checkpoint
    }

    pub fn last_instance_id(&self) -> InstanceId {
        self.last_instance_id
    }

    pub fn set_last_instance_id(&mut self, instance_id: InstanceId) {
        self.last_instance_id = instance_id;
    }

    /// Reads a decimal marker from the durable store. Only plain digits, as
    /// written by `write_marker`, are accepted.
    fn read_marker(&self, key: &str) -> Result<InstanceId, LocksmithError> {
        let text = self.durable.get(key)?;
        let malformed = |why: String| {
            LocksmithError::msg(format!(
                "malformed marker '{}' under '{}': {}",
                text, key, why
            ))
        };
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("not a decimal number".into()));
        }
        text.parse::<InstanceId>().map_err(|e| malformed(e.to_string()))
    }

    /// Logs the outcome of a marker read.
    fn log_marker_read(
        &self,
        what: &str,
        result: &Result<InstanceId, LocksmithError>,
    ) {
        match result {
            Ok(value) => pf_debug!(
                "topic {} group {} {} {} ok",
                self.topic_id,
                self.group_id,
                what,
                value
            ),
            Err(LocksmithError::NotFound(_)) => pf_debug!(
                "topic {} group {} {} not exist",
                self.topic_id,
                self.group_id,
                what
            ),
            Err(e) => pf_error!(
                "topic {} group {} read {} err: {}",
                self.topic_id,
                self.group_id,
                what,
                e
            ),
        }
    }

    /// Writes a decimal marker to the durable store unless it is the
    /// sentinel.
    async fn write_marker(
        &mut self,
        what: &str,
        key: &str,
        value: InstanceId,
    ) -> Result<(), LocksmithError> {
        if value == NO_CHECKPOINT {
            return Ok(());
        }

        let result = self.durable.put(key, value.to_string(), true).await;
        match result {
            Ok(()) => pf_debug!(
                "topic {} group {} wrote {} {}",
                self.topic_id,
                self.group_id,
                what,
                value
            ),
            Err(ref e) => pf_error!(
                "topic {} group {} write {} {} err: {}",
                self.topic_id,
                self.group_id,
                what,
                value,
                e
            ),
        }
        result
    }

    /// Reads the checkpoint marker. An absent marker yields
    /// `LocksmithError::NotFound`. The in-memory checkpoint is set to the
    /// value read, or to `NO_CHECKPOINT` on any error.
    pub async fn read_checkpoint(
        &mut self,
    ) -> Result<InstanceId, LocksmithError> {
        self.observer.on_read_checkpoint(self.topic_id, self.group_id);

        let result = self.read_marker(KEY_CHECKPOINT);
        self.log_marker_read("checkpoint", &result);
        self.checkpoint = *result.as_ref().unwrap_or(&NO_CHECKPOINT);
        result
    }

    /// Sets the in-memory checkpoint and persists it. `NO_CHECKPOINT` is
    /// never persisted and reports success.
    pub async fn write_checkpoint(
        &mut self,
        checkpoint: InstanceId,
    ) -> Result<(), LocksmithError> {
        self.observer
            .on_write_checkpoint(self.topic_id, self.group_id, checkpoint);

        self.checkpoint = checkpoint;
        self.write_marker("checkpoint", KEY_CHECKPOINT, checkpoint)
            .await
    }

    /// Reads the restart checkpoint marker. Same outcomes as
    /// `read_checkpoint`; the primary checkpoint is left alone.
    pub async fn read_restart_checkpoint(
        &mut self,
    ) -> Result<InstanceId, LocksmithError> {
        self.observer
            .on_read_restart_checkpoint(self.topic_id, self.group_id);

        let result = self.read_marker(KEY_RESTART_CHECKPOINT);
        self.log_marker_read("restart_checkpoint", &result);
        self.restart_checkpoint = *result.as_ref().unwrap_or(&NO_CHECKPOINT);
        result
    }

    /// Persists a restart checkpoint. `NO_CHECKPOINT` is never persisted and
    /// reports success; the primary checkpoint is left alone.
    pub async fn write_restart_checkpoint(
        &mut self,
        restart_checkpoint: InstanceId,
    ) -> Result<(), LocksmithError> {
        self.observer.on_write_restart_checkpoint(
            self.topic_id,
            self.group_id,
            restart_checkpoint,
        );

        self.restart_checkpoint = restart_checkpoint;
        self.write_marker(
            "restart_checkpoint",
            KEY_RESTART_CHECKPOINT,
            restart_checkpoint,
        )
        .await
    }

    /// Closes both stores, continuing past a failure. Returns the last error
    /// seen.
    pub(crate) async fn dispose(&mut self) -> Result<(), LocksmithError> {
        let mut result = Ok(());

        if let Err(e) = self.durable.dispose().await {
            pf_error!(
                "topic {} group {} dispose durable store err: {}",
                self.topic_id,
                self.group_id,
                e
            );
            result = Err(e);
        }

        if let Err(e) = self.volatile.dispose().await {
            pf_error!(
                "topic {} group {} dispose volatile index err: {}",
                self.topic_id,
                self.group_id,
                e
            );
            result = Err(e);
        }

        result
    }
}

#[cfg(test)]
mod group_tests {
    use super::*;
    use std::sync::Mutex;
    use crate::lockdb::MemDb;
    use crate::lockmgr::observer::NullObserver;

    fn mem_group() -> GroupRecord {
        GroupRecord::new(
            1,
            0,
            Box::new(MemDb::new()),
            Box::new(MemDb::new()),
            Arc::new(NullObserver),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn read_absent_checkpoint() {
        let mut group = mem_group();
        group.checkpoint = 8;
        assert!(group.read_checkpoint().await.unwrap_err().is_not_found());
        assert_eq!(group.checkpoint(), NO_CHECKPOINT);
        assert!(group
            .read_restart_checkpoint()
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(group.restart_checkpoint(), NO_CHECKPOINT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn write_then_read() -> Result<(), LocksmithError> {
        let mut group = mem_group();
        group.write_checkpoint(42).await?;
        assert_eq!(group.durable().get(KEY_CHECKPOINT)?, "42");
        group.checkpoint = 0;
        assert_eq!(group.read_checkpoint().await?, 42);
        assert_eq!(group.checkpoint(), 42);

        group.write_restart_checkpoint(50).await?;
        assert_eq!(group.durable().get(KEY_RESTART_CHECKPOINT)?, "50");
        assert_eq!(group.read_restart_checkpoint().await?, 50);
        assert_eq!(group.checkpoint(), 42);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn sentinel_not_persisted() -> Result<(), LocksmithError> {
        let mut group = mem_group();
        group.write_checkpoint(7).await?;
        group.write_checkpoint(NO_CHECKPOINT).await?;
        assert_eq!(group.checkpoint(), NO_CHECKPOINT);
        assert_eq!(group.durable().get(KEY_CHECKPOINT)?, "7");
        group.write_restart_checkpoint(NO_CHECKPOINT).await?;
        assert!(group
            .durable()
            .get(KEY_RESTART_CHECKPOINT)
            .unwrap_err()
            .is_not_found());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn malformed_marker() -> Result<(), LocksmithError> {
        let mut group = mem_group();
        group
            .durable_mut()
            .put(KEY_CHECKPOINT, "twelve".into(), true)
            .await?;
        group.checkpoint = 3;
        let err = group.read_checkpoint().await.unwrap_err();
        assert!(matches!(err, LocksmithError::Store(_)));
        assert_eq!(group.checkpoint(), NO_CHECKPOINT);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn marker_must_be_plain_digits() -> Result<(), LocksmithError> {
        let mut group = mem_group();
        for text in [" 42 ", "+42", "42\n", "", "18446744073709551616"] {
            group
                .durable_mut()
                .put(KEY_RESTART_CHECKPOINT, text.into(), true)
                .await?;
            assert!(matches!(
                group.read_restart_checkpoint().await,
                Err(LocksmithError::Store(_))
            ));
        }
        group
            .durable_mut()
            .put(KEY_RESTART_CHECKPOINT, "0042".into(), true)
            .await?;
        assert_eq!(group.read_restart_checkpoint().await?, 42);
        Ok(())
    }

    #[derive(Default)]
    struct RecordingObserver {
        calls: Mutex<Vec<String>>,
    }

    impl LockMgrObserver for RecordingObserver {
        fn on_read_checkpoint(&self, topic_id: TopicId, group_id: GroupId) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("read {} {}", topic_id, group_id));
        }

        fn on_write_restart_checkpoint(
            &self,
            topic_id: TopicId,
            group_id: GroupId,
            restart_checkpoint: InstanceId,
        ) {
            self.calls.lock().unwrap().push(format!(
                "write_restart {} {} {}",
                topic_id, group_id, restart_checkpoint
            ));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn observer_notified() -> Result<(), LocksmithError> {
        let observer = Arc::new(RecordingObserver::default());
        let mut group = GroupRecord::new(
            3,
            2,
            Box::new(MemDb::new()),
            Box::new(MemDb::new()),
            observer.clone(),
        );
        let _ = group.read_checkpoint().await;
        group.write_restart_checkpoint(11).await?;
        group.write_checkpoint(5).await?;
        assert_eq!(
            *observer.calls.lock().unwrap(),
            vec!["read 3 2".to_string(), "write_restart 3 2 11".to_string()]
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn dispose_reports_last_error() -> Result<(), LocksmithError> {
        let mut group = mem_group();
        group.dispose().await?;
        assert!(group.dispose().await.is_err());
        Ok(())
    }
}
