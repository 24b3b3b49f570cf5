//! Volatile lease index.

use crate::utils::LocksmithError;
use crate::lockdb::{LockDb, LockDbKind, LeaseRecord, validate_lock_key};
use crate::lockdb::table::{DbValue, KeyTable};

use async_trait::async_trait;

/// In-memory `LockDb`. Keeps deadlines as written, since nothing here
/// outlives the process.
#[derive(Debug)]
pub struct MemDb {
    table: KeyTable,

    /// False after `dispose()`.
    open: bool,
}

impl MemDb {
    /// Creates an empty, open index.
    pub fn new() -> Self {
        MemDb {
            table: KeyTable::new(),
            open: true,
        }
    }

    fn check_open(&self) -> Result<(), LocksmithError> {
        if self.open {
            Ok(())
        } else {
            Err(LocksmithError::msg("volatile index already disposed"))
        }
    }
}

impl Default for MemDb {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockDb for MemDb {
    fn kind(&self) -> LockDbKind {
        LockDbKind::Volatile
    }

    async fn dispose(&mut self) -> Result<(), LocksmithError> {
        self.check_open()?;
        self.table.clear();
        self.open = false;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String, LocksmithError> {
        self.check_open()?;
        self.table.get_text(key)
    }

    async fn put(
        &mut self,
        key: &str,
        value: String,
        overwrite: bool,
    ) -> Result<(), LocksmithError> {
        self.check_open()?;
        self.table.check_overwrite(key, overwrite)?;
        self.table.insert(key.into(), DbValue::Text(value));
        Ok(())
    }

    fn get_lease(&self, key: &str) -> Result<LeaseRecord, LocksmithError> {
        self.check_open()?;
        self.table.get_lease(key)
    }

    async fn put_lease(
        &mut self,
        key: &str,
        lease: LeaseRecord,
        overwrite: bool,
    ) -> Result<(), LocksmithError> {
        self.check_open()?;
        validate_lock_key(key)?;
        self.table.check_overwrite(key, overwrite)?;
        self.table.insert(key.into(), DbValue::Lease(lease));
        Ok(())
    }

    fn seek_to_first(&mut self) {
        self.table.seek_to_first();
    }

    fn valid(&self) -> bool {
        self.open && self.table.valid()
    }

    fn next(&mut self) {
        self.table.next();
    }

    fn get_current(&self) -> Result<(String, LeaseRecord), LocksmithError> {
        self.check_open()?;
        self.table.get_current()
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod memdb_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn put_get_lease() -> Result<(), LocksmithError> {
        let mut db = MemDb::new();
        let mut lease = LeaseRecord::new(1, "c1", 3000);
        lease.reset_expire_time(500);
        db.put_lease("lk", lease.clone(), true).await?;
        // deadline survives in memory
        assert_eq!(db.get_lease("lk")?, lease);
        assert!(db.get_lease("other").unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn put_last_wins() -> Result<(), LocksmithError> {
        let mut db = MemDb::new();
        db.put_lease("lk", LeaseRecord::new(1, "c1", 10), true).await?;
        db.put_lease("lk", LeaseRecord::new(2, "c2", 20), true).await?;
        assert_eq!(db.len(), 1);
        assert_eq!(db.get_lease("lk")?.client_id, "c2");
        assert!(db
            .put_lease("lk", LeaseRecord::new(3, "c3", 30), false)
            .await
            .is_err());
        assert_eq!(db.get_lease("lk")?.version, 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn reject_reserved_lock_key() {
        let mut db = MemDb::new();
        assert!(db
            .put_lease("__ignore__.sneaky", LeaseRecord::new(1, "c", 1), true)
            .await
            .is_err());
        assert!(db.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn disposed_rejects_ops() -> Result<(), LocksmithError> {
        let mut db = MemDb::new();
        db.put("k", "v".into(), true).await?;
        db.dispose().await?;
        assert!(db.get("k").is_err());
        assert!(db.put("k", "v".into(), true).await.is_err());
        assert!(db.dispose().await.is_err());
        db.seek_to_first();
        assert!(!db.valid());
        Ok(())
    }
}
