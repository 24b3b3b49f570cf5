//! Lock state stores: the durable per-group store and the volatile lease
//! index, both behind the `LockDb` trait.

mod keys;
mod lease;
mod table;
mod filedb;
mod memdb;

#[cfg(test)]
mod flaky;

use std::path::Path;

use crate::utils::LocksmithError;

use async_trait::async_trait;

pub use keys::{
    RESERVED_PREFIX, KEY_CHECKPOINT, KEY_RESTART_CHECKPOINT, is_reserved_key,
    validate_lock_key,
};
pub use lease::LeaseRecord;
pub use table::DbValue;
pub use filedb::{FileDb, DEFAULT_COMPACT_THRESHOLD};
pub use memdb::MemDb;

#[cfg(test)]
pub(crate) use flaky::FlakyDb;

/// Which store implementation to open.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockDbKind {
    /// Durable append-log store rooted at a directory.
    Durable,

    /// In-memory index; contents are lost on dispose.
    Volatile,
}

/// Key-ordered store of lock state.
///
/// Lookups return `LocksmithError::NotFound` for absent keys. Iteration is
/// cursor based (`seek_to_first`, `valid`, `next`, `get_current`) and yields
/// lock leases in key order; records under reserved keys come back as
/// `LocksmithError::Ignored`.
#[async_trait]
pub trait LockDb: Send + Sync {
    fn kind(&self) -> LockDbKind;

    /// Closes the store. Any later operation fails.
    async fn dispose(&mut self) -> Result<(), LocksmithError>;

    /// Reads a text value.
    fn get(&self, key: &str) -> Result<String, LocksmithError>;

    /// Writes a text value. With `overwrite == false`, an existing key is an
    /// error and nothing is written.
    async fn put(
        &mut self,
        key: &str,
        value: String,
        overwrite: bool,
    ) -> Result<(), LocksmithError>;

    /// Reads the lease of a lock key.
    fn get_lease(&self, key: &str) -> Result<LeaseRecord, LocksmithError>;

    /// Writes the lease of a lock key. The key must pass
    /// `validate_lock_key`.
    async fn put_lease(
        &mut self,
        key: &str,
        lease: LeaseRecord,
        overwrite: bool,
    ) -> Result<(), LocksmithError>;

    fn seek_to_first(&mut self);

    fn valid(&self) -> bool;

    fn next(&mut self);

    /// Returns the key and lease under the cursor.
    fn get_current(&self) -> Result<(String, LeaseRecord), LocksmithError>;

    /// Number of keys currently stored, reserved ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens a store of the given kind. `path` is the store's directory and
/// `compact_threshold` the number of stale log frames tolerated at open;
/// both are ignored for `LockDbKind::Volatile`.
pub async fn open_lock_db(
    kind: LockDbKind,
    path: &Path,
    compact_threshold: usize,
) -> Result<Box<dyn LockDb>, LocksmithError> {
    match kind {
        LockDbKind::Durable => {
            Ok(Box::new(FileDb::open_with(path, compact_threshold).await?))
        }
        LockDbKind::Volatile => Ok(Box::new(MemDb::new())),
    }
}
