//! Ordered key table with an iteration cursor, shared by both store kinds.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::utils::LocksmithError;
use crate::lockdb::LeaseRecord;
use crate::lockdb::keys::is_reserved_key;

use serde::{Serialize, Deserialize};

/// Value stored under a key: either a lock's lease or a plain text marker
/// (checkpoints).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum DbValue {
    Text(String),
    Lease(LeaseRecord),
}

/// In-memory ordered table. The cursor remembers the current key rather than
/// a position, so writes between `next()` calls do not invalidate it.
#[derive(Debug, Default)]
pub(crate) struct KeyTable {
    /// Entries sorted by key.
    entries: BTreeMap<String, DbValue>,

    /// Key the cursor currently points at; `None` once exhausted.
    cursor: Option<String>,
}

impl KeyTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Fails if `key` exists and overwriting is not allowed.
    pub(crate) fn check_overwrite(
        &self,
        key: &str,
        overwrite: bool,
    ) -> Result<(), LocksmithError> {
        if !overwrite && self.contains(key) {
            return Err(LocksmithError::msg(format!(
                "key '{}' already exists",
                key
            )));
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, key: String, value: DbValue) {
        self.entries.insert(key, value);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &DbValue)> {
        self.entries.iter()
    }

    pub(crate) fn get_text(&self, key: &str) -> Result<String, LocksmithError> {
        match self.entries.get(key) {
            Some(DbValue::Text(text)) => Ok(text.clone()),
            Some(DbValue::Lease(_)) => Err(LocksmithError::msg(format!(
                "key '{}' holds a lease, not text",
                key
            ))),
            None => Err(LocksmithError::NotFound(key.into())),
        }
    }

    pub(crate) fn get_lease(
        &self,
        key: &str,
    ) -> Result<LeaseRecord, LocksmithError> {
        match self.entries.get(key) {
            Some(DbValue::Lease(lease)) => Ok(lease.clone()),
            Some(DbValue::Text(_)) => Err(LocksmithError::msg(format!(
                "key '{}' holds text, not a lease",
                key
            ))),
            None => Err(LocksmithError::NotFound(key.into())),
        }
    }

    pub(crate) fn seek_to_first(&mut self) {
        self.cursor = self.entries.keys().next().cloned();
    }

    pub(crate) fn valid(&self) -> bool {
        self.cursor.is_some()
    }

    pub(crate) fn next(&mut self) {
        if let Some(ref cur) = self.cursor {
            self.cursor = self
                .entries
                .range::<str, _>((Bound::Excluded(cur.as_str()), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone());
        }
    }

    /// Returns the lease under the cursor. Reserved keys yield
    /// `LocksmithError::Ignored`.
    pub(crate) fn get_current(
        &self,
    ) -> Result<(String, LeaseRecord), LocksmithError> {
        let key = match self.cursor {
            Some(ref key) => key,
            None => return Err(LocksmithError::msg("cursor not valid")),
        };
        if is_reserved_key(key) {
            return Err(LocksmithError::Ignored(key.clone()));
        }
        match self.entries.get(key) {
            Some(DbValue::Lease(lease)) => Ok((key.clone(), lease.clone())),
            Some(DbValue::Text(_)) => Err(LocksmithError::msg(format!(
                "lock key '{}' holds text, not a lease",
                key
            ))),
            None => Err(LocksmithError::msg(format!(
                "cursor key '{}' vanished",
                key
            ))),
        }
    }
}
