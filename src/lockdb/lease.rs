//! Lease record kept per lock key.

use serde::{Serialize, Deserialize};

/// One lock's lease. Only the granted duration is persisted; the absolute
/// deadline is a reading of the current process's steady clock and is
/// recomputed whenever the record is loaded from durable storage.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Version of the lock, bumped by the state machine on every grant.
    pub version: u64,

    /// Holder of the lock.
    pub client_id: String,

    /// Granted hold duration.
    pub lease_time_ms: u64,

    /// Deadline on the steady clock; never serialized.
    #[serde(skip)]
    pub expire_time_ms: u64,
}

impl LeaseRecord {
    pub fn new(version: u64, client_id: impl Into<String>, lease_time_ms: u64) -> Self {
        LeaseRecord {
            version,
            client_id: client_id.into(),
            lease_time_ms,
            expire_time_ms: 0,
        }
    }

    /// Restamps the deadline as `now_ms + lease_time_ms`.
    pub fn reset_expire_time(&mut self, now_ms: u64) {
        self.expire_time_ms = now_ms.saturating_add(self.lease_time_ms);
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expire_time_ms
    }
}
