//! Locksmith: recovery and checkpoint core of a Paxos-backed lock service.
//!
//! A topic's locks are partitioned into paxos groups. Each group owns a
//! durable store of lock state and a volatile lease index rebuilt on every
//! start; `LockManager` recovers both and tells the consensus layer where to
//! resume.

#[macro_use]
mod utils;

mod lockdb;
mod lockmgr;

pub use utils::{
    LocksmithError, ME, logger_init, SteadyClock, MonotonicClock, ManualClock,
};
#[doc(hidden)]
pub use utils::{parse_config_table, reject_leftover_fields};
pub use lockdb::{
    LockDb, LockDbKind, LeaseRecord, DbValue, FileDb, MemDb, open_lock_db,
    validate_lock_key, is_reserved_key, RESERVED_PREFIX, KEY_CHECKPOINT,
    KEY_RESTART_CHECKPOINT, DEFAULT_COMPACT_THRESHOLD,
};
pub use lockmgr::{
    LockManager, LockMgrConfig, GroupRecord, LockMgrObserver, NullObserver,
    TopicId, GroupId, InstanceId, NO_CHECKPOINT,
};
