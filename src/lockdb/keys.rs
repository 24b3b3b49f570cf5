//! Reserved key namespace of a group's store.
//!
//! Everything under `RESERVED_PREFIX` is bookkeeping owned by the lock
//! manager and is skipped when replaying leases. Lock keys must never enter
//! that namespace, which `validate_lock_key` enforces wherever a lock key is
//! accepted.

use crate::utils::LocksmithError;

/// Prefix shared by all reserved keys.
pub const RESERVED_PREFIX: &str = "__ignore__.";

/// Key holding the group's checkpoint as decimal text.
pub const KEY_CHECKPOINT: &str = "__ignore__.__checkpoint__";

/// Key holding the group's restart checkpoint as decimal text.
pub const KEY_RESTART_CHECKPOINT: &str = "__ignore__.__restart_checkpoint__";

/// Returns true if `key` lives in the reserved namespace.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Checks that `key` is usable as a lock key.
pub fn validate_lock_key(key: &str) -> Result<(), LocksmithError> {
    if key.is_empty() {
        Err(LocksmithError::msg("lock key must not be empty"))
    } else if is_reserved_key(key) {
        Err(LocksmithError::msg(format!(
            "lock key '{}' uses reserved prefix '{}'",
            key, RESERVED_PREFIX
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod keys_tests {
    use super::*;

    #[test]
    fn reserved_keys_in_namespace() {
        assert!(is_reserved_key(KEY_CHECKPOINT));
        assert!(is_reserved_key(KEY_RESTART_CHECKPOINT));
        assert_ne!(KEY_CHECKPOINT, KEY_RESTART_CHECKPOINT);
    }

    #[test]
    fn validate_keys() {
        assert!(validate_lock_key("topic.1.consumer-group").is_ok());
        assert!(validate_lock_key("__ignore_not_quite").is_ok());
        assert!(validate_lock_key("").is_err());
        assert!(validate_lock_key(KEY_CHECKPOINT).is_err());
        assert!(validate_lock_key("__ignore__.mine").is_err());
    }
}
