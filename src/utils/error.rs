//! Customized unified error type.

use std::error;
use std::fmt;
use std::io;
use std::num;
use std::string;

/// Customized error type for Locksmith.
///
/// `NotFound` and `Ignored` are expected outcomes that callers usually turn
/// into sentinel values or skip; `Store` and `Config` are real failures.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LocksmithError {
    /// Key is absent from the store.
    NotFound(String),

    /// Record intentionally excluded from lease replay.
    Ignored(String),

    /// I/O, corruption, or misuse at the store layer.
    Store(String),

    /// Group count/index mismatch or invalid configuration.
    Config(String),
}

impl LocksmithError {
    pub fn msg(msg: impl ToString) -> Self {
        LocksmithError::Store(msg.to_string())
    }

    pub fn config(msg: impl ToString) -> Self {
        LocksmithError::Config(msg.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LocksmithError::NotFound(_))
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, LocksmithError::Ignored(_))
    }
}

impl fmt::Display for LocksmithError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // do not display literal quotes
        match self {
            LocksmithError::NotFound(key) => write!(f, "key '{}' not found", key),
            LocksmithError::Ignored(key) => write!(f, "key '{}' ignored", key),
            LocksmithError::Store(msg) => write!(f, "{}", msg),
            LocksmithError::Config(msg) => write!(f, "config: {}", msg),
        }
    }
}

impl error::Error for LocksmithError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `LocksmithError`.
macro_rules! impl_from_error {
    ($error:ty => $variant:ident) => {
        impl From<$error> for LocksmithError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                LocksmithError::$variant(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error => Store);
impl_from_error!(string::FromUtf8Error => Store);
impl_from_error!(num::ParseIntError => Store);
impl_from_error!(rmp_serde::encode::Error => Store);
impl_from_error!(rmp_serde::decode::Error => Store);
impl_from_error!(tokio::task::JoinError => Store);
impl_from_error!(toml::ser::Error => Config);
impl_from_error!(toml::de::Error => Config);

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = LocksmithError::msg("what the heck?");
        assert_eq!(format!("{}", e), String::from("what the heck?"));
        let e = LocksmithError::NotFound("lk".into());
        assert_eq!(format!("{}", e), String::from("key 'lk' not found"));
    }

    #[test]
    fn from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "oh no!");
        let e = LocksmithError::from(io_error);
        assert!(matches!(e, LocksmithError::Store(ref s) if s.contains("oh no!")));
        assert!(!e.is_not_found());
    }

    #[test]
    fn from_parse_error() {
        let e = LocksmithError::from("x7".parse::<u64>().unwrap_err());
        assert!(matches!(e, LocksmithError::Store(_)));
    }
}
