//! Helper macros for logging (console printing).

use std::sync::OnceLock;

use env_logger::Env;

/// Process identity printed in front of every log line, e.g. "admin".
pub static ME: OnceLock<String> = OnceLock::new();

/// Logs at `$level` with the process identity from `ME` as a parenthesized
/// prefix, or `(-)` before it is set. The level macros below all go through
/// here.
///
/// ```ignore
/// pf_log!(log::Level::Info, "group {} up", group_id);
/// ```
#[doc(hidden)]
#[macro_export]
macro_rules! pf_log {
    ($level:expr, $($fmt_args:tt)*) => {
        log::log!(
            $level,
            "({}) {}",
            $crate::ME.get().map_or("-", |me| me.as_str()),
            format_args!($($fmt_args)*)
        )
    };
}

/// Logs at TRACE, e.g. `pf_trace!("replayed frame at {}", offset)`.
#[macro_export]
macro_rules! pf_trace {
    ($($fmt_args:tt)*) => {
        $crate::pf_log!(log::Level::Trace, $($fmt_args)*)
    };
}

/// Logs at DEBUG.
#[macro_export]
macro_rules! pf_debug {
    ($($fmt_args:tt)*) => {
        $crate::pf_log!(log::Level::Debug, $($fmt_args)*)
    };
}

/// Logs at INFO.
#[macro_export]
macro_rules! pf_info {
    ($($fmt_args:tt)*) => {
        $crate::pf_log!(log::Level::Info, $($fmt_args)*)
    };
}

/// Logs at WARN.
#[macro_export]
macro_rules! pf_warn {
    ($($fmt_args:tt)*) => {
        $crate::pf_log!(log::Level::Warn, $($fmt_args)*)
    };
}

/// Logs at ERROR.
#[macro_export]
macro_rules! pf_error {
    ($($fmt_args:tt)*) => {
        $crate::pf_log!(log::Level::Error, $($fmt_args)*)
    };
}

/// Installs `env_logger` filtered by `RUST_LOG` (default `info`). Calling it
/// again is harmless.
pub fn logger_init() {
    let _ =
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .try_init();
}

/// Logs a message at ERROR and evaluates to `Err(LocksmithError::Store)`
/// carrying the same message.
///
/// ```ignore
/// return logged_err!("store '{}' is closed", dir.display());
/// ```
#[macro_export]
macro_rules! logged_err {
    ($($fmt_args:tt)*) => {{
        let msg = format!($($fmt_args)*);
        $crate::pf_error!("{}", msg);
        Err($crate::LocksmithError::msg(msg))
    }};
}
