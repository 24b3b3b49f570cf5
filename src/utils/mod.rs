//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod error;
mod clock;

pub use error::LocksmithError;
pub use print::{ME, logger_init};
pub use config::{parse_config_table, reject_leftover_fields};
pub use clock::{SteadyClock, MonotonicClock, ManualClock};
