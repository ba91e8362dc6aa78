//! Logger setup plus conditional logging macros gated on a module-level
//! `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("only logs while ENABLE_LOGS is true");
//! ```

/// Initializes `env_logger` from `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Conditional `log::info!`. The calling module must define
/// `const ENABLE_LOGS: bool`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional `log::warn!`. The calling module must define
/// `const ENABLE_LOGS: bool`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional `log::debug!`, for per-tick chatter.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
