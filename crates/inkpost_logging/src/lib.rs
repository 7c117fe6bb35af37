#![deny(missing_docs)]
//! Logging front-end for inkpost.
//!
//! Every crate logs through the `ink_*` macros so the facade can be swapped
//! in one place. Credentials go through [`redact`] before they reach a log
//! line.

/// `log::trace!` under the inkpost name.
#[macro_export]
macro_rules! ink_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*)
    };
}

/// `log::debug!` under the inkpost name.
#[macro_export]
macro_rules! ink_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

/// `log::info!` under the inkpost name.
#[macro_export]
macro_rules! ink_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

/// `log::warn!` under the inkpost name.
#[macro_export]
macro_rules! ink_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

/// `log::error!` under the inkpost name.
#[macro_export]
macro_rules! ink_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

const VISIBLE_PREFIX: usize = 4;
const MASK: &str = "****";

/// Masks an app secret, API key or access token for display.
///
/// Keeps the first four characters when the value is longer than that.
pub fn redact(secret: &str) -> String {
    let mut chars = secret.chars();
    let prefix: String = chars.by_ref().take(VISIBLE_PREFIX).collect();
    if chars.next().is_none() {
        MASK.to_string()
    } else {
        format!("{prefix}{MASK}")
    }
}

/// Sends log output of test binaries to stderr.
///
/// `INKPOST_TEST_LOG` picks the level (`off`, `error` .. `trace`); the
/// default is `warn`. Calling it twice is harmless.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

    let level = std::env::var("INKPOST_TEST_LOG")
        .ok()
        .and_then(|value| value.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Warn);
    let config = ConfigBuilder::new()
        .add_filter_allow_str("inkpost")
        .build();
    if TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Never).is_err() {
        log::debug!("test logger already installed");
    }
}
