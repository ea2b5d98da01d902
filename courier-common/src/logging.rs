//! Structured logging for the courier crates.
//!
//! Events are tagged with a category span so SMTP traffic can be told apart
//! from batch bookkeeping:
//!
//! - `outgoing`: commands and message data written to the relay
//! - `incoming`: replies read from the relay
//! - `internal`: queue processing, message building and connection state
//!
//! Each macro logs at `TRACE` unless given `level = <LEVEL>` first, and
//! accepts anything `tracing::event!` does after that.

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Environment variable holding the maximum level, e.g. `debug`.
pub const LEVEL_VAR: &str = "LOG_LEVEL";

const TARGET_PREFIX: &str = "courier";

#[doc(hidden)]
#[macro_export]
macro_rules! log {
    ($level:expr, $category:expr, $($arg:tt)+) => {{
        let _category = $crate::tracing::span!($level, $category).entered();
        $crate::tracing::event!($level, $($arg)+)
    }};
}

/// Traffic written to the relay.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::TRACE, "outgoing", $($arg)+)
    };
}

/// Replies read from the relay.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::TRACE, "incoming", $($arg)+)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::TRACE, "internal", $($arg)+)
    };
}

/// Install the global subscriber for the `courier` binary.
///
/// Debug builds default to `TRACE` and release builds to `INFO`; `LOG_LEVEL`
/// overrides either. Events from dependencies are dropped.
pub fn init() {
    let fallback = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let level = level_filter(std::env::var(LEVEL_VAR).ok().as_deref(), fallback);

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .with_filter(level)
        .with_filter(FilterFn::new(|metadata| is_courier_target(metadata.target())));

    if let Err(error) = tracing_subscriber::registry().with(layer).try_init() {
        eprintln!("Logging is already initialised: {error}");
    }
}

/// An unset or unparseable value gives `fallback`.
fn level_filter(value: Option<&str>, fallback: LevelFilter) -> LevelFilter {
    let Some(value) = value else {
        return fallback;
    };

    value.trim().parse().unwrap_or_else(|_| {
        eprintln!("Ignoring {LEVEL_VAR}={value}, using {fallback}");
        fallback
    })
}

fn is_courier_target(target: &str) -> bool {
    target.starts_with(TARGET_PREFIX)
}
