//! Shared building blocks for the courier crates: header address parsing,
//! logging, the notification log sink and the batch clock.

pub mod address;
pub mod address_parser;
pub mod clock;
pub mod log_sink;
pub mod logging;

pub use tracing;
