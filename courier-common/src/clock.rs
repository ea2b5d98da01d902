//! Time source for the send loop.
//!
//! Timestamps and throttle pauses go through [`Clock`] so batches can be
//! driven deterministically in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    /// The current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the current batch for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and `tokio` timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
