//! Injected time source
//!
//! Rate limiting and lifecycle-heartbeat decisions compare wall-clock
//! durations; routing them through a trait lets tests advance time without
//! sleeping.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Abstract clock used by the notebook and the Mesos maintenance call.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Elapsed time since `earlier`. Negative when `earlier` is in the future.
    fn since(&self, earlier: DateTime<Utc>) -> Duration {
        self.now() - earlier
    }
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The zero instant, used as the initial "last termination" timestamp.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}
