//! Window-admission policy.
//!
//! A transaction is admitted iff `now - window <= timestamp <= now`, evaluated
//! once at ingestion. Rejections are ordinary values carrying the reason so the
//! HTTP boundary can map them without consulting the clock again.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Why a transaction was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Timestamp is after "now".
    FutureTimestamp,
    /// Timestamp is older than the window.
    ExpiredTimestamp,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::FutureTimestamp => "future_timestamp",
            Rejection::ExpiredTimestamp => "expired_timestamp",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    window: Duration,
}

impl AdmissionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    #[inline]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Oldest timestamp still inside the window at `now`. Saturates at the
    /// earliest representable instant.
    #[inline]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Check a candidate timestamp against `now`. Both bounds are inclusive.
    pub fn check(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), Rejection> {
        if timestamp > now {
            return Err(Rejection::FutureTimestamp);
        }
        if timestamp < self.cutoff(now) {
            return Err(Rejection::ExpiredTimestamp);
        }
        Ok(())
    }
}
