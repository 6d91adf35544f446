//! The externally visible outcome of one limiter call.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::WindowReply;

const MICROS_PER_SEC: i64 = 1_000_000;

/// Remaining capacity, reset time and total capacity of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Hits still permitted in the current window; never negative
    pub remaining: u64,
    /// Epoch seconds at which the oldest hit leaves the window
    pub reset: i64,
    /// Capacity of the window
    pub total: u64,
}

impl RateLimitStatus {
    /// Derive the status from a normalized store reply.
    ///
    /// `remaining` is computed from the hits recorded before the current one,
    /// and floors at zero once that count reaches `max`.
    pub fn from_reply(reply: &WindowReply, max: u64, duration_ms: u64) -> Self {
        let remaining = if reply.count < max {
            max - reply.count
        } else {
            0
        };
        let span = i64::try_from(duration_ms)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let reset = reply.oldest.saturating_add(span).div_euclid(MICROS_PER_SEC);

        Self {
            remaining,
            reset,
            total: max,
        }
    }

    /// Whether the window has no capacity left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// The reset time as a UTC timestamp.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.reset, 0)
    }

    /// Whole seconds from `now_secs` until the reset, zero if already past.
    pub fn seconds_until_reset(&self, now_secs: i64) -> u64 {
        u64::try_from(self.reset.saturating_sub(now_secs)).unwrap_or(0)
    }
}
