//! Time sources for window timestamps.
//!
//! Every hit is stored with its timestamp as both score and member, so the
//! clock must never hand out the same microsecond twice within a process.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microsecond time source used by the limiter.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in microseconds since the Unix epoch.
    fn now_micros(&self) -> i64;
}

/// High-water mark shared by every `SystemClock` in the process.
static LAST_SYSTEM_MICROS: AtomicI64 = AtomicI64::new(0);

/// Wall clock with microsecond resolution that never repeats a value.
///
/// When the wall clock reports a value at or below the last one handed out
/// (coarse resolution, or the clock stepped back), the previous value plus
/// one microsecond is returned instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    fn wall_micros() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        let wall = Self::wall_micros();
        let mut last = LAST_SYSTEM_MICROS.load(Ordering::Relaxed);
        loop {
            let next = if wall > last { wall } else { last + 1 };
            match LAST_SYSTEM_MICROS.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }
}

/// Manually driven clock for tests and simulations.
///
/// Each read moves the clock forward by one microsecond so that
/// back-to-back hits stay distinct.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock starting at the given epoch microseconds.
    pub fn new(start_micros: i64) -> Self {
        Self {
            micros: Arc::new(AtomicI64::new(start_micros)),
        }
    }

    /// Create a clock starting at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock::wall_micros())
    }

    /// Jump to an absolute time.
    pub fn set(&self, micros: i64) {
        self.micros.store(micros, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_micros()).unwrap_or(i64::MAX);
        self.micros.fetch_add(by, Ordering::SeqCst);
    }

    /// Current value without ticking.
    pub fn peek(&self) -> i64 {
        self.micros.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.micros.fetch_add(1, Ordering::SeqCst)
    }
}
