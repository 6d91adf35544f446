//! Core sliding-window limiter.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::key::{WindowKey, DEFAULT_KEY_PREFIX};
use super::status::RateLimitStatus;
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::{RateWindowError, Result};
use crate::store::{WindowReply, WindowStore, WindowTransaction};

/// Default capacity when no specific limit is configured.
pub const DEFAULT_MAX: u64 = 2500;
/// Default window when no specific window is configured.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(3600);

/// Capacity and window length enforced by one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    /// Maximum hits per window
    pub max: u64,
    /// Length of the trailing window
    pub duration: Duration,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            max: DEFAULT_MAX,
            duration: DEFAULT_DURATION,
        }
    }
}

impl LimitPolicy {
    /// Create a policy of `max` hits per `duration`.
    pub fn new(max: u64, duration: Duration) -> Self {
        Self { max, duration }
    }

    /// Window length in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    fn validate(&self) -> Result<()> {
        if self.max == 0 {
            return Err(RateWindowError::InvalidConfiguration(
                "max must be greater than zero".to_string(),
            ));
        }
        if self.duration_ms() == 0 {
            return Err(RateWindowError::InvalidConfiguration(
                "duration must be at least one millisecond".to_string(),
            ));
        }
        Ok(())
    }
}

/// A distributed sliding-window rate limiter.
///
/// All state lives in the shared store; the limiter itself only holds its
/// policy, so any number of instances in any number of processes can
/// enforce the same limit. Cloning is cheap and shares the store handle.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    policy: LimitPolicy,
    key_prefix: String,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the system clock and default key prefix.
    pub fn new(policy: LimitPolicy, store: Arc<dyn WindowStore>) -> Result<Self> {
        Self::builder()
            .max(policy.max)
            .duration(policy.duration)
            .store(store)
            .build()
    }

    /// Create a limiter from the limiter section of the configuration.
    pub fn from_config(config: &LimiterConfig, store: Arc<dyn WindowStore>) -> Result<Self> {
        config.validate()?;
        Self::builder()
            .max(config.max)
            .duration(config.duration())
            .key_prefix(&config.key_prefix)
            .store(store)
            .build()
    }

    /// Start building a limiter.
    pub fn builder() -> LimiterBuilder {
        LimiterBuilder::default()
    }

    /// The enforced policy.
    pub fn policy(&self) -> LimitPolicy {
        self.policy
    }

    /// The store key used for `identifier`.
    pub fn key_for(&self, identifier: &str) -> Result<String> {
        Ok(WindowKey::new(&self.key_prefix, identifier)?.to_store_key())
    }

    /// Record a hit for `identifier` and report the window's state.
    ///
    /// Expires hits older than the window, counts the survivors, records
    /// this hit, reads the oldest hit and re-arms the key's expiry, all in one
    /// atomic store transaction. Store failures are returned unchanged.
    pub async fn get(&self, identifier: &str) -> Result<RateLimitStatus> {
        let key = WindowKey::new(&self.key_prefix, identifier)?;
        let duration_ms = self.policy.duration_ms();
        let now = self.clock.now_micros();
        let tx = WindowTransaction::new(key.to_store_key(), now, duration_ms);

        trace!(
            key = %key,
            now = now,
            window_start = tx.start,
            "Checking rate window"
        );

        let raw = self.store.execute(&tx).await.map_err(|e| {
            warn!(key = %key, error = %e, "Window transaction failed");
            e
        })?;
        let reply = WindowReply::parse(raw).map_err(|e| {
            warn!(key = %key, error = %e, "Unreadable window reply");
            e
        })?;

        let status = RateLimitStatus::from_reply(&reply, self.policy.max, duration_ms);

        if status.is_exhausted() {
            debug!(
                key = %key,
                count = reply.count,
                max = self.policy.max,
                "Rate window exhausted"
            );
        }

        Ok(status)
    }

    /// Fix the identifier so later calls need none.
    pub fn bind(&self, identifier: &str) -> Result<BoundLimiter> {
        WindowKey::new(&self.key_prefix, identifier)?;
        Ok(BoundLimiter {
            limiter: self.clone(),
            identifier: identifier.to_string(),
        })
    }
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("policy", &self.policy)
            .field("key_prefix", &self.key_prefix)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// A limiter tied to one identifier.
#[derive(Debug, Clone)]
pub struct BoundLimiter {
    limiter: SlidingWindowLimiter,
    identifier: String,
}

impl BoundLimiter {
    /// Record a hit for the bound identifier.
    pub async fn get(&self) -> Result<RateLimitStatus> {
        self.limiter.get(&self.identifier).await
    }

    /// The bound identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The underlying limiter.
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }
}

/// Builder for [`SlidingWindowLimiter`].
#[derive(Default)]
pub struct LimiterBuilder {
    policy: LimitPolicy,
    key_prefix: Option<String>,
    store: Option<Arc<dyn WindowStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl LimiterBuilder {
    /// Hits allowed per window.
    pub fn max(mut self, max: u64) -> Self {
        self.policy.max = max;
        self
    }

    /// Window length.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.policy.duration = duration;
        self
    }

    /// Prefix of the store keys.
    pub fn key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = Some(prefix.to_string());
        self
    }

    /// Shared store holding the windows. Required.
    pub fn store(mut self, store: Arc<dyn WindowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source, the system clock by default.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and build the limiter.
    pub fn build(self) -> Result<SlidingWindowLimiter> {
        let store = self.store.ok_or_else(|| {
            RateWindowError::InvalidConfiguration("a window store is required".to_string())
        })?;
        self.policy.validate()?;

        let key_prefix = self
            .key_prefix
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());
        if key_prefix.is_empty() {
            return Err(RateWindowError::InvalidConfiguration(
                "key prefix must not be empty".to_string(),
            ));
        }

        Ok(SlidingWindowLimiter {
            policy: self.policy,
            key_prefix,
            store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
