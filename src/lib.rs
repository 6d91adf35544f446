//! Ratewindow - Distributed Sliding-Window Rate Limiting
//!
//! This crate tracks how many requests an identifier has issued within a
//! trailing time window and reports how many more are permitted. Window state
//! lives in a shared store (Redis), so every process enforcing the same limit
//! observes the same count.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LimiterConfig, RateWindowConfig, RedisConfig};
pub use error::{RateWindowError, Result};
pub use ratelimit::{BoundLimiter, LimitPolicy, RateLimitStatus, SlidingWindowLimiter};
pub use store::{InMemoryStore, RedisStore, StoreError, WindowStore};
