//! Sliding-window rate limiting.

mod key;
mod limiter;
mod status;

pub use key::{WindowKey, DEFAULT_KEY_PREFIX};
pub use limiter::{
    BoundLimiter, LimitPolicy, LimiterBuilder, SlidingWindowLimiter, DEFAULT_DURATION, DEFAULT_MAX,
};
pub use status::RateLimitStatus;
