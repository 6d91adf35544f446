//! Shared store capability used by the limiter.
//!
//! The limiter never talks to a store command by command. It builds one
//! [`WindowTransaction`] per call and hands it to a [`WindowStore`], which
//! must apply all of its operations as a single atomic unit.

mod memory;
mod redis;
mod reply;

pub use self::memory::{InMemoryStore, ReplyShape};
pub use self::redis::RedisStore;
pub use self::reply::{ReplyValue, WindowReply};

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a store while executing a window transaction.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Errors from the Redis client
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// One of the batched commands failed inside the transaction
    #[error("Store command failed: {0}")]
    Command(String),

    /// The store answered with something that is not a window reply
    #[error("Malformed store reply: {0}")]
    MalformedReply(String),

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time
    #[error("Store call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// One step of a window transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOp {
    /// Drop every hit scored within `[min, max]`.
    RemoveRangeByScore { min: i64, max: i64 },
    /// Count the hits left in the window.
    Cardinality,
    /// Record a hit.
    Add { score: i64, member: i64 },
    /// Read members by ascending score rank, inclusive on both ends.
    RangeByRank { start: isize, stop: isize },
    /// Re-arm the key's time to live.
    Expire { ttl_ms: u64 },
}

impl WindowOp {
    /// Name of the store command this step maps to.
    pub fn name(&self) -> &'static str {
        match self {
            WindowOp::RemoveRangeByScore { .. } => "zremrangebyscore",
            WindowOp::Cardinality => "zcard",
            WindowOp::Add { .. } => "zadd",
            WindowOp::RangeByRank { .. } => "zrange",
            WindowOp::Expire { .. } => "pexpire",
        }
    }
}

/// The five-step batch issued for every limiter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowTransaction {
    /// Store key of the window
    pub key: String,
    /// Timestamp of the current hit in microseconds
    pub now: i64,
    /// Oldest timestamp that is already outside the window
    pub start: i64,
    /// Time to live re-armed on the key, in milliseconds
    pub ttl_ms: u64,
}

impl WindowTransaction {
    /// Number of steps, and of replies a store returns.
    pub const STEPS: usize = 5;

    /// Build the transaction for one hit at `now` against a window of `duration_ms`.
    pub fn new(key: impl Into<String>, now: i64, duration_ms: u64) -> Self {
        let span = i64::try_from(duration_ms)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Self {
            key: key.into(),
            now,
            start: now.saturating_sub(span),
            ttl_ms: duration_ms,
        }
    }

    /// The steps in the order they must be applied.
    pub fn ops(&self) -> [WindowOp; Self::STEPS] {
        [
            WindowOp::RemoveRangeByScore {
                min: 0,
                max: self.start,
            },
            WindowOp::Cardinality,
            WindowOp::Add {
                score: self.now,
                member: self.now,
            },
            WindowOp::RangeByRank { start: 0, stop: 0 },
            WindowOp::Expire {
                ttl_ms: self.ttl_ms,
            },
        ]
    }
}

/// A store able to run window transactions atomically.
///
/// Implementations must guarantee that no other transaction on the same
/// key interleaves with the steps of one `execute` call, and must return
/// one reply per step (either flat or as `[name, result]` pairs).
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Execute the transaction and return the raw per-step replies.
    async fn execute(&self, tx: &WindowTransaction) -> Result<ReplyValue, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_window_bounds() {
        let tx = WindowTransaction::new("limit:x", 10_000_000, 2_000);
        assert_eq!(tx.start, 8_000_000);
        assert_eq!(tx.ttl_ms, 2_000);
        assert_eq!(tx.key, "limit:x");
    }

    #[test]
    fn test_transaction_step_order() {
        let tx = WindowTransaction::new("limit:x", 5_000_000, 1_000);
        let names: Vec<_> = tx.ops().iter().map(WindowOp::name).collect();
        assert_eq!(
            names,
            vec!["zremrangebyscore", "zcard", "zadd", "zrange", "pexpire"]
        );
    }

    #[test]
    fn test_transaction_ops_carry_timestamps() {
        let tx = WindowTransaction::new("limit:x", 5_000_000, 1_000);
        let ops = tx.ops();
        assert_eq!(
            ops[0],
            WindowOp::RemoveRangeByScore {
                min: 0,
                max: 4_000_000
            }
        );
        assert_eq!(
            ops[2],
            WindowOp::Add {
                score: 5_000_000,
                member: 5_000_000
            }
        );
        assert_eq!(ops[4], WindowOp::Expire { ttl_ms: 1_000 });
    }

    #[test]
    fn test_transaction_start_saturates() {
        let tx = WindowTransaction::new("limit:x", 10, u64::MAX);
        assert!(tx.start < 0);
    }
}
