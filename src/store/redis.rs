//! Redis-backed window store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Pipeline, Value};
use tracing::{info, trace};

use super::{ReplyValue, StoreError, WindowOp, WindowStore, WindowTransaction};
use crate::config::RedisConfig;

/// A [`WindowStore`] that keeps each window in a Redis sorted set.
///
/// The five steps go out as one `MULTI`/`EXEC` pipeline, so Redis applies
/// them without interleaving other clients' commands.
///
/// A timed-out call is reported as [`StoreError::Timeout`], but the pipeline
/// already sent is not withdrawn and may still be applied by Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
    timeout: Option<Duration>,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!(url = %url, "Connecting window store to Redis");
        let client = Client::open(url)?;
        let connection_manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::from_connection_manager(connection_manager))
    }

    /// Connect using the Redis section of the configuration.
    pub async fn from_config(config: &RedisConfig) -> Result<Self, StoreError> {
        let store = Self::connect(&config.url).await?;
        Ok(match config.timeout() {
            Some(timeout) => store.with_timeout(timeout),
            None => store,
        })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_manager,
            timeout: None,
        }
    }

    /// Fail calls that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn pipeline(tx: &WindowTransaction) -> Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in tx.ops() {
            let cmd = pipe.cmd(op.name()).arg(&tx.key);
            match op {
                WindowOp::RemoveRangeByScore { min, max } => cmd.arg(min).arg(max),
                WindowOp::Cardinality => cmd,
                WindowOp::Add { score, member } => cmd.arg(score).arg(member),
                WindowOp::RangeByRank { start, stop } => cmd.arg(start).arg(stop),
                WindowOp::Expire { ttl_ms } => cmd.arg(ttl_ms),
            };
        }
        pipe
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn execute(&self, tx: &WindowTransaction) -> Result<ReplyValue, StoreError> {
        trace!(key = %tx.key, "Executing window transaction on Redis");
        let mut connection_manager = self.connection_manager.clone();
        let pipe = Self::pipeline(tx);
        let query = async {
            let replies: Vec<Value> = pipe.query_async(&mut connection_manager).await?;
            Ok::<_, StoreError>(replies)
        };

        let replies = within(self.timeout, query).await?;
        Ok(ReplyValue::Array(replies.into_iter().map(reply_from_redis).collect()))
    }
}

async fn within<T>(
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(timeout))?,
        None => call.await,
    }
}

/// Rebuild the server's own error line, e.g. `WRONGTYPE Operation against ...`.
fn server_error_text(code: &str, details: Option<&str>) -> String {
    match details {
        Some(details) => format!("{code} {details}"),
        None => code.to_string(),
    }
}

fn reply_from_redis(value: Value) -> ReplyValue {
    match value {
        Value::Nil => ReplyValue::Nil,
        Value::Int(n) => ReplyValue::Int(n),
        Value::BulkString(bytes) => ReplyValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(s) => ReplyValue::Text(s),
        Value::Okay => ReplyValue::Text("OK".to_string()),
        Value::Array(items) | Value::Set(items) => {
            ReplyValue::Array(items.into_iter().map(reply_from_redis).collect())
        }
        Value::ServerError(err) => {
            ReplyValue::Error(server_error_text(err.code(), err.details()))
        }
        other => ReplyValue::Text(format!("{other:?}")),
    }
}
