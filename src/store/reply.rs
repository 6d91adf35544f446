//! Store-neutral reply values and their normalization into a window reading.

use super::{StoreError, WindowTransaction};

/// Raw reply tree returned by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyValue {
    /// Absent value
    Nil,
    /// Integer reply
    Int(i64),
    /// Bulk or status string
    Text(String),
    /// Nested replies
    Array(Vec<ReplyValue>),
    /// Error reported by the store for one step
    Error(String),
}

impl ReplyValue {
    /// Interpret the value as an integer, accepting decimal text.
    fn as_int(&self) -> Result<i64, StoreError> {
        match self {
            ReplyValue::Int(n) => Ok(*n),
            ReplyValue::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                StoreError::MalformedReply(format!("expected an integer, got {s:?}"))
            }),
            ReplyValue::Error(e) => Err(StoreError::Command(e.clone())),
            other => Err(StoreError::MalformedReply(format!(
                "expected an integer, got {other:?}"
            ))),
        }
    }
}

/// What the limiter needs out of a transaction reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReply {
    /// Hits in the window before the current one was recorded
    pub count: u64,
    /// Timestamp of the oldest surviving hit, in microseconds
    pub oldest: i64,
}

impl WindowReply {
    /// Normalize a raw reply into a window reading.
    ///
    /// Accepts the flat shape (`[r0, r1, r2, r3, r4]`) and the paired shape
    /// (`[[name_or_err, r0], [name_or_err, r1], ...]`). The shape is decided by
    /// the first element.
    pub fn parse(raw: ReplyValue) -> Result<Self, StoreError> {
        let steps = match raw {
            ReplyValue::Array(steps) => steps,
            ReplyValue::Error(e) => return Err(StoreError::Command(e)),
            other => {
                return Err(StoreError::MalformedReply(format!(
                    "expected an array of step replies, got {other:?}"
                )))
            }
        };

        if steps.len() < WindowTransaction::STEPS {
            return Err(StoreError::MalformedReply(format!(
                "expected {} step replies, got {}",
                WindowTransaction::STEPS,
                steps.len()
            )));
        }

        let paired = matches!(steps.first(), Some(ReplyValue::Array(_)));
        let results = steps
            .into_iter()
            .map(|step| if paired { unpair(step) } else { unflat(step) })
            .collect::<Result<Vec<_>, _>>()?;

        let count = results[1].as_int()?;
        let count = u64::try_from(count).map_err(|_| {
            StoreError::MalformedReply(format!("negative cardinality {count}"))
        })?;

        let oldest = match &results[3] {
            ReplyValue::Array(members) => members
                .first()
                .ok_or_else(|| StoreError::MalformedReply("window has no members".to_string()))?
                .as_int()?,
            other => other.as_int()?,
        };

        Ok(Self { count, oldest })
    }
}

fn unflat(step: ReplyValue) -> Result<ReplyValue, StoreError> {
    match step {
        ReplyValue::Error(e) => Err(StoreError::Command(e)),
        value => Ok(value),
    }
}

fn unpair(step: ReplyValue) -> Result<ReplyValue, StoreError> {
    let mut pair = match step {
        ReplyValue::Array(pair) => pair,
        other => {
            return Err(StoreError::MalformedReply(format!(
                "expected a [name, result] pair, got {other:?}"
            )))
        }
    };
    if pair.len() != 2 {
        return Err(StoreError::MalformedReply(format!(
            "expected a pair, got {} elements",
            pair.len()
        )));
    }
    if let ReplyValue::Error(e) = &pair[0] {
        return Err(StoreError::Command(e.clone()));
    }
    unflat(pair.swap_remove(1))
}
