//! Process-local store emulating Redis sorted sets.
//!
//! Useful for tests and single-node development. Every transaction runs
//! under one lock, which gives the same all-or-nothing behaviour a Redis
//! `MULTI`/`EXEC` block gives across processes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::{ReplyValue, StoreError, WindowOp, WindowStore, WindowTransaction};

/// How replies are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyShape {
    /// One result per step: `[r0, r1, r2, r3, r4]`
    #[default]
    Flat,
    /// One `[step-name, result]` pair per step
    Paired,
}

#[derive(Debug)]
enum Entry {
    /// Sorted set of `(score, member)`; members equal their scores here.
    Window {
        members: BTreeSet<(i64, i64)>,
        expires_at: Option<i64>,
    },
    /// A plain string value, used to reproduce type collisions.
    Text(#[allow(dead_code)] String),
}

#[derive(Debug, Default)]
struct Entries {
    keys: HashMap<String, Entry>,
    /// Never later than the earliest expiry of any window held.
    next_expiry: Option<i64>,
}

impl Entries {
    /// Drop every window whose TTL elapsed at or before `now`.
    fn sweep(&mut self, now: i64) {
        let before = self.keys.len();
        self.keys.retain(|_, entry| {
            !matches!(entry, Entry::Window { expires_at: Some(at), .. } if *at <= now)
        });
        self.next_expiry = self
            .keys
            .values()
            .filter_map(|entry| match entry {
                Entry::Window { expires_at, .. } => *expires_at,
                Entry::Text(_) => None,
            })
            .min();
        trace!(
            reclaimed = before - self.keys.len(),
            remaining = self.keys.len(),
            "Swept expired windows"
        );
    }
}

/// In-memory implementation of [`WindowStore`].
///
/// Expired windows are reclaimed by the first transaction that runs once the
/// earliest known expiry has passed, whichever key it touches.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<Entries>>,
    shape: ReplyShape,
}

impl InMemoryStore {
    /// Create an empty store replying in the flat shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store replying in the given shape.
    pub fn with_shape(shape: ReplyShape) -> Self {
        Self {
            entries: Arc::default(),
            shape,
        }
    }

    /// Store a plain string at `key`, so window transactions on it fail.
    pub fn put_string(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .keys
            .insert(key.to_string(), Entry::Text(value.to_string()));
    }

    /// Members of the window at `key`, oldest first.
    pub fn members(&self, key: &str) -> Option<Vec<i64>> {
        match self.entries.lock().keys.get(key)? {
            Entry::Window { members, .. } => Some(members.iter().map(|(_, m)| *m).collect()),
            Entry::Text(_) => None,
        }
    }

    /// Expiry of the window at `key`, in transaction-time microseconds.
    pub fn expires_at(&self, key: &str) -> Option<i64> {
        match self.entries.lock().keys.get(key)? {
            Entry::Window { expires_at, .. } => *expires_at,
            Entry::Text(_) => None,
        }
    }

    /// Number of keys currently held.
    ///
    /// Expired windows count until the next transaction sweeps them.
    pub fn len(&self) -> usize {
        self.entries.lock().keys.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().keys.is_empty()
    }

    fn apply(&self, tx: &WindowTransaction) -> Result<Vec<ReplyValue>, StoreError> {
        let mut guard = self.entries.lock();
        if guard.next_expiry.is_some_and(|at| at <= tx.now) {
            guard.sweep(tx.now);
        }

        let Entries { keys, next_expiry } = &mut *guard;
        let entry = keys
            .entry(tx.key.clone())
            .or_insert_with(|| Entry::Window {
                members: BTreeSet::new(),
                expires_at: None,
            });
        // A type collision fails before any step is applied.
        let Entry::Window {
            members,
            expires_at,
        } = entry
        else {
            return Err(StoreError::Command(format!(
                "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
                tx.key
            )));
        };

        let mut replies = Vec::with_capacity(WindowTransaction::STEPS);
        for op in tx.ops() {
            let reply = match op {
                WindowOp::RemoveRangeByScore { min, max } => {
                    let before = members.len();
                    members.retain(|(score, _)| *score < min || *score > max);
                    ReplyValue::Int((before - members.len()) as i64)
                }
                WindowOp::Cardinality => ReplyValue::Int(members.len() as i64),
                WindowOp::Add { score, member } => {
                    // Members are unique; a re-added member only moves its score.
                    let existed = members.iter().any(|(_, m)| *m == member);
                    members.retain(|(_, m)| *m != member);
                    members.insert((score, member));
                    ReplyValue::Int(if existed { 0 } else { 1 })
                }
                WindowOp::RangeByRank { start, stop } => {
                    ReplyValue::Array(range_by_rank(members, start, stop))
                }
                WindowOp::Expire { ttl_ms } => {
                    let ttl_micros = i64::try_from(ttl_ms)
                        .unwrap_or(i64::MAX)
                        .saturating_mul(1000);
                    let at = tx.now.saturating_add(ttl_micros);
                    *expires_at = Some(at);
                    *next_expiry = Some(next_expiry.map_or(at, |next| next.min(at)));
                    ReplyValue::Int(1)
                }
            };
            replies.push(reply);
        }

        Ok(replies)
    }
}

fn range_by_rank(members: &BTreeSet<(i64, i64)>, start: isize, stop: isize) -> Vec<ReplyValue> {
    let len = members.len() as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Vec::new();
    }
    members
        .iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
        .map(|(_, member)| ReplyValue::Text(member.to_string()))
        .collect()
}

#[async_trait]
impl WindowStore for InMemoryStore {
    async fn execute(&self, tx: &WindowTransaction) -> Result<ReplyValue, StoreError> {
        let replies = self.apply(tx)?;
        let ops = tx.ops();
        let reply = match self.shape {
            ReplyShape::Flat => ReplyValue::Array(replies),
            ReplyShape::Paired => ReplyValue::Array(
                ops.iter()
                    .zip(replies)
                    .map(|(op, value)| {
                        ReplyValue::Array(vec![ReplyValue::Text(op.name().to_string()), value])
                    })
                    .collect(),
            ),
        };
        Ok(reply)
    }
}
