//! Typed Sorted-Set Handle
//!
//! [`SortedSet<T, C>`] binds a key, a database index, a member converter and
//! a [`ConnectionContext`]. Each operation encodes its arguments, resolves a
//! channel, sends exactly one command and decodes the reply into `T`.
//!
//! | Operation          | Command                                         |
//! |--------------------|-------------------------------------------------|
//! | `add`              | `ZADD key score member`                         |
//! | `len`              | `ZCARD key`                                     |
//! | `len_by_score`     | `ZCOUNT key min max`                            |
//! | `increment`        | `ZINCRBY key delta member`                      |
//! | `increment_many`   | one `ZINCRBY` per member                        |
//! | `range_by_rank`    | `ZRANGE` / `ZREVRANGE key start stop WITHSCORES`|
//! | `range_by_score`   | `ZRANGEBYSCORE` / `ZREVRANGEBYSCORE ... WITHSCORES [LIMIT]` |
//! | `rank`             | `ZRANK` / `ZREVRANK key member`                 |
//! | `remove`           | `ZREM key member`                               |
//!
//! ## Example
//!
//! ```
//! use flashset::context::StoreSettings;
//! use flashset::converter::StringConverter;
//! use flashset::sorted_set::{Order, SortedSet};
//! use flashset::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let settings = StoreSettings::channel(Arc::new(MemoryStore::new()));
//! let board: SortedSet<String, _> = SortedSet::from_settings(&settings, "board", StringConverter);
//!
//! board.add(&"ariz".to_string(), 10.0).await.unwrap();
//! board.add(&"kai".to_string(), 20.0).await.unwrap();
//!
//! let top = board.range_by_rank(0, 0, Order::Descending).await.unwrap();
//! assert_eq!(top[0].member, "kai");
//! # });
//! ```

use crate::context::{ConnectionContext, GroupResolver, StoreSettings, Transaction};
use crate::converter::ValueConverter;
use crate::error::{check_reply, Result, StoreError};
use crate::protocol::{format_bound, Command, RespValue};
use futures::future::join_all;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// Lower end of an unbounded score range.
pub const MIN_SCORE: f64 = f64::NEG_INFINITY;

/// Upper end of an unbounded score range.
pub const MAX_SCORE: f64 = f64::INFINITY;

/// Default number of matching members to skip.
pub const DEFAULT_OFFSET: i64 = 0;

/// Default page size: every matching member.
pub const UNBOUNDED_COUNT: i64 = i64::MAX;

/// Traversal direction for ranges and ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Lowest score first
    #[default]
    Ascending,
    /// Highest score first
    Descending,
}

impl Order {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            Order::Ascending
        } else {
            Order::Descending
        }
    }

    pub fn is_descending(self) -> bool {
        self == Order::Descending
    }
}

/// A score-range query. `ScoreRange::default()` selects every member in
/// ascending order: `[MIN_SCORE, MAX_SCORE]`, both ends inclusive, offset
/// `DEFAULT_OFFSET`, count `UNBOUNDED_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
    pub order: Order,
    /// Matches to skip after filtering and sorting
    pub offset: i64,
    /// Matches to return after `offset`
    pub count: i64,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self {
            min: MIN_SCORE,
            max: MAX_SCORE,
            min_inclusive: true,
            max_inclusive: true,
            order: Order::Ascending,
            offset: DEFAULT_OFFSET,
            count: UNBOUNDED_COUNT,
        }
    }
}

impl ScoreRange {
    /// `[min, max]`, everything else at defaults.
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    pub fn exclude_min(mut self) -> Self {
        self.min_inclusive = false;
        self
    }

    pub fn exclude_max(mut self) -> Self {
        self.max_inclusive = false;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, offset: i64, count: i64) -> Self {
        self.offset = offset;
        self.count = count;
        self
    }

    fn is_paged(&self) -> bool {
        self.offset != DEFAULT_OFFSET || self.count != UNBOUNDED_COUNT
    }
}

/// A member together with its score, as returned by range queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember<T> {
    pub member: T,
    pub score: f64,
}

/// Handle to one sorted set on one logical database.
///
/// The handle owns no connection and no mutable state; clones are cheap and
/// may be used from any number of tasks at once.
pub struct SortedSet<T, C> {
    key: String,
    database: i64,
    converter: Arc<C>,
    context: ConnectionContext,
    _member: PhantomData<fn() -> T>,
}

impl<T, C> Clone for SortedSet<T, C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            database: self.database,
            converter: Arc::clone(&self.converter),
            context: self.context.clone(),
            _member: PhantomData,
        }
    }
}

impl<T, C> std::fmt::Debug for SortedSet<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedSet")
            .field("key", &self.key)
            .field("database", &self.database)
            .field("context", &self.context)
            .finish()
    }
}

impl<T, C> SortedSet<T, C>
where
    C: ValueConverter<T>,
{
    pub fn new(
        context: ConnectionContext,
        database: i64,
        key: impl Into<String>,
        converter: Arc<C>,
    ) -> Self {
        Self {
            key: key.into(),
            database,
            converter,
            context,
            _member: PhantomData,
        }
    }

    /// Handle on the endpoint and database of `settings`.
    pub fn from_settings(settings: &StoreSettings, key: impl Into<String>, converter: C) -> Self {
        Self::new(
            ConnectionContext::Standalone(settings.clone()),
            settings.database(),
            key,
            Arc::new(converter),
        )
    }

    /// Handle on a shard group. The database index is taken from the
    /// settings the group assigns to `key`.
    pub fn from_group(
        group: Arc<dyn GroupResolver>,
        key: impl Into<String>,
        converter: C,
    ) -> Result<Self> {
        let key = key.into();
        let database = group.resolve(&key)?.database();
        Ok(Self::new(
            ConnectionContext::Group(group),
            database,
            key,
            Arc::new(converter),
        ))
    }

    /// Handle whose commands are queued on `tx`.
    pub fn from_transaction(tx: &Transaction, key: impl Into<String>, converter: C) -> Self {
        Self::new(
            ConnectionContext::from(tx),
            tx.database(),
            key,
            Arc::new(converter),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn database(&self) -> i64 {
        self.database
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    fn command(&self, name: &'static str) -> Command {
        Command::new(name).arg(self.key.clone())
    }

    /// Resolves a channel, sends one command and turns error replies into
    /// `RemoteCommand` failures.
    async fn send(&self, command: Command) -> Result<RespValue> {
        let channel = self.context.resolve(&self.key).await?;
        trace!(
            key = %self.key,
            database = self.database,
            command = command.name(),
            "Sending"
        );
        check_reply(channel.execute(self.database, command).await?)
    }

    async fn send_integer(&self, command: Command) -> Result<i64> {
        let name = command.name();
        match self.send(command).await? {
            RespValue::Integer(n) => Ok(n),
            other => Err(StoreError::unexpected(name, other)),
        }
    }

    async fn send_score(&self, command: Command) -> Result<f64> {
        let name = command.name();
        let reply = self.send(command).await?;
        reply
            .as_f64()
            .ok_or_else(|| StoreError::unexpected(name, reply))
    }

    async fn send_range(&self, command: Command) -> Result<Vec<ScoredMember<T>>> {
        let name = command.name();
        match self.send(command).await? {
            RespValue::Array(items) => self.decode_pairs(name, items),
            other => Err(StoreError::unexpected(name, other)),
        }
    }

    /// Decodes a `WITHSCORES` reply: member, score, member, score, ...
    fn decode_pairs(&self, name: &'static str, items: Vec<RespValue>) -> Result<Vec<ScoredMember<T>>> {
        if items.len() % 2 != 0 {
            return Err(StoreError::unexpected(name, RespValue::Array(items)));
        }

        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(member), Some(score)) = (items.next(), items.next()) {
            let bytes = member
                .as_bytes()
                .ok_or_else(|| StoreError::unexpected(name, member.clone()))?;
            let score_value = score
                .as_f64()
                .ok_or_else(|| StoreError::unexpected(name, score.clone()))?;
            pairs.push(ScoredMember {
                member: self.converter.deserialize(bytes)?,
                score: score_value,
            });
        }
        Ok(pairs)
    }

    /// Adds `member` with `score`, or re-scores it if already present.
    /// Returns true if the member is new.
    ///
    /// Infinite scores are valid. NaN is sent unchanged and rejected by the
    /// store as a `RemoteCommand` failure.
    pub async fn add(&self, member: &T, score: f64) -> Result<bool> {
        let member = self.converter.serialize(member)?;
        let added = self
            .send_integer(self.command("ZADD").score(score).arg(member))
            .await?;
        Ok(added > 0)
    }

    /// Number of members.
    pub async fn len(&self) -> Result<i64> {
        self.send_integer(self.command("ZCARD")).await
    }

    /// Number of members with `min <= score <= max`.
    pub async fn len_by_score(&self, min: f64, max: f64) -> Result<i64> {
        self.send_integer(
            self.command("ZCOUNT")
                .arg(format_bound(min, true))
                .arg(format_bound(max, true)),
        )
        .await
    }

    /// Atomically adds `delta` to the member's score and returns the new
    /// score. An absent member is created with score `delta`.
    pub async fn increment(&self, member: &T, delta: f64) -> Result<f64> {
        let member = self.converter.serialize(member)?;
        self.send_score(self.command("ZINCRBY").score(delta).arg(member))
            .await
    }

    /// Increments every member by `delta`.
    ///
    /// Each member is an independent `ZINCRBY`; the batch as a whole is not
    /// atomic, and results come back per member in input order. One member
    /// failing leaves the others applied.
    pub async fn increment_many(&self, members: &[T], delta: f64) -> Vec<Result<f64>> {
        join_all(members.iter().map(|member| self.increment(member, delta))).await
    }

    /// Members whose rank lies in `[start, stop]`, with scores. Indices are
    /// 0-based; negative ones count from the end (`-1` is the last member).
    pub async fn range_by_rank(
        &self,
        start: i64,
        stop: i64,
        order: Order,
    ) -> Result<Vec<ScoredMember<T>>> {
        let name = if order.is_descending() {
            "ZREVRANGE"
        } else {
            "ZRANGE"
        };
        self.send_range(self.command(name).int(start).int(stop).arg("WITHSCORES"))
            .await
    }

    /// Members whose score lies in the range, sorted per `range.order`, then
    /// paged by `range.offset`/`range.count`.
    pub async fn range_by_score(&self, range: &ScoreRange) -> Result<Vec<ScoredMember<T>>> {
        let min = format_bound(range.min, range.min_inclusive);
        let max = format_bound(range.max, range.max_inclusive);

        // The descending command takes its bounds high end first.
        let mut command = if range.order.is_descending() {
            self.command("ZREVRANGEBYSCORE").arg(max).arg(min)
        } else {
            self.command("ZRANGEBYSCORE").arg(min).arg(max)
        }
        .arg("WITHSCORES");

        if range.is_paged() {
            command = command.arg("LIMIT").int(range.offset).int(range.count);
        }

        self.send_range(command).await
    }

    /// 0-based position of `member` under `order`, or `None` if absent.
    pub async fn rank(&self, member: &T, order: Order) -> Result<Option<i64>> {
        let member = self.converter.serialize(member)?;
        let name = if order.is_descending() {
            "ZREVRANK"
        } else {
            "ZRANK"
        };
        match self.send(self.command(name).arg(member)).await? {
            RespValue::Integer(rank) => Ok(Some(rank)),
            RespValue::Null => Ok(None),
            other => Err(StoreError::unexpected(name, other)),
        }
    }

    /// Removes `member`. Returns true if it was present.
    pub async fn remove(&self, member: &T) -> Result<bool> {
        let member = self.converter.serialize(member)?;
        let removed = self.send_integer(self.command("ZREM").arg(member)).await?;
        Ok(removed > 0)
    }
}
