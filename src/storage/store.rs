//! Thread-Safe In-Process Store
//!
//! `MemoryStore` keeps sorted sets for any number of logical databases and
//! answers the sorted-set command family through the [`Channel`] trait.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MemoryStore                          │
//! │   gate: RwLock<()>   shared by single commands,              │
//! │                      exclusive for MULTI/EXEC style batches  │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐             │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │             │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │             │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │             │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards by hashing `(database, key)`, so
//! commands on different keys only contend on the shared gate.

use crate::channel::Channel;
use crate::error::Result;
use crate::protocol::{Command, RespValue};
use crate::storage::commands;
use crate::storage::zset::SortedSetData;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::trace;

/// Number of shards for the store.
const NUM_SHARDS: usize = 64;

type ShardMap = HashMap<(i64, Bytes), SortedSetData>;

/// In-process sorted-set store.
///
/// # Example
///
/// ```
/// use flashset::channel::Channel;
/// use flashset::protocol::{Command, RespValue};
/// use flashset::storage::MemoryStore;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let reply = store
///     .execute(0, Command::new("ZADD").arg("board").score(10.0).arg("ariz"))
///     .await
///     .unwrap();
/// assert_eq!(reply, RespValue::Integer(1));
/// # });
/// ```
pub struct MemoryStore {
    name: String,
    shards: Vec<RwLock<ShardMap>>,
    gate: RwLock<()>,
    commands_executed: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("keys", &self.key_count())
            .field("commands_executed", &self.commands_executed())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Creates a store whose name shows up in `describe()` and logs, useful
    /// when several stores stand in for several endpoints.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            gate: RwLock::new(()),
            commands_executed: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn shard(&self, database: i64, key: &[u8]) -> &RwLock<ShardMap> {
        let mut hasher = DefaultHasher::new();
        database.hash(&mut hasher);
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Reads the set at `key`, or returns `None` if it does not exist.
    pub(crate) fn read<R>(
        &self,
        database: i64,
        key: &Bytes,
        f: impl FnOnce(&SortedSetData) -> R,
    ) -> Option<R> {
        let shard = self.shard(database, key).read().unwrap();
        shard.get(&(database, key.clone())).map(f)
    }

    /// Mutates the set at `key`, creating it first if needed. A set left
    /// empty is removed, as a Redis server does.
    pub(crate) fn update<R>(
        &self,
        database: i64,
        key: &Bytes,
        f: impl FnOnce(&mut SortedSetData) -> R,
    ) -> R {
        let mut shard = self.shard(database, key).write().unwrap();
        let map_key = (database, key.clone());
        let set = shard.entry(map_key.clone()).or_default();
        let result = f(set);
        if set.is_empty() {
            shard.remove(&map_key);
        }
        result
    }

    /// Number of non-empty sorted sets across all databases.
    pub fn key_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap().len()).sum()
    }

    pub fn commands_executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }

    /// Removes every key from every database.
    pub fn flush(&self) {
        let _gate = self.gate.write().unwrap();
        for shard in &self.shards {
            shard.write().unwrap().clear();
        }
    }

    fn run(&self, database: i64, command: &Command) -> RespValue {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        let reply = commands::execute(self, database, command.name(), command.args());
        trace!(store = %self.name, database, command = %command, reply = %reply, "Executed");
        reply
    }

    fn run_one(&self, database: i64, command: &Command) -> RespValue {
        let _gate = self.gate.read().unwrap();
        self.run(database, command)
    }

    fn run_batch(&self, database: i64, commands: &[Command]) -> Vec<RespValue> {
        let _gate = self.gate.write().unwrap();
        commands.iter().map(|c| self.run(database, c)).collect()
    }
}

#[async_trait]
impl Channel for MemoryStore {
    async fn execute(&self, database: i64, command: Command) -> Result<RespValue> {
        Ok(self.run_one(database, &command))
    }

    async fn execute_batch(&self, database: i64, commands: Vec<Command>) -> Result<Vec<RespValue>> {
        Ok(self.run_batch(database, &commands))
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_databases_are_isolated() {
        let store = MemoryStore::new();
        store
            .execute(0, Command::new("ZADD").arg("k").score(1.0).arg("a"))
            .await
            .unwrap();

        let in_db1 = store.execute(1, Command::new("ZCARD").arg("k")).await.unwrap();
        let in_db0 = store.execute(0, Command::new("ZCARD").arg("k")).await.unwrap();

        assert_eq!(in_db1, RespValue::integer(0));
        assert_eq!(in_db0, RespValue::integer(1));
    }

    #[tokio::test]
    async fn test_batch_runs_in_order() {
        let store = MemoryStore::new();
        let replies = store
            .execute_batch(
                2,
                vec![
                    Command::new("ZINCRBY").arg("k").score(1.0).arg("a"),
                    Command::new("ZINCRBY").arg("k").score(1.0).arg("a"),
                    Command::new("ZSCORE").arg("k").arg("a"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[1].as_f64(), Some(2.0));
        assert_eq!(replies[2].as_f64(), Some(2.0));
        assert_eq!(store.commands_executed(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store
                        .execute(0, Command::new("ZINCRBY").arg("k").score(1.0).arg("a"))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let score = store
            .execute(0, Command::new("ZSCORE").arg("k").arg("a"))
            .await
            .unwrap();
        assert_eq!(score.as_f64(), Some(800.0));
    }

    #[test]
    fn test_flush() {
        let store = MemoryStore::new();
        store.update(0, &Bytes::from("a"), |set| set.insert(Bytes::from("m"), 1.0));
        store.update(3, &Bytes::from("b"), |set| set.insert(Bytes::from("m"), 1.0));
        assert_eq!(store.key_count(), 2);
        store.flush();
        assert_eq!(store.key_count(), 0);
    }
}
