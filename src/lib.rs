//! # FlashSet - Typed Sorted Sets over a RESP Store
//!
//! FlashSet gives Rust code a strongly-typed handle on a remote sorted set:
//! members are your own types, serialized by a pluggable converter, and every
//! operation maps to exactly one sorted-set command on a Redis-compatible
//! server.
//!
//! ## Features
//!
//! - **Typed Members**: JSON, string and raw-bytes converters, or your own
//! - **Three Contexts**: a single endpoint, a sharded group, or a batching
//!   transaction, chosen per handle
//! - **Async I/O**: Built on Tokio; handles are cheap to clone and share
//! - **In-Process Store**: a sharded in-memory backend speaking the same
//!   command family, for embedding and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              FlashSet                                │
//! │                                                                      │
//! │  ┌──────────────┐   ┌────────────────────┐   ┌──────────────────┐    │
//! │  │ SortedSet<T> │──>│ ConnectionContext  │──>│     Channel      │    │
//! │  │  + converter │   │ Standalone│Group│Tx │   │ TCP │ Memory │ Tx │    │
//! │  └──────────────┘   └────────────────────┘   └────────┬─────────┘    │
//! │                                                       │              │
//! │                      ┌─────────────┐                  ▼              │
//! │                      │   RESP      │<────────── Command / Reply      │
//! │                      │   Codec     │                                 │
//! │                      └─────────────┘                                 │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashset::context::StoreSettings;
//! use flashset::converter::StringConverter;
//! use flashset::sorted_set::{Order, ScoreRange, SortedSet};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = StoreSettings::tcp("127.0.0.1:6379").with_database(2);
//!     let board = SortedSet::from_settings(&settings, "leaderboard", StringConverter);
//!
//!     board.add(&"ariz".to_string(), 120.0).await?;
//!     board.increment(&"ariz".to_string(), 5.0).await?;
//!
//!     for entry in board.range_by_rank(0, 9, Order::Descending).await? {
//!         println!("{} {}", entry.member, entry.score);
//!     }
//!
//!     let mid = board.range_by_score(&ScoreRange::between(100.0, 200.0)).await?;
//!     println!("{} players between 100 and 200", mid.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Commands Used
//!
//! - `ZADD key score member`
//! - `ZCARD key` / `ZCOUNT key min max`
//! - `ZINCRBY key delta member`
//! - `ZRANGE` / `ZREVRANGE key start stop WITHSCORES`
//! - `ZRANGEBYSCORE key min max WITHSCORES [LIMIT offset count]`
//! - `ZREVRANGEBYSCORE key max min WITHSCORES [LIMIT offset count]`
//! - `ZRANK` / `ZREVRANK key member`
//! - `ZREM key member`
//! - `SELECT`, `MULTI`, `EXEC` for database selection and transactions
//!
//! ## Module Overview
//!
//! - [`sorted_set`]: the typed facade
//! - [`context`]: settings, shard groups, transactions and channel resolution
//! - [`channel`]: the transport abstraction every context resolves to
//! - [`connection`]: TCP transport
//! - [`storage`]: in-process store
//! - [`converter`]: member serialization
//! - [`protocol`]: RESP types, parser and command builder
//! - [`error`]: error taxonomy

pub mod channel;
pub mod connection;
pub mod context;
pub mod converter;
pub mod error;
pub mod protocol;
pub mod sorted_set;
pub mod storage;

// Re-export commonly used types for convenience
pub use channel::{Channel, Connector};
pub use context::{
    ConnectionContext, GroupResolver, KeyHashGroup, StoreSettings, Transaction, TransactionChannel,
};
pub use converter::{BytesConverter, JsonConverter, StringConverter, ValueConverter};
pub use error::{Result, StoreError};
pub use protocol::{Command, RespValue};
pub use sorted_set::{Order, ScoreRange, ScoredMember, SortedSet};
pub use storage::MemoryStore;

/// The default port of a RESP store (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host the CLI connects to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlashSet
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
