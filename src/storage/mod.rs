//! In-Process Sorted-Set Store
//!
//! A [`MemoryStore`] executes the sorted-set command family locally with the
//! same reply shapes as a Redis server. It is a drop-in [`Channel`] for
//! embedding, tests and benchmarks.
//!
//! ## Modules
//!
//! - `zset`: the sorted-set data structure and score bounds
//! - `store`: sharded, thread-safe store implementing `Channel`
//! - `commands`: argument parsing and reply shaping per command
//!
//! [`Channel`]: crate::channel::Channel

pub mod commands;
pub mod store;
pub mod zset;

pub use store::MemoryStore;
pub use zset::{ScoreBound, SortedSetData};
