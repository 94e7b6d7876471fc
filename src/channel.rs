//! Command channels.
//!
//! A [`Channel`] is anything that can run commands against one logical
//! store: a TCP [`Connection`](crate::connection::Connection), the in-process
//! [`MemoryStore`](crate::storage::MemoryStore), or a
//! [`Transaction`](crate::context::Transaction) that queues commands until it
//! is executed. A [`Connector`] hands out channels on demand.

use crate::error::Result;
use crate::protocol::{Command, RespValue};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Channel: Send + Sync {
    /// Runs one command on `database` and returns its raw reply.
    ///
    /// Error replies are returned as `RespValue::Error`, not as `Err`; `Err`
    /// means the command could not be delivered or answered.
    async fn execute(&self, database: i64, command: Command) -> Result<RespValue>;

    /// Runs `commands` as one atomic batch on `database`, in order, and
    /// returns one reply per command.
    async fn execute_batch(&self, database: i64, commands: Vec<Command>) -> Result<Vec<RespValue>>;

    /// Endpoint description for logs and errors.
    fn describe(&self) -> String;
}

/// Acquires a channel to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Channel>>;

    fn endpoint(&self) -> String;
}

/// Connector that always hands out the same channel. Wraps in-process
/// stores, or any channel the caller manages itself.
#[derive(Clone)]
pub struct SharedChannel(Arc<dyn Channel>);

impl SharedChannel {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self(channel)
    }
}

#[async_trait]
impl Connector for SharedChannel {
    async fn connect(&self) -> Result<Arc<dyn Channel>> {
        Ok(Arc::clone(&self.0))
    }

    fn endpoint(&self) -> String {
        self.0.describe()
    }
}
