//! Connection Context Resolution
//!
//! Every handle is bound to one [`ConnectionContext`], which decides the
//! channel each of its commands runs on:
//!
//! ```text
//! Standalone(settings) ──────────────> settings.connect()
//! Group(resolver) ──> resolve(key) ──> settings.connect()
//! Transaction(ch) ───────────────────> ch (queues until exec)
//! ```
//!
//! Resolution only reads the context. It takes no locks of its own, so
//! handles resolving concurrently never wait on each other here; whatever
//! waiting happens belongs to the connector or the transport.

pub mod group;
pub mod settings;
pub mod transaction;

pub use group::{GroupResolver, KeyHashGroup};
pub use settings::StoreSettings;
pub use transaction::{Transaction, TransactionChannel, TransactionState};

use crate::channel::Channel;
use crate::error::Result;
use std::sync::Arc;
use tracing::trace;

/// The logical store a handle talks to.
#[derive(Clone)]
pub enum ConnectionContext {
    /// A single endpoint.
    Standalone(StoreSettings),
    /// A sharded group; the key picks the endpoint.
    Group(Arc<dyn GroupResolver>),
    /// An open transaction; commands are queued until it is executed. The
    /// context does not keep the transaction alive.
    Transaction(TransactionChannel),
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionContext::Standalone(settings) => {
                f.debug_tuple("Standalone").field(settings).finish()
            }
            ConnectionContext::Group(_) => f.write_str("Group(..)"),
            ConnectionContext::Transaction(ch) => f.debug_tuple("Transaction").field(ch).finish(),
        }
    }
}

impl From<StoreSettings> for ConnectionContext {
    fn from(settings: StoreSettings) -> Self {
        ConnectionContext::Standalone(settings)
    }
}

impl From<&Transaction> for ConnectionContext {
    fn from(tx: &Transaction) -> Self {
        ConnectionContext::Transaction(tx.channel())
    }
}

impl ConnectionContext {
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionContext::Standalone(_) => "standalone",
            ConnectionContext::Group(_) => "group",
            ConnectionContext::Transaction(_) => "transaction",
        }
    }

    /// Yields the channel for one command on `key`.
    ///
    /// Fails with `ConnectionUnavailable` when no endpoint can be reached or
    /// the group is empty. Never retries.
    pub async fn resolve(&self, key: &str) -> Result<Arc<dyn Channel>> {
        let channel: Arc<dyn Channel> = match self {
            ConnectionContext::Standalone(settings) => settings.connect().await?,
            ConnectionContext::Group(group) => group.resolve(key)?.connect().await?,
            ConnectionContext::Transaction(ch) => Arc::new(ch.clone()),
        };
        trace!(key, context = self.kind(), channel = %channel.describe(), "Resolved channel");
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_standalone_resolves_to_settings_channel() {
        let store = Arc::new(MemoryStore::named("solo"));
        let context = ConnectionContext::from(StoreSettings::channel(store));

        let channel = context.resolve("k").await.unwrap();
        assert_eq!(channel.describe(), "memory://solo");
    }

    #[tokio::test]
    async fn test_group_resolution_is_stable() {
        let nodes = (0..3)
            .map(|i| StoreSettings::channel(Arc::new(MemoryStore::named(format!("n{}", i)))))
            .collect();
        let context = ConnectionContext::Group(Arc::new(KeyHashGroup::new("g", nodes)));

        for key in ["alpha", "beta", "gamma", "delta"] {
            let first = context.resolve(key).await.unwrap().describe();
            let second = context.resolve(key).await.unwrap().describe();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_empty_group_fails() {
        let context = ConnectionContext::Group(Arc::new(KeyHashGroup::new("empty", Vec::new())));
        let err = match context.resolve("k").await {
            Ok(channel) => panic!("resolved to {}", channel.describe()),
            Err(e) => e,
        };
        assert!(matches!(err, StoreError::ConnectionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_transaction_opens_nothing() {
        let store = Arc::new(MemoryStore::named("tx"));
        let tx = Transaction::new(store.clone(), 0);
        let context = ConnectionContext::from(&tx);

        let channel = context.resolve("k").await.unwrap();

        assert_eq!(channel.describe(), "transaction(memory://tx)");
        assert_eq!(store.commands_executed(), 0);
    }

    #[tokio::test]
    async fn test_transaction_context_does_not_outlive_transaction() {
        let store = Arc::new(MemoryStore::named("tx"));
        let tx = Transaction::new(store.clone(), 0);
        let context = ConnectionContext::from(&tx);
        drop(tx);

        let channel = context.resolve("k").await.unwrap();
        let result = channel
            .execute(0, crate::protocol::Command::new("ZCARD").arg("k"))
            .await;
        assert!(matches!(result, Err(StoreError::TransactionAborted)));
    }
}
