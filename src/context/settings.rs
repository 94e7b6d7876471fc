//! Per-endpoint settings.

use crate::channel::{Channel, Connector, SharedChannel};
use crate::connection::TcpConnector;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Where to send commands and which logical database to use.
///
/// Cloning is cheap; clones share the connector and therefore its cached
/// connection.
///
/// ```
/// use flashset::context::StoreSettings;
///
/// let settings = StoreSettings::tcp("127.0.0.1:6379").with_database(2);
/// assert_eq!(settings.database(), 2);
/// assert_eq!(settings.name(), "127.0.0.1:6379");
/// ```
#[derive(Clone)]
pub struct StoreSettings {
    name: String,
    database: i64,
    connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("name", &self.name)
            .field("database", &self.database)
            .field("endpoint", &self.connector.endpoint())
            .finish()
    }
}

impl StoreSettings {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            name: connector.endpoint(),
            database: 0,
            connector,
        }
    }

    /// Settings for a TCP endpoint such as `"127.0.0.1:6379"`. Nothing is
    /// opened until the first command.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::new(Arc::new(TcpConnector::new(addr)))
    }

    /// Same as [`tcp`](Self::tcp) with a custom connect timeout.
    pub fn tcp_with_timeout(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self::new(Arc::new(
            TcpConnector::new(addr).with_connect_timeout(connect_timeout),
        ))
    }

    /// Settings that always use `channel`, e.g. a
    /// [`MemoryStore`](crate::storage::MemoryStore).
    pub fn channel(channel: Arc<dyn Channel>) -> Self {
        Self::new(Arc::new(SharedChannel::new(channel)))
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> i64 {
        self.database
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Acquires a channel to this endpoint.
    pub async fn connect(&self) -> Result<Arc<dyn Channel>> {
        self.connector.connect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_channel_settings_share_the_store() {
        let store: Arc<dyn Channel> = Arc::new(MemoryStore::named("primary"));
        let settings = StoreSettings::channel(store.clone()).with_database(4);

        let channel = settings.connect().await.unwrap();

        assert!(Arc::ptr_eq(&channel, &store));
        assert_eq!(settings.name(), "memory://primary");
        assert_eq!(settings.database(), 4);
    }

    #[tokio::test]
    async fn test_unreachable_tcp_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let settings = StoreSettings::tcp_with_timeout(addr, Duration::from_millis(500));
        let err = match settings.connect().await {
            Ok(channel) => panic!("connected to {}", channel.describe()),
            Err(e) => e,
        };
        assert!(matches!(err, StoreError::ConnectionUnavailable { .. }));
    }
}
