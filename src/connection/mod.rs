//! TCP Transport
//!
//! A thin, single-socket transport to a RESP store. It is deliberately
//! minimal: no pooling, no reconnect loop, no retries. Each failure is
//! returned to the caller; the [`TcpConnector`] opens a fresh socket the next
//! time a channel is requested after the old one broke.
//!
//! ```text
//! ┌──────────────┐  connect()  ┌──────────────┐  execute()   ┌───────────┐
//! │ TcpConnector │────────────>│  Connection  │─────────────>│  server   │
//! │ (per endpoint│             │ Mutex<socket>│<─────────────│           │
//! │  cached conn)│             └──────────────┘   reply      └───────────┘
//! └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use flashset::channel::{Channel, Connector};
//! use flashset::connection::TcpConnector;
//! use flashset::protocol::Command;
//!
//! let connector = TcpConnector::new("127.0.0.1:6379");
//! let channel = connector.connect().await?;
//! let reply = channel.execute(0, Command::new("ZCARD").arg("board")).await?;
//! ```

pub mod tcp;

pub use tcp::{Connection, ConnectionStats, TcpConnector, DEFAULT_CONNECT_TIMEOUT};
