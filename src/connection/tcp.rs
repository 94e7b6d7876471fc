//! TCP Connection
//!
//! One socket to one store endpoint. Requests on a socket are strictly
//! request/response, so the connection keeps a single exchange in flight and
//! queues the rest behind an async mutex.
//!
//! ## Exchange Lifecycle
//!
//! ```text
//! lock ──> SELECT db (if changed) ──> write command ──> read reply(s) ──> unlock
//! ```
//!
//! ## Broken Connections
//!
//! If an exchange fails half way (I/O error, malformed reply, or the caller
//! dropped the future mid-request) the remaining bytes on the socket can no
//! longer be matched to requests. The connection then marks itself broken
//! and every later call fails with `ConnectionUnavailable`; a
//! [`TcpConnector`] replaces a broken connection on the next resolution.

use crate::channel::{Channel, Connector};
use crate::error::{check_reply, Result, StoreError};
use crate::protocol::{Command, RespParser, RespValue};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Maximum size of buffered, unparsed reply data (64 MB)
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Default timeout for establishing the TCP connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Traffic counters for one connection
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Commands written, including `SELECT`, `MULTI` and `EXEC`
    pub commands_sent: AtomicU64,
    /// Error replies received
    pub error_replies: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn commands_sent(&self, count: usize) {
        self.commands_sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn error_reply(&self) {
        self.error_replies.fetch_add(1, Ordering::Relaxed);
    }

    fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Socket state guarded by the connection mutex.
struct Exchange {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
    /// Database currently selected on the server side of this socket
    database: i64,
    /// Set while a request is on the wire; still set on lock acquisition
    /// means the previous caller was cancelled mid-exchange.
    in_flight: bool,
}

/// A client connection to a RESP store.
pub struct Connection {
    addr: String,
    exchange: Mutex<Exchange>,
    broken: AtomicBool,
    stats: ConnectionStats,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("broken", &self.is_broken())
            .finish()
    }
}

impl Connection {
    /// Opens a connection, failing with `ConnectionUnavailable` if the
    /// endpoint cannot be reached within `connect_timeout`.
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(setup_failed(addr, e)),
            Err(_) => {
                return Err(StoreError::unavailable(
                    addr,
                    format!("connect timed out after {:?}", connect_timeout),
                ))
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|e| setup_failed(addr, e))?;

        debug!(endpoint = %addr, "Connected");

        Ok(Self {
            addr: addr.to_string(),
            exchange: Mutex::new(Exchange {
                stream: BufWriter::new(stream),
                buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
                parser: RespParser::new(),
                database: 0,
                in_flight: false,
            }),
            broken: AtomicBool::new(false),
            stats: ConnectionStats::new(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Locks the socket, refusing if it is no longer usable.
    async fn begin(&self) -> Result<tokio::sync::MutexGuard<'_, Exchange>> {
        let mut exchange = self.exchange.lock().await;
        if exchange.in_flight {
            warn!(endpoint = %self.addr, "Previous request was abandoned mid-exchange");
            self.broken.store(true, Ordering::Release);
        }
        if self.is_broken() {
            return Err(StoreError::unavailable(&self.addr, "connection is broken"));
        }
        exchange.in_flight = true;
        Ok(exchange)
    }

    /// Records the outcome of an exchange. Transport failures poison the socket.
    fn finish<T>(&self, exchange: &mut Exchange, result: Result<T>) -> Result<T> {
        match &result {
            Err(e) if e.is_connection_error() => {
                warn!(endpoint = %self.addr, error = %e, "Connection failed");
                self.broken.store(true, Ordering::Release);
            }
            _ => exchange.in_flight = false,
        }
        result
    }

    async fn round_trip(&self, exchange: &mut Exchange, database: i64, command: &Command) -> Result<RespValue> {
        self.select(exchange, database).await?;
        self.send(exchange, &[command]).await?;
        let reply = self.read_reply(exchange).await?;
        if reply.is_error() {
            self.stats.error_reply();
        }
        Ok(reply)
    }

    async fn round_trip_batch(
        &self,
        exchange: &mut Exchange,
        database: i64,
        commands: &[Command],
    ) -> Result<Vec<RespValue>> {
        self.select(exchange, database).await?;

        let multi = Command::new("MULTI");
        let exec = Command::new("EXEC");
        let mut pipeline = Vec::with_capacity(commands.len() + 2);
        pipeline.push(&multi);
        pipeline.extend(commands.iter());
        pipeline.push(&exec);
        self.send(exchange, &pipeline).await?;

        // Every reply must be drained before judging any of them, or the
        // socket would be left holding replies nobody reads.
        let mut queued = Vec::with_capacity(commands.len() + 1);
        for _ in 0..commands.len() + 1 {
            queued.push(self.read_reply(exchange).await?);
        }
        let exec_reply = self.read_reply(exchange).await?;

        check_reply(queued.remove(0))?;
        if let Some(RespValue::Error(msg)) = queued.into_iter().find(RespValue::is_error) {
            self.stats.error_reply();
            debug!(endpoint = %self.addr, error = %msg, "Command rejected while queueing");
        }

        match check_reply(exec_reply)? {
            RespValue::Array(replies) if replies.len() == commands.len() => Ok(replies),
            RespValue::Null => Err(StoreError::TransactionAborted),
            other => Err(StoreError::unexpected("EXEC", other)),
        }
    }

    async fn select(&self, exchange: &mut Exchange, database: i64) -> Result<()> {
        if exchange.database == database {
            return Ok(());
        }
        let select = Command::new("SELECT").int(database);
        self.send(exchange, &[&select]).await?;
        check_reply(self.read_reply(exchange).await?)?;
        exchange.database = database;
        trace!(endpoint = %self.addr, database, "Selected database");
        Ok(())
    }

    /// Writes all commands with a single flush.
    async fn send(&self, exchange: &mut Exchange, commands: &[&Command]) -> Result<()> {
        let mut bytes = Vec::new();
        for command in commands {
            command.to_resp().serialize_into(&mut bytes);
        }
        exchange.stream.write_all(&bytes).await?;
        exchange.stream.flush().await?;

        self.stats.commands_sent(commands.len());
        self.stats.bytes_written(bytes.len());
        trace!(
            endpoint = %self.addr,
            commands = commands.len(),
            bytes = bytes.len(),
            "Sent"
        );
        Ok(())
    }

    /// Reads until one complete reply is buffered.
    async fn read_reply(&self, exchange: &mut Exchange) -> Result<RespValue> {
        loop {
            if let Some((value, consumed)) = exchange.parser.parse(&exchange.buffer)? {
                exchange.buffer.advance(consumed);
                return Ok(value);
            }

            if exchange.buffer.len() >= MAX_BUFFER_SIZE {
                return Err(StoreError::unavailable(
                    &self.addr,
                    format!("reply exceeds {} bytes", MAX_BUFFER_SIZE),
                ));
            }

            if exchange.buffer.capacity() - exchange.buffer.len() < 1024 {
                exchange.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = exchange.stream.get_mut().read_buf(&mut exchange.buffer).await?;
            if n == 0 {
                return Err(StoreError::unavailable(&self.addr, "connection closed by server"));
            }
            self.stats.bytes_read(n);
        }
    }
}

/// Any failure before the first exchange means the endpoint is unusable.
fn setup_failed(addr: &str, e: std::io::Error) -> StoreError {
    StoreError::unavailable(addr, e)
}

#[async_trait]
impl Channel for Connection {
    async fn execute(&self, database: i64, command: Command) -> Result<RespValue> {
        let mut exchange = self.begin().await?;
        let result = self.round_trip(&mut exchange, database, &command).await;
        self.finish(&mut exchange, result)
    }

    async fn execute_batch(&self, database: i64, commands: Vec<Command>) -> Result<Vec<RespValue>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let mut exchange = self.begin().await?;
        let result = self.round_trip_batch(&mut exchange, database, &commands).await;
        self.finish(&mut exchange, result)
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Opens TCP connections on demand and shares one healthy connection between
/// all callers.
#[derive(Debug)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
    current: RwLock<Option<Arc<Connection>>>,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            current: RwLock::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn healthy(&self) -> Option<Arc<Connection>> {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .filter(|conn| !conn.is_broken())
            .cloned()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Arc<dyn Channel>> {
        if let Some(conn) = self.healthy() {
            return Ok(conn as Arc<dyn Channel>);
        }

        let fresh = Arc::new(Connection::connect(&self.addr, self.connect_timeout).await?);

        let mut current = self.current.write().unwrap();
        match current.as_ref() {
            // Another caller connected first; keep theirs.
            Some(existing) if !existing.is_broken() => Ok(existing.clone() as Arc<dyn Channel>),
            _ => {
                *current = Some(fresh.clone());
                Ok(fresh as Arc<dyn Channel>)
            }
        }
    }

    fn endpoint(&self) -> String {
        self.addr.clone()
    }
}
