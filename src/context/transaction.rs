//! Batching Transactions
//!
//! A [`Transaction`] collects commands instead of sending them. Its
//! [`TransactionChannel`] queues each command and parks the caller until
//! [`Transaction::exec`] sends the whole queue as one atomic batch
//! (`MULTI` ... `EXEC` on a TCP connection) and hands each caller its reply.
//!
//! ```text
//!  op A ──┐ enqueue                       ┌──> reply A
//!  op B ──┼──────────> [A, B, C] ── exec ─┼──> reply B
//!  op C ──┘                               └──> reply C
//! ```
//!
//! Handles reach the queue through a [`TransactionChannel`], which does not
//! keep the transaction alive. Dropping the last [`Transaction`] without
//! calling `exec` drops the queue, and every waiting operation fails with
//! `TransactionAborted`.
//!
//! Operation futures do nothing until polled, so they have to be driven
//! alongside `exec`, listed before it:
//!
//! ```ignore
//! let tx = Transaction::begin(&settings).await?;
//! let board = SortedSet::from_transaction(&tx, "board", StringConverter);
//! let ariz = "ariz".to_string();
//! let (added, score, sent) = tokio::join!(
//!     board.add(&ariz, 10.0),
//!     board.increment(&ariz, 5.0),
//!     tx.exec(),
//! );
//! ```

use crate::channel::Channel;
use crate::context::settings::StoreSettings;
use crate::error::{Result, StoreError};
use crate::protocol::{Command, RespValue};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting commands
    Open,
    /// `exec` has taken the queue
    Executed,
    /// `discard` was called; queued commands were dropped
    Discarded,
}

struct Pending {
    command: Command,
    reply: oneshot::Sender<Result<RespValue>>,
}

struct Queue {
    state: TransactionState,
    pending: Vec<Pending>,
}

struct Inner {
    channel: Arc<dyn Channel>,
    database: i64,
    queue: Mutex<Queue>,
}

impl Inner {
    /// Adds a command to the queue and returns the receiver for its reply.
    fn enqueue(&self, database: i64, command: Command) -> Result<oneshot::Receiver<Result<RespValue>>> {
        if database != self.database {
            return Err(StoreError::DatabaseMismatch {
                bound: self.database,
                requested: database,
            });
        }

        let mut queue = self.queue.lock().unwrap();
        if queue.state != TransactionState::Open {
            return Err(StoreError::TransactionAborted);
        }

        let (tx, rx) = oneshot::channel();
        queue.pending.push(Pending { command, reply: tx });
        Ok(rx)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let queue = match self.queue.get_mut() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        if queue.state == TransactionState::Open && !queue.pending.is_empty() {
            debug!(
                channel = %self.channel.describe(),
                dropped = queue.pending.len(),
                "Transaction dropped before exec"
            );
        }
    }
}

/// Queues commands for one combined submission.
///
/// Clones share the queue, which lives as long as at least one clone does.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("channel", &self.inner.channel.describe())
            .field("database", &self.inner.database)
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}

/// The side of a transaction that operations send through.
///
/// Holds the queue weakly: once every [`Transaction`] clone is gone, commands
/// are refused with `TransactionAborted`.
#[derive(Clone)]
pub struct TransactionChannel {
    inner: Weak<Inner>,
    database: i64,
    description: String,
}

impl std::fmt::Debug for TransactionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionChannel")
            .field("channel", &self.description)
            .field("database", &self.database)
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl TransactionChannel {
    pub fn database(&self) -> i64 {
        self.database
    }

    fn enqueue(&self, database: i64, command: Command) -> Result<oneshot::Receiver<Result<RespValue>>> {
        match self.inner.upgrade() {
            Some(inner) => inner.enqueue(database, command),
            None => Err(StoreError::TransactionAborted),
        }
    }
}

impl Transaction {
    /// Starts a transaction on `channel`, bound to `database`.
    pub fn new(channel: Arc<dyn Channel>, database: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel,
                database,
                queue: Mutex::new(Queue {
                    state: TransactionState::Open,
                    pending: Vec::new(),
                }),
            }),
        }
    }

    /// Starts a transaction on the endpoint and database of `settings`.
    pub async fn begin(settings: &StoreSettings) -> Result<Self> {
        let channel = settings.connect().await?;
        Ok(Self::new(channel, settings.database()))
    }

    pub fn database(&self) -> i64 {
        self.inner.database
    }

    pub fn state(&self) -> TransactionState {
        self.inner.queue.lock().unwrap().state
    }

    /// Number of commands waiting for `exec`.
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().unwrap().pending.len()
    }

    /// The queue handle operations send through. It does not keep the
    /// transaction alive.
    pub fn channel(&self) -> TransactionChannel {
        TransactionChannel {
            inner: Arc::downgrade(&self.inner),
            database: self.inner.database,
            description: format!("transaction({})", self.inner.channel.describe()),
        }
    }

    /// Submits every queued command as one atomic batch and completes each
    /// waiting operation with its own reply. Commands whose operation was
    /// cancelled while queued are dropped unsent. Returns how many commands
    /// were sent.
    ///
    /// If the batch fails as a whole, every waiting operation fails with
    /// `TransactionAborted` and the batch error is returned here.
    pub async fn exec(&self) -> Result<usize> {
        let pending = {
            let mut queue = self.inner.queue.lock().unwrap();
            if queue.state != TransactionState::Open {
                return Err(StoreError::TransactionAborted);
            }
            queue.state = TransactionState::Executed;
            std::mem::take(&mut queue.pending)
        };

        let queued = pending.len();
        let pending: Vec<Pending> = pending.into_iter().filter(|p| !p.reply.is_closed()).collect();
        if pending.len() < queued {
            debug!(cancelled = queued - pending.len(), "Skipping cancelled commands");
        }

        if pending.is_empty() {
            return Ok(0);
        }

        let (commands, waiters): (Vec<Command>, Vec<_>) =
            pending.into_iter().map(|p| (p.command, p.reply)).unzip();
        let count = commands.len();

        debug!(
            channel = %self.inner.channel.describe(),
            database = self.inner.database,
            commands = count,
            "Executing transaction"
        );

        match self
            .inner
            .channel
            .execute_batch(self.inner.database, commands)
            .await
        {
            Ok(replies) => {
                for (waiter, reply) in waiters.into_iter().zip(replies) {
                    // The caller may have stopped waiting; that is fine.
                    let _ = waiter.send(Ok(reply));
                }
                Ok(count)
            }
            Err(e) => {
                debug!(error = %e, "Transaction failed");
                for waiter in waiters {
                    let _ = waiter.send(Err(StoreError::TransactionAborted));
                }
                Err(e)
            }
        }
    }

    /// Drops every queued command without sending anything. Waiting
    /// operations fail with `TransactionAborted`.
    pub fn discard(&self) -> usize {
        let mut queue = self.inner.queue.lock().unwrap();
        if queue.state == TransactionState::Open {
            queue.state = TransactionState::Discarded;
        }
        let dropped = std::mem::take(&mut queue.pending);
        dropped.len()
    }
}

async fn await_reply(rx: oneshot::Receiver<Result<RespValue>>) -> Result<RespValue> {
    rx.await.unwrap_or(Err(StoreError::TransactionAborted))
}

#[async_trait]
impl Channel for TransactionChannel {
    async fn execute(&self, database: i64, command: Command) -> Result<RespValue> {
        let rx = self.enqueue(database, command)?;
        await_reply(rx).await
    }

    async fn execute_batch(&self, database: i64, commands: Vec<Command>) -> Result<Vec<RespValue>> {
        let receivers = commands
            .into_iter()
            .map(|command| self.enqueue(database, command))
            .collect::<Result<Vec<_>>>()?;

        let mut replies = Vec::with_capacity(receivers.len());
        for rx in receivers {
            replies.push(await_reply(rx).await?);
        }
        Ok(replies)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn zadd(member: &'static str, score: f64) -> Command {
        Command::new("ZADD").arg("k").score(score).arg(member)
    }

    #[tokio::test]
    async fn test_commands_wait_for_exec() {
        let store = Arc::new(MemoryStore::new());
        let tx = Transaction::new(store.clone(), 0);
        let ch = tx.channel();

        let (a, b, sent) = tokio::join!(
            ch.execute(0, zadd("a", 1.0)),
            ch.execute(0, Command::new("ZCARD").arg("k")),
            tx.exec(),
        );

        assert_eq!(sent.unwrap(), 2);
        assert_eq!(a.unwrap(), RespValue::integer(1));
        assert_eq!(b.unwrap(), RespValue::integer(1));
        assert_eq!(tx.state(), TransactionState::Executed);
    }

    #[tokio::test]
    async fn test_nothing_sent_before_exec() {
        let store = Arc::new(MemoryStore::new());
        let tx = Transaction::new(store.clone(), 0);

        let waiting = tokio::spawn({
            let ch = tx.channel();
            async move { ch.execute(0, zadd("a", 1.0)).await }
        });
        while tx.queued() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.commands_executed(), 0);

        tx.exec().await.unwrap();
        assert_eq!(waiting.await.unwrap().unwrap(), RespValue::integer(1));
        assert_eq!(store.commands_executed(), 1);
    }

    #[tokio::test]
    async fn test_discard_aborts_waiters() {
        let store = Arc::new(MemoryStore::new());
        let tx = Transaction::new(store.clone(), 0);

        let waiting = tokio::spawn({
            let ch = tx.channel();
            async move { ch.execute(0, zadd("a", 1.0)).await }
        });
        while tx.queued() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(tx.discard(), 1);
        assert!(matches!(
            waiting.await.unwrap(),
            Err(StoreError::TransactionAborted)
        ));
        assert!(matches!(tx.exec().await, Err(StoreError::TransactionAborted)));
        assert_eq!(store.commands_executed(), 0);
    }

    #[tokio::test]
    async fn test_closed_transaction_rejects_commands() {
        let tx = Transaction::new(Arc::new(MemoryStore::new()), 0);
        assert_eq!(tx.exec().await.unwrap(), 0);

        let result = tx.channel().execute(0, zadd("a", 1.0)).await;
        assert!(matches!(result, Err(StoreError::TransactionAborted)));
    }

    #[tokio::test]
    async fn test_database_mismatch() {
        let tx = Transaction::new(Arc::new(MemoryStore::new()), 3);
        let result = tx.channel().execute(0, zadd("a", 1.0)).await;
        assert!(matches!(
            result,
            Err(StoreError::DatabaseMismatch {
                bound: 3,
                requested: 0
            })
        ));
    }

    #[tokio::test]
    async fn test_error_reply_only_fails_its_command() {
        let tx = Transaction::new(Arc::new(MemoryStore::new()), 0);
        let ch = tx.channel();

        let (bad, good, _) = tokio::join!(
            ch.execute(0, Command::new("ZADD").arg("k").arg("notafloat").arg("a")),
            ch.execute(0, zadd("b", 2.0)),
            tx.exec(),
        );

        assert!(bad.unwrap().is_error());
        assert_eq!(good.unwrap(), RespValue::integer(1));
    }

    #[tokio::test]
    async fn test_dropping_transaction_aborts_waiters() {
        let store = Arc::new(MemoryStore::new());
        let tx = Transaction::new(store.clone(), 0);
        let ch = tx.channel();

        let waiting = tokio::spawn({
            let ch = ch.clone();
            async move { ch.execute(0, zadd("a", 1.0)).await }
        });
        while tx.queued() == 0 {
            tokio::task::yield_now().await;
        }
        drop(tx);

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiting)
            .await
            .expect("waiter should finish once the transaction is gone");
        assert!(matches!(outcome.unwrap(), Err(StoreError::TransactionAborted)));

        let late = ch.execute(0, zadd("b", 2.0)).await;
        assert!(matches!(late, Err(StoreError::TransactionAborted)));
        assert_eq!(store.commands_executed(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_command_is_not_sent() {
        let store = Arc::new(MemoryStore::new());
        let tx = Transaction::new(store.clone(), 0);

        let cancelled = tokio::spawn({
            let ch = tx.channel();
            async move { ch.execute(0, zadd("ghost", 1.0)).await }
        });
        while tx.queued() == 0 {
            tokio::task::yield_now().await;
        }
        cancelled.abort();
        assert!(cancelled.await.unwrap_err().is_cancelled());

        let ch = tx.channel();
        let (kept, sent) = tokio::join!(ch.execute(0, zadd("kept", 2.0)), tx.exec());

        assert_eq!(sent.unwrap(), 1);
        assert_eq!(kept.unwrap(), RespValue::integer(1));
        let card = store.execute(0, Command::new("ZCARD").arg("k")).await.unwrap();
        assert_eq!(card, RespValue::integer(1));
    }
}
