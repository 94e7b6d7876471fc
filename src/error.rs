//! Error taxonomy shared by every layer of the client.

use crate::protocol::{ParseError, RespValue};
use thiserror::Error;

/// Errors surfaced by channels, converters and the sorted-set facade.
///
/// Nothing in this crate retries; each failure reaches the caller as-is.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No channel could be obtained for the request.
    #[error("connection unavailable ({endpoint}): {reason}")]
    ConnectionUnavailable { endpoint: String, reason: String },

    /// The converter rejected a value, or a reply could not be decoded into
    /// the member type.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// The store answered with an error reply.
    #[error("remote command failure: {0}")]
    RemoteCommand(String),

    /// The store answered with a reply of the wrong shape.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        command: &'static str,
        reply: RespValue,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transaction holding the command was discarded, dropped or
    /// rejected by the store before the command ran.
    #[error("transaction aborted")]
    TransactionAborted,

    /// A command was sent through a transaction bound to another database.
    #[error("transaction is bound to database {bound}, command targets {requested}")]
    DatabaseMismatch { bound: i64, requested: i64 },
}

impl StoreError {
    pub fn unavailable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::ConnectionUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn serialization(reason: impl ToString) -> Self {
        StoreError::Serialization(reason.to_string())
    }

    pub fn unexpected(command: &'static str, reply: RespValue) -> Self {
        StoreError::UnexpectedReply { command, reply }
    }

    /// Returns true for failures caused by the transport rather than by the
    /// command or its arguments.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionUnavailable { .. } | StoreError::Io(_) | StoreError::Protocol(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Turns error replies into `RemoteCommand` failures.
pub(crate) fn check_reply(reply: RespValue) -> Result<RespValue> {
    match reply {
        RespValue::Error(msg) => Err(StoreError::RemoteCommand(msg)),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_reply() {
        assert!(check_reply(RespValue::integer(1)).is_ok());
        let err = check_reply(RespValue::error("WRONGTYPE Operation against a key")).unwrap_err();
        assert!(matches!(err, StoreError::RemoteCommand(ref m) if m.starts_with("WRONGTYPE")));
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::unavailable("10.0.0.1:6379", "connection refused");
        assert_eq!(
            err.to_string(),
            "connection unavailable (10.0.0.1:6379): connection refused"
        );
        assert!(err.is_connection_error());
        assert!(!StoreError::TransactionAborted.is_connection_error());
    }
}
