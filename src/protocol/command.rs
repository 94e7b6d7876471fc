//! Outgoing commands and score encoding.
//!
//! A [`Command`] is the name plus its already-serialized arguments. It turns
//! into a RESP array of bulk strings on the wire.

use crate::protocol::types::RespValue;
use bytes::Bytes;
use std::fmt;

/// A command ready to be sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a score in the store's float syntax.
    pub fn score(self, score: f64) -> Self {
        self.arg(format_score(score))
    }

    pub fn int(self, n: i64) -> Self {
        self.arg(n.to_string())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Converts to the RESP array that goes on the wire.
    pub fn to_resp(&self) -> RespValue {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(RespValue::bulk_string(Bytes::from_static(self.name.as_bytes())));
        parts.extend(self.args.iter().cloned().map(RespValue::BulkString));
        RespValue::Array(parts)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// Encodes a score. Infinities become `+inf`/`-inf`, NaN is sent as `nan`
/// and left for the store to reject, finite values use the shortest
/// representation that parses back to the same `f64`.
pub fn format_score(score: f64) -> String {
    if score.is_nan() {
        "nan".to_string()
    } else if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

/// Encodes one end of a score interval. Exclusive bounds take a `(` prefix;
/// infinite bounds are sent bare since exclusivity does not change them.
pub fn format_bound(score: f64, inclusive: bool) -> String {
    if inclusive || score.is_infinite() {
        format_score(score)
    } else {
        format!("({}", format_score(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(1.0), "1");
        assert_eq!(format_score(-2.5), "-2.5");
        assert_eq!(format_score(0.1), "0.1");
        assert_eq!(format_score(f64::INFINITY), "+inf");
        assert_eq!(format_score(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_score(f64::NAN), "nan");
    }

    #[test]
    fn test_format_score_round_trips() {
        for score in [1e300, -1e-300, 123456.789, f64::MAX, f64::MIN_POSITIVE] {
            assert_eq!(format_score(score).parse::<f64>().unwrap(), score);
        }
    }

    #[test]
    fn test_format_bound() {
        assert_eq!(format_bound(2.0, true), "2");
        assert_eq!(format_bound(3.0, false), "(3");
        assert_eq!(format_bound(f64::NEG_INFINITY, false), "-inf");
        assert_eq!(format_bound(f64::INFINITY, true), "+inf");
    }

    #[test]
    fn test_command_to_resp() {
        let cmd = Command::new("ZADD").arg("board").score(1.5).arg("alice");
        assert_eq!(
            cmd.to_resp().serialize(),
            b"*4\r\n$4\r\nZADD\r\n$5\r\nboard\r\n$3\r\n1.5\r\n$5\r\nalice\r\n"
        );
        assert_eq!(cmd.to_string(), "ZADD board 1.5 alice");
    }
}
