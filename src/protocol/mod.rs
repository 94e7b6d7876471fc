//! RESP Protocol Implementation
//!
//! The client half of the Redis Serialization Protocol (RESP2): encoding
//! commands and decoding replies.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and its wire encoding
//! - `parser`: incremental reply parser
//! - `command`: `Command` builder and score/bound encoding
//!
//! ## Example
//!
//! ```
//! use flashset::protocol::{parse_message, Command};
//!
//! let wire = Command::new("ZCARD").arg("board").to_resp().serialize();
//! assert_eq!(wire, b"*2\r\n$5\r\nZCARD\r\n$5\r\nboard\r\n");
//!
//! let (reply, _) = parse_message(b":3\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_integer(), Some(3));
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::{format_bound, format_score, Command};
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
