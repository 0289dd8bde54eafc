//! # Burrow Codec
//!
//! Append-only log format for BurrowDB.
//!
//! Every committed mutation is written as a RESP-style array of bulk
//! strings. The format is byte-compatible with Redis append-only files for
//! the three commands the engine emits.
//!
//! ## Wire Format
//!
//! ```text
//! *3\r\n$3\r\nset\r\n$3\r\nkey\r\n$5\r\nvalue\r\n
//! *5\r\n$3\r\nset\r\n$3\r\nkey\r\n$5\r\nvalue\r\n$2\r\nex\r\n$2\r\n60\r\n
//! *2\r\n$3\r\ndel\r\n$3\r\nkey\r\n
//! *1\r\n$7\r\nflushdb\r\n
//! ```
//!
//! ## Usage
//!
//! ```
//! use burrow_codec::{decode_all, Command, CommandEncoder};
//!
//! let mut encoder = CommandEncoder::new();
//! encoder.set(b"key", b"value", None);
//! encoder.del(b"old");
//!
//! let commands = decode_all(encoder.as_bytes()).unwrap();
//! assert_eq!(commands[1], Command::Del { key: b"old".to_vec() });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod decoder;
mod encoder;
mod error;

pub use command::Command;
pub use decoder::{decode_all, CommandReader};
pub use encoder::{encode_command, CommandEncoder};
pub use error::{CodecError, CodecResult};
