//! Log record encoder.

use crate::command::Command;
use bytes::{Bytes, BytesMut};

/// Encode a single command to its wire bytes.
#[must_use]
pub fn encode_command(command: &Command) -> Vec<u8> {
    let mut encoder = CommandEncoder::new();
    encoder.encode(command);
    encoder.as_bytes().to_vec()
}

/// An encoder that batches log records into one contiguous buffer.
///
/// Each record is a RESP-style array: `*<n>\r\n` followed by `n` bulk
/// strings `$<len>\r\n<bytes>\r\n`. Command names are written lowercase.
/// A transaction encodes all of its records into one encoder so the log
/// receives them in a single write.
#[derive(Debug, Default)]
pub struct CommandEncoder {
    buffer: BytesMut,
}

impl CommandEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Append one command.
    pub fn encode(&mut self, command: &Command) {
        match command {
            Command::Set { key, value, ttl } => self.set(key, value, *ttl),
            Command::Del { key } => self.del(key),
            Command::FlushDb => self.flushdb(),
        }
    }

    /// Append a `set` record, with an `ex` option when `ttl` is present.
    pub fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<u64>) {
        match ttl {
            Some(seconds) => {
                self.array(5);
                self.bulk(b"set");
                self.bulk(key);
                self.bulk(value);
                self.bulk(b"ex");
                self.bulk(seconds.to_string().as_bytes());
            }
            None => {
                self.array(3);
                self.bulk(b"set");
                self.bulk(key);
                self.bulk(value);
            }
        }
    }

    /// Append a `del` record.
    pub fn del(&mut self, key: &[u8]) {
        self.array(2);
        self.bulk(b"del");
        self.bulk(key);
    }

    /// Append a `flushdb` record.
    pub fn flushdb(&mut self) {
        self.array(1);
        self.bulk(b"flushdb");
    }

    /// Returns the encoded bytes so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the number of encoded bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discards the encoded bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Consumes the encoder and returns the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    fn array(&mut self, count: usize) {
        self.buffer.extend_from_slice(b"*");
        self.buffer.extend_from_slice(count.to_string().as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
    }

    fn bulk(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(b"$");
        self.buffer.extend_from_slice(data.len().to_string().as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
        self.buffer.extend_from_slice(data);
        self.buffer.extend_from_slice(b"\r\n");
    }
}
