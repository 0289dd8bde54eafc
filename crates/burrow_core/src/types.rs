//! Core type definitions for BurrowDB.

use std::time::{Duration, SystemTime};

/// A stored key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Key bytes, unique within the database.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
    /// Absolute expiration instant, if the item has a TTL.
    pub expires: Option<SystemTime>,
}

impl Item {
    /// Creates an item without expiration.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expires: None,
        }
    }

    /// Sets the expiration instant.
    #[must_use]
    pub fn with_expiry(mut self, at: SystemTime) -> Self {
        self.expires = Some(at);
        self
    }

    /// Returns true if the item has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    /// Returns true if the item has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Returns the remaining lifetime at `now` in whole seconds, as written
    /// to the log. Already-expired items report zero.
    #[must_use]
    pub fn ttl_seconds_at(&self, now: SystemTime) -> Option<u64> {
        self.expires.map(|at| {
            at.duration_since(now)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }
}

/// Options for [`Tx::set`](crate::Tx::set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Time to live; `None` keeps the item forever.
    pub ttl: Option<Duration>,
}

impl SetOptions {
    /// Options for an item that never expires.
    #[must_use]
    pub const fn new() -> Self {
        Self { ttl: None }
    }

    /// Options for an item that expires after `ttl`.
    #[must_use]
    pub const fn ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Options for secondary index creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Match the index pattern against ASCII-lowercased keys.
    pub case_insensitive_key_matching: bool,
}

impl IndexOptions {
    /// Default options: case-sensitive matching.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            case_insensitive_key_matching: false,
        }
    }

    /// Enables or disables case-insensitive key matching.
    #[must_use]
    pub const fn case_insensitive_key_matching(mut self, value: bool) -> Self {
        self.case_insensitive_key_matching = value;
        self
    }
}
