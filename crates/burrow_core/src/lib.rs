//! # Burrow Core
//!
//! Embedded key/value engine for BurrowDB.
//!
//! This crate provides:
//! - An ordered in-memory item store with per-item expiration
//! - Secondary indexes: ordered by value or spatial, over glob key patterns
//! - Single-writer, multi-reader transactions with rollback
//! - An append-only log that is replayed on open and compacted online
//! - A background thread for expiration, periodic sync and auto-shrink
//!
//! ## Usage
//!
//! ```rust,no_run
//! use burrow_core::{collate, Database, SetOptions};
//! use std::time::Duration;
//!
//! # fn main() -> burrow_core::CoreResult<()> {
//! let db = Database::open("data.db")?;
//! db.create_index("age", "user:*:age", &[collate::index_int()])?;
//!
//! db.update(|tx| {
//!     tx.set(b"user:1:age", b"42", SetOptions::new())?;
//!     tx.set(b"session:9", b"token", SetOptions::ttl(Duration::from_secs(60)))?;
//!     Ok(())
//! })?;
//!
//! db.view(|tx| {
//!     tx.ascend("age", |key, value| {
//!         println!("{:?} = {:?}", key, value);
//!         true
//!     })
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Durability
//!
//! Each commit appends `SET`/`DEL`/`FLUSHDB` commands to the log in one
//! write. A partial write is truncated away before the error is returned,
//! and a record cut short by a crash is dropped on the next open. When
//! [`SyncPolicy::Always`] is not set, a crash may lose up to a second of
//! commits.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aof;
mod background;
mod config;
mod database;
mod error;
mod index;
mod keyspace;
pub mod pattern;
mod shared;
mod shrink;
mod store;
mod transaction;
mod types;

pub use config::{Config, OnExpired, OnExpiredSync, SyncPolicy};
pub use database::{Database, MEMORY_PATH};
pub use error::{CoreError, CoreResult};
pub use index::{collate, compose_less, LessFn, RectFn, DIMENSIONS};
pub use transaction::Tx;
pub use types::{IndexOptions, Item, SetOptions};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
