//! # Burrow Testkit
//!
//! Test utilities for BurrowDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators and a reference model
//! - A crash-simulating storage backend and recovery scenarios
//! - Concurrent stress helpers, with and without online shrink
//! - A model-checking harness and the cross-crate integration tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burrow_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         db.update(|tx| tx.set(b"key", b"value", SetOptions::new())).unwrap();
//!         assert_eq!(snapshot(db).len(), 1);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
    pub use burrow_core::{Config, CoreError, Database, SetOptions};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
