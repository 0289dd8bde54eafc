//! Transactions.
//!
//! BurrowDB runs one writable transaction at a time alongside any number
//! of read-only ones:
//! - **Atomicity**: a commit reaches the log in a single append, and a
//!   failed append rolls the transaction back in memory
//! - **Isolation**: a transaction holds the database lock for its whole
//!   life, so readers never see a half-applied writer
//! - **Durability**: governed by [`SyncPolicy`](crate::SyncPolicy)

mod scan;
mod state;
mod tx;

pub(crate) use tx::StateGuard;
pub use tx::Tx;
