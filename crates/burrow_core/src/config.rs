//! Database configuration.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Tx;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Callback receiving the keys removed by an expiration sweep.
///
/// Runs after the sweep transaction has finished, outside of any
/// transaction. The callback is responsible for deleting the keys.
pub type OnExpired = Arc<dyn Fn(Vec<Vec<u8>>) + Send + Sync>;

/// Callback invoked for each expired item inside the sweep transaction.
///
/// The callback receives the key, the value and the writable transaction,
/// and is responsible for removing or refreshing the item.
pub type OnExpiredSync =
    Arc<dyn Fn(&[u8], &[u8], &mut Tx<'_>) -> CoreResult<()> + Send + Sync>;

/// When the log is synced to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Never sync explicitly; leave it to the operating system.
    Never,
    /// Sync at most once per second from the background thread.
    #[default]
    EverySecond,
    /// Sync after every commit.
    Always,
}

impl SyncPolicy {
    /// Returns the canonical name of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::EverySecond => "every_second",
            Self::Always => "always",
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "never" => Ok(Self::Never),
            "every_second" | "everysecond" => Ok(Self::EverySecond),
            "always" => Ok(Self::Always),
            _ => Err(CoreError::InvalidSyncPolicy {
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for a database.
///
/// Can be supplied at open time and replaced later with
/// [`Database::set_config`](crate::Database::set_config).
#[derive(Clone)]
pub struct Config {
    /// When the log is synced to durable storage.
    pub sync_policy: SyncPolicy,

    /// Growth over the post-shrink size, in percent, that triggers an
    /// automatic shrink.
    pub auto_shrink_percentage: u32,

    /// The log must be at least this large before an automatic shrink.
    pub auto_shrink_min_size: u64,

    /// Disables automatic shrinking.
    pub auto_shrink_disabled: bool,

    /// Post-commit expiration callback. Takes priority over
    /// `on_expired_sync`.
    pub on_expired: Option<OnExpired>,

    /// In-transaction expiration callback.
    pub on_expired_sync: Option<OnExpiredSync>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_policy: SyncPolicy::EverySecond,
            auto_shrink_percentage: 100,
            auto_shrink_min_size: 32 * 1024 * 1024, // 32 MiB
            auto_shrink_disabled: false,
            on_expired: None,
            on_expired_sync: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sync_policy", &self.sync_policy)
            .field("auto_shrink_percentage", &self.auto_shrink_percentage)
            .field("auto_shrink_min_size", &self.auto_shrink_min_size)
            .field("auto_shrink_disabled", &self.auto_shrink_disabled)
            .field("on_expired", &self.on_expired.is_some())
            .field("on_expired_sync", &self.on_expired_sync.is_some())
            .finish()
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sync policy.
    #[must_use]
    pub const fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    /// Sets the growth percentage that triggers an automatic shrink.
    #[must_use]
    pub const fn auto_shrink_percentage(mut self, percentage: u32) -> Self {
        self.auto_shrink_percentage = percentage;
        self
    }

    /// Sets the minimum log size for an automatic shrink.
    #[must_use]
    pub const fn auto_shrink_min_size(mut self, size: u64) -> Self {
        self.auto_shrink_min_size = size;
        self
    }

    /// Enables or disables automatic shrinking.
    #[must_use]
    pub const fn auto_shrink_disabled(mut self, disabled: bool) -> Self {
        self.auto_shrink_disabled = disabled;
        self
    }

    /// Sets the post-commit expiration callback.
    #[must_use]
    pub fn on_expired<F>(mut self, callback: F) -> Self
    where
        F: Fn(Vec<Vec<u8>>) + Send + Sync + 'static,
    {
        self.on_expired = Some(Arc::new(callback));
        self
    }

    /// Sets the in-transaction expiration callback.
    #[must_use]
    pub fn on_expired_sync<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8], &[u8], &mut Tx<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.on_expired_sync = Some(Arc::new(callback));
        self
    }

    /// Returns true if an automatic shrink is due for a log of `size` bytes
    /// that measured `last_shrink_size` bytes after the previous shrink.
    pub(crate) fn shrink_due(&self, size: u64, last_shrink_size: u64) -> bool {
        if self.auto_shrink_disabled || size <= self.auto_shrink_min_size {
            return false;
        }
        let growth = last_shrink_size as f64 * f64::from(self.auto_shrink_percentage) / 100.0;
        size as f64 > last_shrink_size as f64 + growth
    }
}
