//! Background manager: expiration sweep, periodic sync and auto-shrink.

use crate::config::SyncPolicy;
use crate::error::{CoreError, CoreResult};
use crate::shared::{DbState, Shared};
use crate::types::Item;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, trace, warn};

/// Interval between background ticks.
pub(crate) const TICK: Duration = Duration::from_secs(1);

/// Name of the background thread.
pub(crate) const THREAD_NAME: &str = "burrow-background";

/// Starts the background thread for `shared`.
pub(crate) fn spawn(shared: Arc<Shared>) -> CoreResult<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || run(&shared))?;
    Ok(handle)
}

fn run(shared: &Shared) {
    debug!("background manager started");
    let mut synced = 0u64;
    while !shared.wait_tick(TICK) {
        match tick(shared, &mut synced) {
            Ok(()) => {}
            Err(CoreError::DatabaseClosed) => break,
            Err(err) => warn!(error = %err, "background tick failed"),
        }
    }
    debug!("background manager stopped");
}

/// Runs one tick.
///
/// `synced` is the commit count at the last sync; it is updated when the
/// tick syncs the log.
pub(crate) fn tick(shared: &Shared, synced: &mut u64) -> CoreResult<()> {
    let mut on_expired = None;
    let mut expired: Vec<Arc<Item>> = Vec::new();
    let mut shrink = false;

    shared.update(|tx| {
        let state = tx.state()?;
        on_expired = state.config.on_expired.clone();
        let on_expired_sync = if on_expired.is_none() {
            state.config.on_expired_sync.clone()
        } else {
            None
        };
        shrink = shrink_due(state)?;
        expired = state
            .keyspace
            .exps
            .expired_at(SystemTime::now())
            .iter()
            .filter_map(|key| state.keyspace.get(key).cloned())
            .collect();

        if on_expired.is_some() {
            return Ok(());
        }
        match on_expired_sync {
            Some(callback) => {
                for item in &expired {
                    callback(&item.key, &item.value, tx)?;
                }
            }
            None => {
                for item in &expired {
                    match tx.delete(&item.key) {
                        Ok(_) | Err(CoreError::NotFound) => {}
                        Err(err) => return Err(err),
                    }
                }
            }
        }
        Ok(())
    })?;

    if !expired.is_empty() {
        trace!(count = expired.len(), "expired items swept");
        if let Some(callback) = on_expired {
            callback(expired.iter().map(|item| item.key.clone()).collect());
        }
    }

    {
        let mut state = shared.state.write();
        if state.closed {
            return Err(CoreError::DatabaseClosed);
        }
        let state = &mut *state;
        if state.config.sync_policy == SyncPolicy::EverySecond && state.flushes != *synced {
            if let Some(log) = state.log.as_mut() {
                log.sync()?;
            }
            *synced = state.flushes;
        }
    }

    if shrink {
        match shared.shrink() {
            Ok(()) | Err(CoreError::ShrinkInProcess) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Returns true if the log has outgrown its post-shrink size.
fn shrink_due(state: &DbState) -> CoreResult<bool> {
    let Some(log) = state.log.as_ref() else {
        return Ok(false);
    };
    if log.path().is_none() {
        return Ok(false);
    }
    Ok(state.config.shrink_due(log.size()?, state.last_aof_size))
}
