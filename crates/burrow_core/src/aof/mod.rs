//! Append-only command log.
//!
//! Every commit appends the RESP-encoded commands of its writes in a single
//! write. On open the log is replayed into memory; a record cut short at
//! the end of the file is truncated away.

mod writer;
mod replay;

pub(crate) use writer::AppendLog;
pub(crate) use replay::{load_log, replay};

use crate::types::Item;
use burrow_codec::CommandEncoder;
use std::time::SystemTime;

/// Encodes `item` as a `SET` command with its TTL remaining at `now`.
pub(crate) fn encode_item(encoder: &mut CommandEncoder, item: &Item, now: SystemTime) {
    encoder.set(&item.key, &item.value, item.ttl_seconds_at(now));
}
