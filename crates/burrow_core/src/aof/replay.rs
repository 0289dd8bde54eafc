//! Log replay into memory.

use crate::aof::AppendLog;
use crate::error::{CoreError, CoreResult};
use crate::keyspace::Keyspace;
use crate::types::Item;
use burrow_codec::{CodecResult, Command, CommandReader};
use burrow_storage::BackendReader;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Applies every command from `reader` to `keyspace`.
///
/// TTLs are relative to `written_at`, the time the input was last
/// written. A `SET` whose expiry has already passed removes the key
/// instead of storing it.
///
/// Returns the number of commands applied. On error, the reader's offset
/// marks the end of the last applied command.
pub(crate) fn replay<R: BufRead>(
    reader: &mut CommandReader<R>,
    keyspace: &mut Keyspace,
    written_at: SystemTime,
) -> CodecResult<u64> {
    let now = SystemTime::now();
    let mut applied = 0u64;
    while let Some(command) = reader.next_command()? {
        apply(command, keyspace, written_at, now);
        applied += 1;
    }
    Ok(applied)
}

fn apply(command: Command, keyspace: &mut Keyspace, written_at: SystemTime, now: SystemTime) {
    match command {
        Command::Set {
            key,
            value,
            ttl: None,
        } => {
            keyspace.insert(Arc::new(Item::new(key, value)));
        }
        Command::Set {
            key,
            value,
            ttl: Some(secs),
        } => match written_at.checked_add(Duration::from_secs(secs)) {
            Some(at) if at <= now => {
                keyspace.delete(&key);
            }
            Some(at) => {
                keyspace.insert(Arc::new(Item::new(key, value).with_expiry(at)));
            }
            None => {
                keyspace.insert(Arc::new(Item::new(key, value)));
            }
        },
        Command::Del { key } => {
            keyspace.delete(&key);
        }
        Command::FlushDb => {
            *keyspace = keyspace.clear_copy();
        }
    }
}

/// Replays the whole log into `keyspace`, healing a torn tail.
///
/// A record cut short by the end of the log is the trace of an
/// interrupted append; the log is truncated back to the last complete
/// record. Any other decode failure aborts the load.
///
/// Returns the log size after loading.
pub(crate) fn load_log(log: &mut AppendLog, keyspace: &mut Keyspace) -> CoreResult<u64> {
    let written_at = log.backend().modified()?.unwrap_or_else(SystemTime::now);
    let size = log.size()?;

    let (result, offset) = {
        let reader = BufReader::new(BackendReader::new(log.backend(), 0)?);
        let mut commands = CommandReader::new(reader);
        let result = replay(&mut commands, keyspace, written_at);
        (result, commands.offset())
    };

    match result {
        Ok(applied) => {
            debug!(commands = applied, keys = keyspace.keys.len(), size, "loaded database log");
            Ok(size)
        }
        Err(err) if err.is_unexpected_eof() => {
            warn!(
                valid = offset,
                size,
                "database log ends mid-record; truncating to last complete record"
            );
            log.truncate(offset)?;
            Ok(offset)
        }
        Err(err) => Err(CoreError::from_codec(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_codec::CommandEncoder;
    use burrow_storage::InMemoryBackend;

    fn replay_bytes(bytes: &[u8], written_at: SystemTime) -> Keyspace {
        let mut keyspace = Keyspace::new();
        let mut reader = CommandReader::new(bytes);
        replay(&mut reader, &mut keyspace, written_at).unwrap();
        keyspace
    }

    #[test]
    fn replay_applies_in_order() {
        let mut enc = CommandEncoder::new();
        enc.set(b"a", b"1", None);
        enc.set(b"b", b"2", None);
        enc.del(b"a");
        enc.set(b"b", b"3", None);

        let ks = replay_bytes(enc.as_bytes(), SystemTime::now());
        assert!(ks.get(b"a").is_none());
        assert_eq!(ks.get(b"b").unwrap().value, b"3");
    }

    #[test]
    fn ttl_is_relative_to_write_time() {
        let mut enc = CommandEncoder::new();
        enc.set(b"live", b"v", Some(100));
        enc.set(b"gone", b"old", None);
        enc.set(b"gone", b"v", Some(10));

        let written_at = SystemTime::now() - Duration::from_secs(30);
        let ks = replay_bytes(enc.as_bytes(), written_at);

        let live = ks.get(b"live").unwrap();
        let left = live.expires.unwrap().duration_since(SystemTime::now()).unwrap();
        assert!(left <= Duration::from_secs(70));
        assert!(left > Duration::from_secs(60));
        assert!(ks.get(b"gone").is_none());
        assert_eq!(ks.exps.len(), 1);
    }

    #[test]
    fn flushdb_clears_items() {
        let mut enc = CommandEncoder::new();
        enc.set(b"a", b"1", None);
        enc.flushdb();
        enc.set(b"b", b"2", None);

        let ks = replay_bytes(enc.as_bytes(), SystemTime::now());
        assert!(ks.get(b"a").is_none());
        assert_eq!(ks.keys.len(), 1);
    }

    #[test]
    fn load_truncates_torn_tail() {
        let mut enc = CommandEncoder::new();
        enc.set(b"a", b"1", None);
        let valid = enc.len() as u64;
        let mut data = enc.as_bytes().to_vec();
        data.extend_from_slice(b"*3\r\n$3\r\nset\r\n$1\r\nb");

        let backend = InMemoryBackend::with_data(data);
        let mut log = AppendLog::new(Box::new(backend.clone()));
        let mut ks = Keyspace::new();

        assert_eq!(load_log(&mut log, &mut ks).unwrap(), valid);
        assert_eq!(backend.data().len() as u64, valid);
        assert_eq!(ks.keys.len(), 1);
    }

    #[test]
    fn load_rejects_corrupt_record() {
        let backend = InMemoryBackend::with_data(b"*1\r\n$3\r\nget\r\n".to_vec());
        let mut log = AppendLog::new(Box::new(backend));
        let err = load_log(&mut log, &mut Keyspace::new()).unwrap_err();
        assert!(matches!(err, CoreError::Invalid { .. }));
    }
}
