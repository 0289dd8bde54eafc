//! Dump command implementation.

use super::{display_bytes, Format};
use burrow_codec::{Command, CommandReader};
use burrow_storage::{BackendReader, FileBackend};
use serde::Serialize;
use std::io::BufReader;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset of the record in the log file.
    pub offset: u64,
    /// Command name.
    pub command: &'static str,
    /// Key, escaped for display (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Value size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
    /// TTL in seconds relative to the write (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl RecordInfo {
    fn new(offset: u64, command: &Command) -> Self {
        let (value_size, ttl) = match command {
            Command::Set { value, ttl, .. } => (Some(value.len()), *ttl),
            _ => (None, None),
        };
        Self {
            offset,
            command: command.name(),
            key: command.key().map(display_bytes),
            value_size,
            ttl,
        }
    }
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err("Log file not found".into());
    }

    let records = read_records(path, start_offset, limit)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => print_text_output(&records),
    }
    Ok(())
}

/// Decodes up to `limit` records starting at `start_offset`, which must be
/// a record boundary. Stops quietly at a torn tail.
pub fn read_records(
    path: &Path,
    start_offset: u64,
    limit: Option<usize>,
) -> Result<Vec<RecordInfo>, Box<dyn std::error::Error>> {
    let backend = FileBackend::open_read_only(path)?;
    let mut reader =
        CommandReader::new(BufReader::new(BackendReader::new(&backend, start_offset)?));
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();

    while records.len() < max_records {
        let offset = start_offset + reader.offset();
        match reader.next_command() {
            Ok(Some(command)) => records.push(RecordInfo::new(offset, &command)),
            Ok(None) => break,
            Err(err) if err.is_unexpected_eof() => {
                tracing::warn!(offset, "log ends with a torn record");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(records)
}

fn print_text_output(records: &[RecordInfo]) {
    println!("{:>10}  {:<8} {:<32} {:>10} {:>8}", "OFFSET", "COMMAND", "KEY", "VALUE", "TTL");
    println!("{}", "-".repeat(74));

    for record in records {
        let key = record.key.as_deref().unwrap_or("-");
        let value = record
            .value_size
            .map_or_else(|| "-".to_string(), |n| format!("{n} B"));
        let ttl = record.ttl.map_or_else(|| "-".to_string(), |t| format!("{t}s"));
        println!(
            "{:>10}  {:<8} {:<32} {:>10} {:>8}",
            record.offset, record.command, key, value, ttl
        );
    }

    println!();
    println!("Total: {} records", records.len());
}
