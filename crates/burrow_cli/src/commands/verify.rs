//! Verify command implementation.
//!
//! Scans the log read-only. A record cut short at the end is reported but
//! is not an error, since opening the database truncates it away.

use super::{format_size, Format};
use burrow_codec::{CodecError, CommandReader};
use burrow_storage::{BackendReader, FileBackend, StorageBackend};
use serde::Serialize;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// State of the end of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TailState {
    /// The log ends on a record boundary.
    Clean,
    /// The last record is incomplete.
    Torn,
    /// A malformed record was found.
    Corrupt,
}

/// Verification report.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
    /// Log file size in bytes.
    pub size: u64,
    /// Number of complete records.
    pub records: usize,
    /// Offset just past the last complete record.
    pub valid_bytes: u64,
    /// State of the end of the log.
    pub tail: TailState,
    /// Decoder message for a corrupt record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Verification failure.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The log holds a malformed record.
    #[error("log is corrupt at offset {offset}: {message}")]
    Corrupt {
        /// Offset of the bad record.
        offset: u64,
        /// Decoder message.
        message: String,
    },
}

/// Runs the verify command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let report = verify(path)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print_text_output(&report),
    }

    if report.tail == TailState::Corrupt {
        return Err(VerifyError::Corrupt {
            offset: report.valid_bytes,
            message: report.error.unwrap_or_default(),
        }
        .into());
    }
    Ok(())
}

/// Scans the log at `path` without modifying it.
pub fn verify(path: &Path) -> Result<VerifyReport, Box<dyn std::error::Error>> {
    let backend = FileBackend::open_read_only(path)?;
    let size = backend.size()?;
    let mut reader = CommandReader::new(BufReader::new(BackendReader::new(&backend, 0)?));

    let mut report = VerifyReport {
        size,
        records: 0,
        valid_bytes: 0,
        tail: TailState::Clean,
        error: None,
    };
    loop {
        match reader.next_command() {
            Ok(Some(_)) => {
                report.records += 1;
                report.valid_bytes = reader.offset();
            }
            Ok(None) => break,
            Err(CodecError::UnexpectedEof) => {
                report.tail = TailState::Torn;
                break;
            }
            Err(err) => {
                report.tail = TailState::Corrupt;
                report.error = Some(err.to_string());
                break;
            }
        }
    }
    Ok(report)
}

fn print_text_output(report: &VerifyReport) {
    println!("BurrowDB Log Verification");
    println!("=========================");
    println!();
    println!("Size:        {}", format_size(report.size));
    println!("Records:     {}", report.records);
    println!("Valid bytes: {}", report.valid_bytes);
    match report.tail {
        TailState::Clean => println!("Status:      OK"),
        TailState::Torn => println!(
            "Status:      torn tail ({} bytes will be dropped on next open)",
            report.size - report.valid_bytes
        ),
        TailState::Corrupt => println!(
            "Status:      CORRUPT ({})",
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
