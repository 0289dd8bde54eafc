//! Inspect command implementation.

use super::{format_size, Format};
use burrow_core::Database;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Log file size in bytes, after any self-heal on open.
    pub log_size: u64,
    /// Number of live keys.
    pub key_count: usize,
    /// Number of live keys with a TTL.
    pub expiring_count: usize,
    /// Remaining lifetime of the key closest to expiring, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_expiry_secs: Option<u64>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No database found at {:?}", path).into());
    }

    let result = inspect(path)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Opens the database at `path` and collects its statistics.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let db = Database::open(path)?;
    let (key_count, expiring_count, next_expiry) = db.view(|tx| {
        let mut keys = 0;
        let mut expiring = 0;
        let mut next = None;
        tx.ascend("", |key, _| {
            match tx.ttl(key) {
                Ok(Some(left)) => {
                    keys += 1;
                    expiring += 1;
                    next = Some(next.map_or(left, |n: std::time::Duration| n.min(left)));
                }
                Ok(None) => keys += 1,
                Err(_) => {}
            }
            true
        })?;
        Ok((keys, expiring, next))
    })?;
    db.close()?;

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: std::fs::metadata(path)?.len(),
        key_count,
        expiring_count,
        next_expiry_secs: next_expiry.map(|d| d.as_secs()),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("BurrowDB Database Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:      {}", format_size(result.log_size));
    println!();
    println!("Keys:");
    println!("  Live keys:     {}", result.key_count);
    println!("  Expiring keys: {}", result.expiring_count);
    if let Some(secs) = result.next_expiry_secs {
        println!("  Next expiry:   {}s", secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::SetOptions;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_inspect_counts_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        {
            let db = Database::open(&path).unwrap();
            db.update(|tx| {
                tx.set(b"a", b"1", SetOptions::new())?;
                tx.set(b"b", b"2", SetOptions::ttl(Duration::from_secs(600)))?;
                Ok(())
            })
            .unwrap();
        }

        let result = inspect(&path).unwrap();
        assert_eq!(result.key_count, 2);
        assert_eq!(result.expiring_count, 1);
        assert!(result.next_expiry_secs.unwrap() <= 600);
        assert!(result.log_size > 0);
    }
}
