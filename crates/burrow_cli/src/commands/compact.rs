//! Compact command implementation.

use super::format_size;
use burrow_core::Database;
use std::path::Path;

/// Sizes observed by a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactResult {
    /// Log size before the shrink.
    pub before: u64,
    /// Log size after the shrink; equal to `before` on a dry run.
    pub after: u64,
    /// Number of live keys.
    pub keys: usize,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No database found at {:?}", path).into());
    }

    let result = compact(path, dry_run)?;
    if dry_run {
        println!("Dry run - no changes made");
        println!("  Log size:  {}", format_size(result.before));
        println!("  Live keys: {}", result.keys);
        println!("  A shrink would rewrite the log as {} set records", result.keys);
    } else {
        let saved = result.before.saturating_sub(result.after);
        println!("Compaction complete");
        println!("  Before: {}", format_size(result.before));
        println!("  After:  {}", format_size(result.after));
        println!("  Saved:  {}", format_size(saved));
    }
    Ok(())
}

/// Opens the database at `path` and shrinks its log unless `dry_run`.
pub fn compact(path: &Path, dry_run: bool) -> Result<CompactResult, Box<dyn std::error::Error>> {
    let db = Database::open(path)?;
    let before = std::fs::metadata(path)?.len();
    let keys = db.view(|tx| tx.len())?;

    if !dry_run {
        tracing::info!(path = %path.display(), "shrinking log");
        db.shrink()?;
    }
    db.close()?;

    Ok(CompactResult {
        before,
        after: std::fs::metadata(path)?.len(),
        keys,
    })
}
