//! Stress tests for BurrowDB.
//!
//! These helpers drive a database from several threads at once, optionally
//! shrinking the log while writers run.

use burrow_core::{CoreError, Database, SetOptions};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Shrinks completed during the run.
    pub shrinks: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            shrinks: 0,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Shrinks: {}", self.shrinks);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of writer threads.
    pub threads: usize,
    /// Size of each value in bytes.
    pub value_size: usize,
    /// Number of distinct keys per thread.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            value_size: 64,
            key_count: 100,
        }
    }
}

/// Key written by `thread` for slot `slot`.
pub fn stress_key(thread: usize, slot: usize) -> Vec<u8> {
    format!("t{thread}:k{slot:05}").into_bytes()
}

/// Value written by `thread` at operation `op`, padded to `size` bytes.
pub fn stress_value(thread: usize, op: usize, size: usize) -> Vec<u8> {
    let mut value = format!("t{thread}:op{op}:").into_bytes();
    value.resize(size.max(value.len()), b'.');
    value
}

/// Runs concurrent writers, each cycling through its own keys. The last
/// write to each key wins, so the expected final value of every key is
/// known.
pub fn stress_concurrent_writes(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    run(db, config, false)
}

/// Like [`stress_concurrent_writes`], with a thread that shrinks the log
/// in a loop until the writers finish.
pub fn stress_writes_with_shrink(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    run(db, config, true)
}

fn run(db: Arc<Database>, config: &StressConfig, shrink: bool) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let shrinker = shrink.then(|| {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut shrinks = 0;
            while !done.load(Ordering::SeqCst) {
                match db.shrink() {
                    Ok(()) => shrinks += 1,
                    Err(CoreError::ShrinkInProcess) => {}
                    Err(err) => panic!("shrink failed: {err}"),
                }
                thread::sleep(Duration::from_millis(5));
            }
            shrinks
        })
    });

    let writers: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();
            thread::spawn(move || {
                for op in 0..config.operations {
                    let key = stress_key(t, op % config.key_count);
                    let value = stress_value(t, op, config.value_size);
                    match db.update(|tx| tx.set(&key, &value, SetOptions::new())) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().expect("writer thread panicked");
    }
    done.store(true, Ordering::SeqCst);
    let shrinks = shrinker
        .map(|handle| handle.join().expect("shrink thread panicked"))
        .unwrap_or(0);

    let mut result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    result.shrinks = shrinks;
    result
}

/// Expected final value of every key after a successful run of `config`.
pub fn expected_final_values(config: &StressConfig) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    for t in 0..config.threads {
        for slot in 0..config.key_count.min(config.operations) {
            let last_op = slot + (config.operations - 1 - slot) / config.key_count * config.key_count;
            out.push((stress_key(t, slot), stress_value(t, last_op, config.value_size)));
        }
    }
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::snapshot;

    #[test]
    fn test_expected_final_values() {
        let config = StressConfig {
            operations: 5,
            threads: 1,
            value_size: 0,
            key_count: 2,
        };
        let expected = expected_final_values(&config);
        assert_eq!(expected.len(), 2);
        assert_eq!(expected[0].1, stress_value(0, 4, 0));
        assert_eq!(expected[1].1, stress_value(0, 3, 0));
    }

    #[test]
    fn test_concurrent_writes_in_memory() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let config = StressConfig {
            operations: 200,
            threads: 3,
            value_size: 16,
            key_count: 10,
        };
        let result = stress_concurrent_writes(Arc::clone(&db), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 600);
        assert_eq!(snapshot(&db), expected_final_values(&config));
    }
}
