//! Stress tests for darkstore.
//!
//! These tests verify behavior under heavy load and concurrent access.

use darkstore_core::{DataStore, ObjectId, StoreError, StoreResult};
use std::sync::atomic::{AtomicUsize, Ordering};
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
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of object data in bytes.
    pub object_size: usize,
    /// Attempts per operation before a retryable error counts as failed.
    pub max_attempts: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            object_size: 256,
            max_attempts: 20,
        }
    }
}

/// Runs `op` in fresh transactions until it commits, fails with an error
/// that is not retryable, or runs out of attempts.
///
/// Returns the result and the number of attempts that were retried.
pub fn with_retry<T, F>(store: &DataStore, max_attempts: usize, mut op: F) -> (StoreResult<T>, usize)
where
    F: FnMut(&darkstore_core::Transaction) -> StoreResult<T>,
{
    let mut retries = 0;
    loop {
        match store.transaction(&mut op) {
            Err(e) if e.is_retryable() && retries + 1 < max_attempts => retries += 1,
            result => return (result, retries),
        }
    }
}

fn encode_counter(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

fn decode_counter(data: &[u8]) -> StoreResult<u64> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| StoreError::invalid_format("counter is not 8 bytes"))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Run a sequential create stress test: one object per transaction.
pub fn stress_sequential_creates(store: &DataStore, config: &StressConfig) -> StressTestResult {
    let data = vec![0xABu8; config.object_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for _ in 0..config.operations {
        let result = store.transaction(|txn| {
            let oid = store.create_object(txn)?;
            store.set_object(txn, oid, &data)
        });
        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent create stress test. Every thread creates objects in
/// its own transactions.
pub fn stress_concurrent_creates(store: Arc<DataStore>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let object_size = config.object_size;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                let data = vec![t as u8; object_size];
                for _ in 0..ops_per_thread {
                    let result = store.transaction(|txn| {
                        let oid = store.create_object(txn)?;
                        store.set_object(txn, oid, &data)
                    });
                    match result {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a contended counter stress test. Every thread increments the same
/// object, retrying on timeouts and deadlocks.
///
/// Returns the result, where failed operations are those that ran out of
/// attempts, and the ID of the counter object.
pub fn stress_contended_counter(
    store: Arc<DataStore>,
    config: &StressConfig,
) -> (StressTestResult, ObjectId) {
    let counter = store
        .transaction(|txn| {
            let oid = store.create_object(txn)?;
            store.set_object(txn, oid, &encode_counter(0))?;
            Ok(oid)
        })
        .expect("Failed to create counter");

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let max_attempts = config.max_attempts;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let (result, _) = with_retry(&store, max_attempts, |txn| {
                        let value = decode_counter(&store.get_object(txn, counter, true)?)?;
                        store.set_object(txn, counter, &encode_counter(value + 1))
                    });
                    match result {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    (result, counter)
}

/// Reads the value of a counter created by [`stress_contended_counter`].
///
/// # Errors
///
/// Returns an error if the counter cannot be read.
pub fn read_counter(store: &DataStore, counter: ObjectId) -> StoreResult<u64> {
    store.transaction(|txn| decode_counter(&store.get_object(txn, counter, false)?))
}

/// Run a concurrent binding stress test. Every thread binds its own names,
/// interleaved with other threads' names in key order.
pub fn stress_concurrent_bindings(store: Arc<DataStore>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;
    let max_attempts = config.max_attempts;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let name = format!("name-{i:06}-{t:02}");
                    let (result, _) = with_retry(&store, max_attempts, |txn| {
                        let oid = store.create_object(txn)?;
                        store.set_object(txn, oid, name.as_bytes())?;
                        store.set_binding(txn, &name, oid)
                    });
                    match result {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Counts the bound names by walking the namespace.
///
/// # Errors
///
/// Returns an error if the scan fails.
pub fn count_bindings(store: &DataStore) -> StoreResult<usize> {
    store.transaction(|txn| {
        let mut count = 0;
        let mut name = store.next_bound_name(txn, None)?;
        while let Some(current) = name {
            count += 1;
            name = store.next_bound_name(txn, Some(&current))?;
        }
        Ok(count)
    })
}

/// Counts the live objects by walking the object IDs.
///
/// # Errors
///
/// Returns an error if the scan fails.
pub fn count_objects(store: &DataStore) -> StoreResult<usize> {
    store.transaction(|txn| {
        let mut count = 0;
        let mut oid = store.next_object_id(txn, None)?;
        while let Some(current) = oid {
            count += 1;
            oid = store.next_object_id(txn, Some(current))?;
        }
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn test_sequential_creates() {
        let store = TestStore::memory();
        let config = StressConfig {
            operations: 500,
            object_size: 64,
            ..Default::default()
        };

        let result = stress_sequential_creates(&store, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 500);
        assert_eq!(count_objects(&store).unwrap(), 500);
    }

    #[test]
    fn test_concurrent_creates() {
        let store = TestStore::memory();
        let config = StressConfig {
            operations: 400,
            threads: 4,
            object_size: 16,
            ..Default::default()
        };

        let result = stress_concurrent_creates(store.store.clone(), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(count_objects(&store).unwrap(), 400);
    }

    #[test]
    fn test_contended_counter() {
        let store = TestStore::memory();
        let config = StressConfig {
            operations: 200,
            threads: 4,
            ..Default::default()
        };

        let (result, counter) = stress_contended_counter(store.store.clone(), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(read_counter(&store, counter).unwrap(), 200);
    }

    #[test]
    fn test_concurrent_bindings() {
        let store = TestStore::memory();
        let config = StressConfig {
            operations: 200,
            threads: 4,
            ..Default::default()
        };

        let result = stress_concurrent_bindings(store.store.clone(), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(count_bindings(&store).unwrap(), 200);
    }
}
