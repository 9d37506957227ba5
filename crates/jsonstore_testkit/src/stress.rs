//! Stress tests for jsonstore.
//!
//! These helpers drive one store from many threads at once through cloned
//! handles, which all feed the same operation lane.

use jsonstore_core::{FieldValueMap, FindOptions, JsonStore};
use serde_json::{json, Value};
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
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Documents stored per store operation.
    pub batch_size: usize,
    /// Collection to work on. Must be provisioned with `owner:string` and
    /// `seq:integer`.
    pub collection: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            batch_size: 3,
            collection: "stress".to_string(),
        }
    }
}

/// Search fields of a stress collection.
pub fn stress_fields() -> jsonstore_core::SearchFields {
    jsonstore_core::SearchFields::new()
        .with("owner", jsonstore_core::FieldType::String)
        .with("seq", jsonstore_core::FieldType::Integer)
}

fn owner_query(owner: &str) -> FieldValueMap {
    let mut query = FieldValueMap::new();
    query.insert("owner".to_string(), Value::from(owner));
    query
}

/// Runs concurrent writers: every thread stores batches under its own
/// owner tag, reads them back and removes every other batch.
///
/// Each thread checks after every step that it sees exactly its own
/// surviving documents, which only holds if no operation of another thread
/// interleaves with a half-applied one.
pub fn stress_concurrent_writers(store: &JsonStore, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = store.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                let owner = format!("writer-{t}");
                let mut expected = 0usize;
                for op in 0..config.operations {
                    let ok = if op % 2 == 0 {
                        let batch: Vec<Value> = (0..config.batch_size)
                            .map(|i| json!({"owner": owner, "seq": op * 100 + i}))
                            .collect();
                        let stored = store.store(&config.collection, batch, true);
                        if matches!(stored, Ok(n) if n == config.batch_size) {
                            expected += config.batch_size;
                            true
                        } else {
                            false
                        }
                    } else if op % 4 == 1 {
                        let mut query = owner_query(&owner);
                        query.insert("seq".to_string(), Value::from((op - 1) * 100));
                        match store.remove(&config.collection, vec![query], true, false) {
                            Ok(n) => {
                                expected -= n;
                                n == 1
                            }
                            Err(_) => false,
                        }
                    } else {
                        let found = store.find(
                            &config.collection,
                            vec![owner_query(&owner)],
                            FindOptions::new().exact(true),
                        );
                        matches!(found, Ok(docs) if docs.len() == expected)
                    };

                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Submits `count` asynchronous stores from one thread and checks they
/// complete in submission order.
pub fn stress_async_ordering(store: &JsonStore, config: &StressConfig, count: usize) -> StressTestResult {
    let start = Instant::now();
    let pending: Vec<_> = (0..count)
        .map(|i| {
            store.store_async(
                &config.collection,
                vec![json!({"owner": "async", "seq": i})],
                FieldValueMap::new(),
                false,
            )
        })
        .collect();

    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut last_id = i64::MIN;
    for p in pending {
        match p.wait() {
            Ok(ids) if ids.len() == 1 && ids[0] > last_id => {
                last_id = ids[0];
                successful += 1;
            }
            _ => failed += 1,
        }
    }
    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    fn stress_store(config: &StressConfig) -> TestStore {
        let store = TestStore::memory();
        store
            .provision(&config.collection, stress_fields(), Default::default())
            .unwrap();
        store
    }

    #[test]
    fn test_concurrent_writers_small() {
        let config = StressConfig {
            operations: 40,
            threads: 4,
            ..Default::default()
        };
        let store = stress_store(&config);
        let result = stress_concurrent_writers(&store, &config);
        assert_eq!(result.total_ops, 160);
        assert_eq!(result.failed_ops, 0);

        // 20 batches of 3 stored, 10 single removes, per thread
        assert_eq!(store.count(&config.collection).unwrap(), 4 * (20 * 3 - 10));
    }

    #[test]
    fn test_async_ordering() {
        let config = StressConfig::default();
        let store = stress_store(&config);
        let result = stress_async_ordering(&store, &config, 50);
        assert_eq!(result.successful_ops, 50);
        assert_eq!(store.count(&config.collection).unwrap(), 50);
    }
}
