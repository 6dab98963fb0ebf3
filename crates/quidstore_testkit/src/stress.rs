//! Concurrency stress helpers.
//!
//! Hammer a collection from several threads and report what happened, so
//! tests can assert on uniqueness of ids and on lost updates.

use quidstore_core::Collection;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl StressResult {
    /// Total operations attempted.
    pub fn total_ops(&self) -> usize {
        self.successful_ops + self.failed_ops
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Operations per thread.
    pub ops_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            ops_per_thread: 25,
        }
    }
}

/// Creates documents concurrently and returns the run result together with
/// every uuid handed out.
pub fn concurrent_creates(
    collection: &Arc<Collection>,
    config: &StressConfig,
) -> (StressResult, Vec<String>) {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let collection = Arc::clone(collection);
            let ops = config.ops_per_thread;
            thread::spawn(move || {
                (0..ops)
                    .map(|i| {
                        collection
                            .create(json!({"name": format!("t{t}-{i}")}))
                            .map(|doc| doc.uuid().unwrap_or_default().to_string())
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = Vec::new();
    let mut failed = 0;
    for handle in handles {
        for outcome in handle.join().expect("Worker panicked") {
            match outcome {
                Ok(id) => ids.push(id),
                Err(_) => failed += 1,
            }
        }
    }

    let result = StressResult {
        successful_ops: ids.len(),
        failed_ops: failed,
        duration: start.elapsed(),
    };
    (result, ids)
}

/// Increments `field` of the document `uuid` from many threads at once.
pub fn concurrent_increments(
    collection: &Arc<Collection>,
    uuid: &str,
    field: &str,
    config: &StressConfig,
) -> StressResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let collection = Arc::clone(collection);
            let filter = json!({"uuid": uuid});
            let update = json!({"$inc": {field: 1}});
            let ops = config.ops_per_thread;
            thread::spawn(move || {
                (0..ops)
                    .filter(|_| {
                        matches!(collection.find_one_and_update(&filter, &update), Ok(Some(_)))
                    })
                    .count()
            })
        })
        .collect();

    let successful: usize = handles
        .into_iter()
        .map(|h| h.join().expect("Worker panicked"))
        .sum();
    StressResult {
        successful_ops: successful,
        failed_ops: config.threads * config.ops_per_thread - successful,
        duration: start.elapsed(),
    }
}

/// Returns `true` if every id in `ids` is distinct.
pub fn all_unique(ids: &[String]) -> bool {
    ids.iter().collect::<HashSet<_>>().len() == ids.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn creates_get_distinct_ids() {
        let store = TestStore::memory();
        let profiles = store.profiles();
        let config = StressConfig {
            threads: 4,
            ops_per_thread: 10,
        };
        let (result, ids) = concurrent_creates(&profiles, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.total_ops(), 40);
        assert!(all_unique(&ids));
        assert_eq!(profiles.len().unwrap(), 40);
    }

    #[test]
    fn increments_are_not_lost() {
        let store = TestStore::memory();
        let profiles = store.profiles();
        let doc = profiles.create(json!({"name": "Rex"})).unwrap();
        let uuid = doc.uuid().unwrap();

        let result = concurrent_increments(&profiles, uuid, "experience", &StressConfig::default());
        assert_eq!(result.failed_ops, 0);
        let after = profiles.get(uuid).unwrap().unwrap();
        assert_eq!(after.get("experience"), Some(&json!(200)));
    }
}
