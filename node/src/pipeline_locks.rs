use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use crate::NodeError;

/// Per-key locks for the amendment pipeline.
/// Operations on different proposals run concurrently.
/// Operations on the same proposal (or session) are serialized.
pub struct PipelineLocks {
    /// Per-key mutexes
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Maximum concurrent top-level operations
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

/// Held for the duration of one top-level pipeline operation.
pub struct PipelineGuard {
    _permit: OwnedSemaphorePermit,
    _guard: OwnedMutexGuard<()>,
}

impl PipelineLocks {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Get or create the lock for a key.
    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start a top-level operation on `key`: takes a concurrency permit,
    /// then the key's lock.
    pub async fn acquire(&self, key: &str) -> Result<PipelineGuard, NodeError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| NodeError::Other(format!("pipeline closed: {e}")))?;
        let guard = self.key_lock(key).await.lock_owned().await;
        Ok(PipelineGuard {
            _permit: permit,
            _guard: guard,
        })
    }

    /// Lock an additional key inside an operation that already holds a
    /// permit. Callers take keys in a fixed order: proposal before session.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.key_lock(key).await.lock_owned().await
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of keys with a lock entry.
    pub async fn tracked_keys(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Drop locks nobody is holding or waiting on.
    pub async fn cleanup(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
