//! Failure-injecting ledger store for testing.

use crate::application::ports::{LedgerDelta, LedgerEntry, LedgerStore, StorageError};
use crate::infrastructure::store::MemoryStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ledger store that fails a configured number of saves, then recovers.
///
/// Simulates a temporarily unavailable storage area for exercising the
/// ledger's buffered-delta retry path. Successful saves land in an inner
/// [`MemoryStore`], which deduplicates replays by sequence id.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failures_remaining: AtomicUsize,
    save_attempts: AtomicUsize,
}

impl FlakyStore {
    /// Create a store that fails the next `failures` save attempts.
    pub fn failing(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_remaining: AtomicUsize::new(failures),
            save_attempts: AtomicUsize::new(0),
        }
    }

    /// Make the next `failures` save attempts fail.
    pub fn fail_next(&self, failures: usize) {
        self.failures_remaining.store(failures, Ordering::Relaxed);
    }

    /// Total save attempts, failed or not.
    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::Relaxed)
    }

    /// The persisted entries, for assertions.
    pub async fn persisted(&self) -> Vec<LedgerEntry> {
        self.inner.load().await.unwrap_or_default()
    }

    fn should_fail(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn save_delta(&self, delta: &LedgerDelta) -> Result<(), StorageError> {
        self.save_attempts.fetch_add(1, Ordering::Relaxed);
        if self.should_fail() {
            return Err(StorageError::unavailable("simulated outage"));
        }
        self.inner.save_delta(delta).await
    }

    async fn load(&self) -> Result<Vec<LedgerEntry>, StorageError> {
        self.inner.load().await
    }
}
