use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use once_cell::sync::Lazy;
use tokio::sync::{Mutex, OwnedMutexGuard};

type BucketKey = (Option<String>, String);

static SHARED: Lazy<Arc<BucketLocks>> = Lazy::new(|| Arc::new(BucketLocks::new()));

/// Per-bucket mutual exclusion for bucket-policy read-merge-write cycles
/// inside one process. Keys are `(endpoint override, bucket)`.
#[derive(Debug, Default)]
pub struct BucketLocks {
    locks: StdMutex<HashMap<BucketKey, Arc<Mutex<()>>>>,
}

impl BucketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by pipelines unless given their own.
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    /// Wait for exclusive access to the policy of `bucket`.
    pub async fn lock(&self, endpoint_override: Option<&str>, bucket: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries only referenced by the map are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((endpoint_override.map(str::to_string), bucket.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of buckets currently locked or awaited.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_bucket_is_exclusive() {
        let locks = Arc::new(BucketLocks::new());
        let guard = locks.lock(None, "dst").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(None, "dst").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_buckets_and_endpoints_do_not_block() {
        let locks = BucketLocks::new();
        let _a = locks.lock(None, "dst").await;
        let _b = locks.lock(None, "other").await;
        let _c = locks.lock(Some("http://minio:9000"), "dst").await;
        assert_eq!(locks.tracked(), 3);
    }

    #[test]
    fn shared_registry_is_a_single_instance() {
        assert!(Arc::ptr_eq(&BucketLocks::shared(), &BucketLocks::shared()));
        assert!(!Arc::ptr_eq(&BucketLocks::shared(), &Arc::new(BucketLocks::new())));
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = BucketLocks::new();
        drop(locks.lock(None, "a").await);
        drop(locks.lock(None, "b").await);
        let _held = locks.lock(None, "c").await;

        let stored = locks.locks.lock().unwrap().len();
        assert_eq!(stored, 1);
        assert_eq!(locks.tracked(), 1);
    }
}
