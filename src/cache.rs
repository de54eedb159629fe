use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::metrics::{CACHE_HITS, CACHE_MISSES};
use crate::store::SharedStore;

// Create a cache key: prefix plus a hash of the serialized arguments
pub fn make_cache_key<A: Serialize + ?Sized>(prefix: &str, args: &A) -> Result<String, StoreError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(args)?);
    Ok(format!("{}:{:x}", prefix, hasher.finalize()))
}

/// Cache-aside helper over the shared store.
///
/// Values are stored as JSON. The cache is best effort: a store failure on
/// read or write is logged and the caller's operation runs as if it was a miss.
/// Nothing is invalidated implicitly, callers drop stale entries with
/// [`Cache::invalidate_prefix`] after a mutation.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn SharedStore>,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn SharedStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // stale shape from an older build, treat as a miss
                tracing::debug!(key, error = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.store
            .set(key, raw, Some(ttl.unwrap_or(self.default_ttl)))
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.store.delete(key).await
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let removed = self.store.delete_prefix(prefix).await?;
        tracing::debug!(prefix, removed, "invalidated cache entries");
        Ok(removed)
    }

    /// Returns the cached value at `key`, or runs `op` and caches its `Ok` result.
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        op: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get_json::<T>(key).await {
            Ok(Some(value)) => {
                CACHE_HITS.inc();
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "cache read failed"),
        }
        CACHE_MISSES.inc();

        let value = op().await?;
        if let Err(e) = self.set_json(key, &value, ttl).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryStore::new()), Duration::from_secs(60))
    }

    #[test]
    fn keys_depend_on_prefix_and_args() {
        let a = make_cache_key("permissions", &("user", 1)).unwrap();
        let b = make_cache_key("permissions", &("user", 2)).unwrap();
        let c = make_cache_key("other", &("user", 1)).unwrap();

        assert!(a.starts_with("permissions:"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, make_cache_key("permissions", &("user", 1)).unwrap());
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Vec<u32>, StoreError> = cache
                .get_or_insert_with("numbers:1", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(value.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = cache();

        let first: Result<u32, String> = cache
            .get_or_insert_with("flaky", None, || async { Err("boom".to_string()) })
            .await;
        assert!(first.is_err());

        let second: Result<u32, String> = cache.get_or_insert_with("flaky", None, || async { Ok(7) }).await;
        assert_eq!(second.unwrap(), 7);
    }

    #[tokio::test]
    async fn invalidate_prefix_forces_recompute() {
        let cache = cache();
        cache.set_json("permissions:a", &1u32, None).await.unwrap();
        cache.set_json("permissions:b", &2u32, None).await.unwrap();
        cache.set_json("unrelated", &3u32, None).await.unwrap();

        assert_eq!(cache.invalidate_prefix("permissions:").await.unwrap(), 2);
        assert_eq!(cache.get_json::<u32>("permissions:a").await.unwrap(), None);
        assert_eq!(cache.get_json::<u32>("unrelated").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = cache();
        cache.set_json("k", "not a number", None).await.unwrap();
        assert_eq!(cache.get_json::<u32>("k").await.unwrap(), None);
    }
}
