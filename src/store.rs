use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, interval};

use crate::error::StoreError;

/// Key-value store shared by every request handler.
///
/// Values carry an optional time-to-live and disappear once it elapses.
/// The rate limiter, the cache-aside helper and the password-reset tokens all
/// live here under their own key prefixes.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Increments the counter at `key` and returns the new count.
    ///
    /// When no live counter exists a new one is created at 1 with `ttl` as
    /// its expiry. The expiry of a live counter is never moved, so a window
    /// always closes `ttl` after its first hit. Both steps happen as one
    /// atomic operation.
    async fn incr_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Removes the value at `key` and returns it if it was still live.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Drops every key starting with `prefix`, returning how many live keys went.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

#[derive(Clone, Debug)]
enum StoreValue {
    Counter(u64),
    Text(String),
}

impl StoreValue {
    fn to_text(&self) -> String {
        match self {
            StoreValue::Counter(n) => n.to_string(),
            StoreValue::Text(s) => s.clone(),
        }
    }
}

#[derive(Clone, Debug)]
struct StoreEntry {
    value: StoreValue,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

// In-process store backed by DashMap.
// Every mutation of a single key runs under that key's shard lock.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoreEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // number of entries, expired ones included until the next sweep
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn incr_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let fresh = StoreEntry {
            value: StoreValue::Counter(1),
            expires_at: Some(now + ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(1)
            }
            Entry::Occupied(mut slot) => {
                // previous window is over, start again
                if slot.get().is_expired(now) {
                    slot.insert(fresh);
                    return Ok(1);
                }

                let entry = slot.get_mut();
                if entry.expires_at.is_none() {
                    entry.expires_at = Some(now + ttl);
                }
                match &mut entry.value {
                    StoreValue::Counter(count) => {
                        *count += 1;
                        Ok(*count)
                    }
                    StoreValue::Text(_) => Err(StoreError::NotACounter(key.to_string())),
                }
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            StoreEntry {
                value: StoreValue::Text(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.to_text()));
            }
        }
        // the read guard is gone by now, safe to remove
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value.to_text()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if !key.starts_with(prefix) {
                return true;
            }
            if !entry.is_expired(now) {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }
}

// Background sweeper - drops expired entries every `every`
pub async fn sweeper(store: Arc<MemoryStore>, every: Duration) {
    let mut interval = interval(every);

    tracing::info!(interval = ?every, "store sweeper started");

    loop {
        interval.tick().await;

        let removed = store.sweep_expired();
        if removed > 0 {
            tracing::debug!(removed, remaining = store.len(), "swept expired store entries");
        }
    }
}
