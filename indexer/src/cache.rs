use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::BalanceSnapshot;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_millis(30_000);
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub snapshot: BalanceSnapshot,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(snapshot: BalanceSnapshot) -> Self {
        Self {
            snapshot,
            stored_at: Utc::now(),
        }
    }

    /// Time since the entry was stored; zero if the clock went backwards.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or_default()
    }
}

/// Last aggregated result per wallet. Entries past the freshness window are
/// bypassed by the service, not removed.
#[async_trait]
pub trait BalanceCache: Send + Sync {
    async fn get(&self, address: &Address) -> Option<CacheEntry>;
    async fn put(&self, address: Address, entry: CacheEntry);
}

/// Process-local cache with a hard size bound.
pub struct InMemoryBalanceCache {
    entries: RwLock<HashMap<Address, CacheEntry>>,
    max_entries: usize,
    stale_after: Duration,
}

impl InMemoryBalanceCache {
    pub fn new(max_entries: usize, stale_after: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            stale_after,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryBalanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_DURATION)
    }
}

#[async_trait]
impl BalanceCache for InMemoryBalanceCache {
    async fn get(&self, address: &Address) -> Option<CacheEntry> {
        self.entries.read().await.get(address).cloned()
    }

    async fn put(&self, address: Address, entry: CacheEntry) {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(&address) && entries.len() >= self.max_entries {
            // Stale entries go first; only then sacrifice the oldest live one.
            let now = Utc::now();
            entries.retain(|_, existing| existing.age(now) < self.stale_after);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, existing)| existing.stored_at)
                    .map(|(key, _)| *key);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(address, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use chrono::Duration as ChronoDuration;

    fn entry_aged(secs: i64) -> CacheEntry {
        CacheEntry {
            snapshot: aggregate(vec![]),
            stored_at: Utc::now() - ChronoDuration::seconds(secs),
        }
    }

    #[tokio::test]
    async fn put_overwrites_same_address() {
        let cache = InMemoryBalanceCache::default();
        let wallet = Address::from_low_u64_be(1);
        cache.put(wallet, entry_aged(20)).await;
        cache.put(wallet, entry_aged(0)).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&wallet).await.unwrap().age(Utc::now()) < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn full_cache_sweeps_stale_entries_first() {
        let cache = InMemoryBalanceCache::new(3, Duration::from_secs(30));
        cache.put(Address::from_low_u64_be(1), entry_aged(90)).await;
        cache.put(Address::from_low_u64_be(2), entry_aged(60)).await;
        cache.put(Address::from_low_u64_be(3), entry_aged(1)).await;
        cache.put(Address::from_low_u64_be(4), entry_aged(0)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&Address::from_low_u64_be(1)).await.is_none());
        assert!(cache.get(&Address::from_low_u64_be(3)).await.is_some());
        assert!(cache.get(&Address::from_low_u64_be(4)).await.is_some());
    }

    #[tokio::test]
    async fn full_cache_of_live_entries_evicts_the_oldest() {
        let cache = InMemoryBalanceCache::new(2, Duration::from_secs(30));
        cache.put(Address::from_low_u64_be(1), entry_aged(10)).await;
        cache.put(Address::from_low_u64_be(2), entry_aged(5)).await;
        cache.put(Address::from_low_u64_be(3), entry_aged(0)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&Address::from_low_u64_be(1)).await.is_none());
        assert!(cache.get(&Address::from_low_u64_be(2)).await.is_some());
    }
}
