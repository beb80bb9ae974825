use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use indexer::{checksum, BalanceCache, CacheEntry};
use thiserror::Error;
use tracing::warn;

/// Shared balance cache for several API replicas.
///
/// Entries are kept well past the freshness window so the service can still
/// report their age; Redis expiry bounds total size.
#[derive(Clone)]
pub struct RedisBalanceCache {
    client: redis::Client,
    key_prefix: String,
    expiry: Duration,
}

#[derive(Debug, Error)]
enum RedisCacheError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache entry encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl RedisBalanceCache {
    pub fn new(redis_url: &str, cache_duration: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: "balances:".to_string(),
            expiry: (cache_duration * 10).max(Duration::from_secs(1)),
        })
    }

    fn key(&self, address: &Address) -> String {
        format!("{}{}", self.key_prefix, checksum(address))
    }

    async fn read(&self, address: &Address) -> Result<Option<CacheEntry>, RedisCacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(address))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(RedisCacheError::from)
    }

    async fn write(&self, address: &Address, entry: &CacheEntry) -> Result<(), RedisCacheError> {
        let payload = serde_json::to_string(entry)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(self.key(address))
            .arg(payload)
            .arg("EX")
            .arg(self.expiry.as_secs() as usize)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BalanceCache for RedisBalanceCache {
    async fn get(&self, address: &Address) -> Option<CacheEntry> {
        match self.read(address).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, wallet = %checksum(address), "balance cache read failed");
                None
            }
        }
    }

    async fn put(&self, address: Address, entry: CacheEntry) {
        if let Err(err) = self.write(&address, &entry).await {
            warn!(error = %err, wallet = %checksum(&address), "balance cache write failed");
        }
    }
}
