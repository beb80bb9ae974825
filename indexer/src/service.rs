use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::BalanceSnapshot;
use ethers::types::Address;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    address::checksum,
    aggregate::aggregate,
    cache::{BalanceCache, CacheEntry},
    registry::TokenRegistry,
    scheduler::BatchScheduler,
};

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("balance pipeline aborted: {0}")]
    Pipeline(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Computed for this request, or by a concurrent one it waited on.
    Fresh,
    Cached {
        age: Duration,
        next_refresh_in: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct BalanceQuery {
    pub snapshot: BalanceSnapshot,
    pub status: CacheStatus,
}

#[async_trait]
pub trait BalanceService: Send + Sync {
    async fn balances(
        &self,
        owner: Address,
        force_refresh: bool,
    ) -> Result<BalanceQuery, AggregationError>;

    /// How long a stored result is served without refetching.
    fn cache_window(&self) -> Duration;
}

type RefreshLocks = StdMutex<HashMap<Address, Arc<Mutex<()>>>>;

/// Cache-fronted balance pipeline with one refresh in flight per wallet.
pub struct AggregatorService {
    registry: Arc<TokenRegistry>,
    scheduler: BatchScheduler,
    cache: Arc<dyn BalanceCache>,
    cache_window: Duration,
    refresh_locks: RefreshLocks,
}

impl AggregatorService {
    pub fn new(
        registry: Arc<TokenRegistry>,
        scheduler: BatchScheduler,
        cache: Arc<dyn BalanceCache>,
        cache_window: Duration,
    ) -> Self {
        Self {
            registry,
            scheduler,
            cache,
            cache_window,
            refresh_locks: StdMutex::new(HashMap::new()),
        }
    }

    async fn cached(&self, owner: &Address, now: DateTime<Utc>) -> Option<BalanceQuery> {
        let entry = self.cache.get(owner).await?;
        let age = entry.age(now);
        if age >= self.cache_window {
            return None;
        }
        Some(BalanceQuery {
            snapshot: entry.snapshot,
            status: CacheStatus::Cached {
                age,
                next_refresh_in: self.cache_window - age,
            },
        })
    }

    fn refresh_slot(&self, owner: Address) -> RefreshSlot<'_> {
        let lock = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(owner)
            .or_default()
            .clone();
        RefreshSlot {
            locks: &self.refresh_locks,
            owner,
            lock,
        }
    }

    async fn refresh(
        &self,
        owner: Address,
        requested_at: DateTime<Utc>,
    ) -> Result<BalanceQuery, AggregationError> {
        if let Some(entry) = self.cache.get(&owner).await {
            if entry.stored_at >= requested_at {
                debug!(wallet = %checksum(&owner), "joined concurrent refresh");
                return Ok(BalanceQuery {
                    snapshot: entry.snapshot,
                    status: CacheStatus::Fresh,
                });
            }
        }

        let started = Instant::now();
        let scheduler = self.scheduler.clone();
        let tasks = self.registry.tasks();
        let task_count = tasks.len();
        let assets = tokio::spawn(async move { scheduler.run(owner, tasks).await })
            .await
            .map_err(|err| AggregationError::Pipeline(err.to_string()))?;

        let snapshot = aggregate(assets);
        let elapsed = started.elapsed();
        metrics::histogram!("balance_pipeline_seconds").record(elapsed.as_secs_f64());
        info!(
            wallet = %checksum(&owner),
            tasks = task_count,
            assets = snapshot.assets.len(),
            total_usd = %snapshot.total_usd_value,
            elapsed_ms = elapsed.as_millis() as u64,
            "balances refreshed"
        );

        self.cache
            .put(owner, CacheEntry::new(snapshot.clone()))
            .await;
        Ok(BalanceQuery {
            snapshot,
            status: CacheStatus::Fresh,
        })
    }

    #[cfg(test)]
    fn pending_locks(&self) -> usize {
        self.refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl BalanceService for AggregatorService {
    async fn balances(
        &self,
        owner: Address,
        force_refresh: bool,
    ) -> Result<BalanceQuery, AggregationError> {
        let requested_at = Utc::now();
        if !force_refresh {
            if let Some(query) = self.cached(&owner, requested_at).await {
                metrics::counter!("balance_queries_total", "source" => "cache").increment(1);
                return Ok(query);
            }
        }

        let slot = self.refresh_slot(owner);
        let _guard = slot.lock.lock().await;
        metrics::counter!("balance_queries_total", "source" => "pipeline").increment(1);
        self.refresh(owner, requested_at).await
    }

    fn cache_window(&self) -> Duration {
        self.cache_window
    }
}

/// Per-wallet refresh lock; the map entry goes away with its last holder,
/// including when the holding request is cancelled.
struct RefreshSlot<'a> {
    locks: &'a RefreshLocks,
    owner: Address,
    lock: Arc<Mutex<()>>,
}

impl Drop for RefreshSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::InMemoryBalanceCache,
        decimals::DecimalsTable,
        fetcher::{BalanceFetcher, DEFAULT_RPC_TIMEOUT},
        reader::{Erc20Reader, RpcError},
        scheduler::BatchConfig,
        testing::FakeErc20Reader,
    };
    use chrono::Duration as ChronoDuration;
    use domain::{ChainId, TokenType};
    use ethers::types::U256;

    const ETH_RPC: &str = "https://eth.rpc.example.org";
    const BSC_RPC: &str = "https://bsc.rpc.example.org";

    fn registry() -> Arc<TokenRegistry> {
        let urls = HashMap::from([
            (ChainId(1), ETH_RPC.to_string()),
            (ChainId(56), BSC_RPC.to_string()),
        ]);
        Arc::new(TokenRegistry::standard(&urls).unwrap())
    }

    fn service(
        reader: Arc<dyn Erc20Reader>,
        cache: Arc<InMemoryBalanceCache>,
    ) -> AggregatorService {
        let scheduler = BatchScheduler::new(
            BalanceFetcher::new(reader, DecimalsTable::standard(), DEFAULT_RPC_TIMEOUT),
            BatchConfig::default(),
        );
        AggregatorService::new(registry(), scheduler, cache, Duration::from_secs(30))
    }

    fn wallet() -> Address {
        Address::from_low_u64_be(0xbeef)
    }

    fn usdc_mainnet() -> Address {
        registry()
            .lookup(TokenType::Usdc, ChainId(1))
            .unwrap()
            .token_address
    }

    #[tokio::test]
    async fn empty_wallet_yields_zero_total() {
        let reader = Arc::new(FakeErc20Reader::new());
        let service = service(reader.clone(), Arc::new(InMemoryBalanceCache::default()));

        let query = service.balances(wallet(), false).await.unwrap();
        assert!(query.snapshot.assets.is_empty());
        assert_eq!(query.snapshot.total_usd_value, "0.00");
        assert_eq!(query.status, CacheStatus::Fresh);
        // USDT and USDC on the two configured chains only.
        assert_eq!(reader.balance_calls(), 4);
    }

    #[tokio::test]
    async fn single_usdc_balance_end_to_end() {
        let reader = Arc::new(FakeErc20Reader::new());
        reader.set_balance(ETH_RPC, usdc_mainnet(), U256::from(100_123_456u64));
        let service = service(reader.clone(), Arc::new(InMemoryBalanceCache::default()));

        let query = service.balances(wallet(), false).await.unwrap();
        assert_eq!(query.snapshot.assets.len(), 1);
        let asset = &query.snapshot.assets[0];
        assert_eq!(asset.balance, "100.123456");
        assert_eq!(asset.balance_usd, "100.12");
        assert_eq!(asset.chain.id, ChainId(1));
        assert_eq!(query.snapshot.total_usd_value, "100.12");
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let reader = Arc::new(FakeErc20Reader::new());
        reader.set_balance(ETH_RPC, usdc_mainnet(), U256::from(5_000_000u64));
        let service = service(reader.clone(), Arc::new(InMemoryBalanceCache::default()));

        let first = service.balances(wallet(), false).await.unwrap();
        let second = service.balances(wallet(), false).await.unwrap();

        assert_eq!(first.snapshot, second.snapshot);
        assert!(matches!(second.status, CacheStatus::Cached { .. }));
        if let CacheStatus::Cached {
            age,
            next_refresh_in,
        } = second.status
        {
            assert_eq!(age + next_refresh_in, Duration::from_secs(30));
        }
        assert_eq!(reader.balance_calls(), 4);
    }

    #[tokio::test]
    async fn force_refresh_reruns_pipeline() {
        let reader = Arc::new(FakeErc20Reader::new());
        let service = service(reader.clone(), Arc::new(InMemoryBalanceCache::default()));

        service.balances(wallet(), false).await.unwrap();
        let forced = service.balances(wallet(), true).await.unwrap();

        assert_eq!(forced.status, CacheStatus::Fresh);
        assert_eq!(reader.balance_calls(), 8);
    }

    #[tokio::test]
    async fn stale_entry_is_bypassed() {
        let reader = Arc::new(FakeErc20Reader::new());
        let cache = Arc::new(InMemoryBalanceCache::default());
        cache
            .put(
                wallet(),
                CacheEntry {
                    snapshot: aggregate(vec![]),
                    stored_at: Utc::now() - ChronoDuration::seconds(45),
                },
            )
            .await;
        let service = service(reader.clone(), cache.clone());

        let query = service.balances(wallet(), false).await.unwrap();
        assert_eq!(query.status, CacheStatus::Fresh);
        assert_eq!(reader.balance_calls(), 4);
        assert!(cache.get(&wallet()).await.unwrap().age(Utc::now()) < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_pipeline_run() {
        let reader = Arc::new(FakeErc20Reader::new());
        reader.set_latency(Duration::from_millis(200));
        let service = service(reader.clone(), Arc::new(InMemoryBalanceCache::default()));

        let (first, second) = tokio::join!(
            service.balances(wallet(), true),
            service.balances(wallet(), false)
        );

        assert_eq!(first.unwrap().status, CacheStatus::Fresh);
        assert_eq!(second.unwrap().status, CacheStatus::Fresh);
        assert_eq!(reader.balance_calls(), 4);
        assert_eq!(service.pending_locks(), 0);
    }

    struct PanickingReader;

    #[async_trait]
    impl Erc20Reader for PanickingReader {
        async fn balance_of(
            &self,
            _rpc_url: &str,
            _token: Address,
            _owner: Address,
        ) -> Result<U256, RpcError> {
            panic!("corrupted provider state");
        }

        async fn decimals(&self, _rpc_url: &str, _token: Address) -> Result<u8, RpcError> {
            panic!("corrupted provider state");
        }
    }

    #[tokio::test]
    async fn pipeline_failure_is_reported_and_not_cached() {
        let cache = Arc::new(InMemoryBalanceCache::default());
        let service = service(Arc::new(PanickingReader), cache.clone());

        let result = service.balances(wallet(), false).await;
        assert!(matches!(result, Err(AggregationError::Pipeline(_))));
        assert!(cache.is_empty().await);
        assert_eq!(service.pending_locks(), 0);
    }
}
