use std::sync::Arc;

use anyhow::Result;
use indexer::{
    AggregatorService, BalanceCache, BalanceFetcher, BatchConfig, BatchScheduler, DecimalsTable,
    Erc20Reader, EthersErc20Reader, InMemoryBalanceCache, TokenRegistry,
};
use tracing::info;

use crate::{config::AppConfig, services::RedisBalanceCache, state::AppState};

pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let cache: Arc<dyn BalanceCache> = match &config.redis_url {
        Some(url) => {
            info!("balance cache backed by redis");
            Arc::new(RedisBalanceCache::new(url, config.cache_duration)?)
        }
        None => Arc::new(InMemoryBalanceCache::new(
            config.cache_max_entries,
            config.cache_duration,
        )),
    };
    build_state_with(config, Arc::new(EthersErc20Reader::new()), cache)
}

/// Wires the balance pipeline around an arbitrary chain reader and cache.
pub fn build_state_with(
    config: &AppConfig,
    reader: Arc<dyn Erc20Reader>,
    cache: Arc<dyn BalanceCache>,
) -> Result<AppState> {
    let registry = Arc::new(TokenRegistry::standard(&config.chain_rpc_urls)?);
    info!(
        known_tokens = registry.len(),
        enabled_tokens = registry.enabled_len(),
        configured_chains = config.chain_rpc_urls.len(),
        "token registry loaded"
    );

    let fetcher = BalanceFetcher::new(reader, DecimalsTable::standard(), config.rpc_timeout);
    let scheduler = BatchScheduler::new(
        fetcher,
        BatchConfig {
            max_concurrent_requests: config.max_concurrent_requests,
            batch_delay: config.batch_delay,
        },
    );
    let balances = Arc::new(AggregatorService::new(
        registry.clone(),
        scheduler,
        cache,
        config.cache_duration,
    ));

    Ok(AppState {
        config: config.clone(),
        registry,
        balances,
    })
}
