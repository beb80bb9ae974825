use std::{collections::HashMap, time::Duration};

use domain::{AssetItem, ChainId};
use ethers::types::Address;
use futures::future::join_all;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::{fetcher::BalanceFetcher, registry::FetchTask};

/// Chains most likely to hold balances, checked first.
pub const PRIORITY_CHAINS: [u64; 11] = [
    56, 1, 8453, 137, 42161, // tier 1
    10, 43114, 80094, // tier 2
    59144, 4337, 1030, // tier 3
];

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 20;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_concurrent_requests: usize,
    pub batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

#[derive(Debug)]
pub struct ProviderGroup {
    pub domain: String,
    pub tasks: Vec<FetchTask>,
}

fn priority_rank(chain_id: ChainId) -> usize {
    PRIORITY_CHAINS
        .iter()
        .position(|id| *id == chain_id.as_u64())
        .unwrap_or(PRIORITY_CHAINS.len())
}

/// Orders tasks token type by token type, prioritized chains first.
/// The sort is stable, so unlisted chains keep their incoming order.
pub fn prioritize(mut tasks: Vec<FetchTask>) -> Vec<FetchTask> {
    tasks.sort_by_key(|task| (task.token_type, priority_rank(task.config.chain.id)));
    tasks
}

/// Hostname of an RPC endpoint; the raw string when it does not parse.
pub fn provider_domain(rpc_url: &str) -> String {
    Url::parse(rpc_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| rpc_url.to_string())
}

/// Buckets tasks by provider domain in first-seen order. Tasks without an
/// endpoint are dropped here and never reach the fetcher.
pub fn group_by_provider(tasks: Vec<FetchTask>) -> Vec<ProviderGroup> {
    let mut groups: Vec<ProviderGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for task in tasks {
        if !task.config.has_endpoint() {
            debug!(
                chain_id = %task.config.chain.id,
                token = %task.token_type,
                "skipping chain without RPC endpoint"
            );
            continue;
        }
        let domain = provider_domain(&task.config.rpc_url);
        match index.get(&domain) {
            Some(position) => groups[*position].tasks.push(task),
            None => {
                index.insert(domain.clone(), groups.len());
                groups.push(ProviderGroup {
                    domain,
                    tasks: vec![task],
                });
            }
        }
    }
    groups
}

/// Drives fetches provider by provider: groups and batches run one after
/// another, tasks inside a batch run concurrently.
#[derive(Clone)]
pub struct BatchScheduler {
    fetcher: BalanceFetcher,
    config: BatchConfig,
}

impl BatchScheduler {
    pub fn new(fetcher: BalanceFetcher, config: BatchConfig) -> Self {
        Self { fetcher, config }
    }

    pub async fn run(&self, owner: Address, tasks: Vec<FetchTask>) -> Vec<AssetItem> {
        let batch_size = self.config.max_concurrent_requests.max(1);
        let mut assets = Vec::new();

        for group in group_by_provider(prioritize(tasks)) {
            let batch_count = group.tasks.len().div_ceil(batch_size);
            debug!(
                provider = %group.domain,
                tasks = group.tasks.len(),
                batches = batch_count,
                "processing provider group"
            );
            for (batch_index, batch) in group.tasks.chunks(batch_size).enumerate() {
                let results =
                    join_all(batch.iter().map(|task| self.fetcher.fetch(owner, task))).await;
                assets.extend(results.into_iter().flatten());

                if batch_index + 1 < batch_count && !self.config.batch_delay.is_zero() {
                    sleep(self.config.batch_delay).await;
                }
            }
        }
        assets
    }
}
