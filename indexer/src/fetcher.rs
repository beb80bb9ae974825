use std::{future::Future, sync::Arc, time::Duration};

use domain::{format_usd, AssetItem};
use ethers::{
    types::{Address, U256},
    utils::format_units,
};
use thiserror::Error;
use tracing::debug;

use crate::{
    address::checksum,
    decimals::{DecimalsTable, FALLBACK_DECIMALS},
    reader::{Erc20Reader, RpcError},
    registry::FetchTask,
};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(6000);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no RPC endpoint configured")]
    NoEndpoint,
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl FetchError {
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::NoEndpoint => "no_endpoint",
            FetchError::Rpc(err) => err.reason(),
        }
    }
}

/// Reads one stablecoin balance on one chain.
#[derive(Clone)]
pub struct BalanceFetcher {
    reader: Arc<dyn Erc20Reader>,
    decimals: DecimalsTable,
    rpc_timeout: Duration,
}

impl BalanceFetcher {
    pub fn new(
        reader: Arc<dyn Erc20Reader>,
        decimals: DecimalsTable,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            reader,
            decimals,
            rpc_timeout,
        }
    }

    /// Best-effort read: every failure is logged and collapses to `None`,
    /// as does a zero balance.
    pub async fn fetch(&self, owner: Address, task: &FetchTask) -> Option<AssetItem> {
        match self.try_fetch(owner, task).await {
            Ok(asset) => asset,
            Err(err) => {
                debug!(
                    chain_id = %task.config.chain.id,
                    token = %task.token_type,
                    reason = err.reason(),
                    error = %err,
                    "balance fetch dropped"
                );
                metrics::counter!(
                    "balance_fetch_failures_total",
                    "chain_id" => task.config.chain.id.to_string(),
                    "reason" => err.reason()
                )
                .increment(1);
                None
            }
        }
    }

    pub async fn try_fetch(
        &self,
        owner: Address,
        task: &FetchTask,
    ) -> Result<Option<AssetItem>, FetchError> {
        let config = &task.config;
        if !config.has_endpoint() {
            return Err(FetchError::NoEndpoint);
        }
        let rpc_url = config.rpc_url.as_str();

        let decimals = match self.decimals.lookup(config.chain.id, task.token_type) {
            Some(known) => known,
            None => {
                match self
                    .with_deadline(self.reader.decimals(rpc_url, config.token_address))
                    .await
                {
                    Ok(decimals) => decimals,
                    Err(err) => {
                        debug!(
                            chain_id = %config.chain.id,
                            token = %task.token_type,
                            error = %err,
                            fallback = FALLBACK_DECIMALS,
                            "decimals() unavailable, using fallback"
                        );
                        FALLBACK_DECIMALS
                    }
                }
            }
        };

        let raw = self
            .with_deadline(self.reader.balance_of(rpc_url, config.token_address, owner))
            .await?;
        let Some((balance, amount)) = normalize_balance(raw, decimals)? else {
            return Ok(None);
        };

        let metadata = task.token_type.metadata();
        Ok(Some(AssetItem {
            chain: config.chain.clone(),
            symbol: metadata.symbol,
            token_type: task.token_type,
            balance,
            balance_usd: format_usd(amount),
            token_address: checksum(&config.token_address),
            token_image: metadata.image,
        }))
    }

    async fn with_deadline<T>(
        &self,
        call: impl Future<Output = Result<T, RpcError>>,
    ) -> Result<T, RpcError> {
        tokio::time::timeout(self.rpc_timeout, call)
            .await
            .map_err(|_| RpcError::Timeout(self.rpc_timeout))?
    }
}

/// Renders a raw token amount as a decimal string and its float value.
/// Returns `None` for balances that are not strictly positive.
pub fn normalize_balance(raw: U256, decimals: u8) -> Result<Option<(String, f64)>, RpcError> {
    let formatted = format_units(raw, decimals as i32)
        .map_err(|err| RpcError::Decode(format!("{raw} with {decimals} decimals: {err}")))?;
    let balance = trim_fraction(&formatted);
    let amount: f64 = balance
        .parse()
        .map_err(|_| RpcError::Decode(format!("non-numeric balance {balance}")))?;
    if amount <= 0.0 {
        return Ok(None);
    }
    Ok(Some((balance, amount)))
}

/// "1.500000" -> "1.5", "2.000000" -> "2.0"
fn trim_fraction(formatted: &str) -> String {
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{whole}.0")
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => format!("{formatted}.0"),
    }
}
