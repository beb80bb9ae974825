use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::{Http, Provider},
    types::{Address, U256},
};
use thiserror::Error;
use tokio::sync::RwLock;

abigen!(
    Erc20Token,
    r#"[
        function balanceOf(address owner) view returns (uint256)
        function decimals() view returns (uint8)
    ]"#,
);

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid RPC endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },
    #[error("contract call failed: {0}")]
    Call(String),
    #[error("RPC call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed RPC response: {0}")]
    Decode(String),
}

impl RpcError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RpcError::InvalidEndpoint { .. } => "endpoint",
            RpcError::Call(_) => "call",
            RpcError::Timeout(_) => "timeout",
            RpcError::Decode(_) => "decode",
        }
    }
}

/// Read-only ERC-20 access over an EVM JSON-RPC endpoint.
///
/// Implementations must be cancel-safe: callers enforce deadlines by
/// dropping the returned future.
#[async_trait]
pub trait Erc20Reader: Send + Sync {
    async fn balance_of(
        &self,
        rpc_url: &str,
        token: Address,
        owner: Address,
    ) -> Result<U256, RpcError>;

    async fn decimals(&self, rpc_url: &str, token: Address) -> Result<u8, RpcError>;
}

/// `eth_call` reader backed by ethers HTTP providers, one per endpoint.
///
/// Dropping an in-flight call drops the underlying HTTP request, so a
/// deadline enforced by the caller cancels the transport work as well.
#[derive(Default)]
pub struct EthersErc20Reader {
    providers: RwLock<HashMap<String, Arc<Provider<Http>>>>,
}

impl EthersErc20Reader {
    pub fn new() -> Self {
        Self::default()
    }

    async fn provider(&self, rpc_url: &str) -> Result<Arc<Provider<Http>>, RpcError> {
        if let Some(provider) = self.providers.read().await.get(rpc_url) {
            return Ok(provider.clone());
        }
        let provider =
            Provider::<Http>::try_from(rpc_url).map_err(|err| RpcError::InvalidEndpoint {
                url: rpc_url.to_string(),
                message: err.to_string(),
            })?;
        let mut providers = self.providers.write().await;
        Ok(providers
            .entry(rpc_url.to_string())
            .or_insert_with(|| Arc::new(provider))
            .clone())
    }
}

#[async_trait]
impl Erc20Reader for EthersErc20Reader {
    async fn balance_of(
        &self,
        rpc_url: &str,
        token: Address,
        owner: Address,
    ) -> Result<U256, RpcError> {
        let provider = self.provider(rpc_url).await?;
        Erc20Token::new(token, provider)
            .balance_of(owner)
            .call()
            .await
            .map_err(|err| RpcError::Call(err.to_string()))
    }

    async fn decimals(&self, rpc_url: &str, token: Address) -> Result<u8, RpcError> {
        let provider = self.provider(rpc_url).await?;
        Erc20Token::new(token, provider)
            .decimals()
            .call()
            .await
            .map_err(|err| RpcError::Call(err.to_string()))
    }
}
