use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
};

use domain::{ChainId, ChainInfo, PublicTokenConfig, TokenType};
use ethers::types::Address;
use thiserror::Error;
use tracing::warn;

use crate::address::checksum;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid {token_type} contract address on chain {chain_id}: {address}")]
    InvalidContract {
        token_type: TokenType,
        chain_id: ChainId,
        address: String,
    },
    #[error("unknown chain {0} referenced by token table")]
    UnknownChain(ChainId),
}

struct ChainDef {
    id: u64,
    name: &'static str,
    color: &'static str,
    icon: &'static str,
}

const CHAINS: &[ChainDef] = &[
    ChainDef {
        id: 1,
        name: "Ethereum",
        color: "blue",
        icon: "/chains/ethereum.png",
    },
    ChainDef {
        id: 56,
        name: "BNB Chain",
        color: "yellow",
        icon: "/chains/bnb.png",
    },
    ChainDef {
        id: 42161,
        name: "Arbitrum One",
        color: "blue",
        icon: "/chains/arbitrum.png",
    },
    ChainDef {
        id: 10,
        name: "Optimism",
        color: "red",
        icon: "/chains/optimism.png",
    },
    ChainDef {
        id: 137,
        name: "Polygon",
        color: "purple",
        icon: "/chains/polygon.png",
    },
    ChainDef {
        id: 43114,
        name: "Avalanche",
        color: "red",
        icon: "/chains/avalanche.png",
    },
    ChainDef {
        id: 59144,
        name: "Linea",
        color: "green",
        icon: "/chains/linea.png",
    },
    ChainDef {
        id: 1030,
        name: "Conflux eSpace",
        color: "orange",
        icon: "/chains/conflux.png",
    },
    ChainDef {
        id: 8453,
        name: "Base",
        color: "blue",
        icon: "/chains/base.png",
    },
    ChainDef {
        id: 80094,
        name: "Berachain",
        color: "yellow",
        icon: "/chains/berachain.png",
    },
    ChainDef {
        id: 4337,
        name: "Sonic",
        color: "blue",
        icon: "/chains/sonic.png",
    },
];

const USDT_CONTRACTS: &[(u64, &str)] = &[
    (1, "0xdAC17F958D2ee523a2206206994597C13D831ec7"),
    (56, "0x55d398326f99059fF775485246999027B3197955"),
    (42161, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
    (10, "0x94b008aA00579c1307B0EF2c499aD98a8ce58e58"),
    (137, "0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
    (43114, "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7"),
    (59144, "0xA219439258ca9da29E9Cc4cE5596924745e12B93"),
    (1030, "0xfe97E85d13ABD9c1c33384E796F10B73905637cE"),
];

const USDC_CONTRACTS: &[(u64, &str)] = &[
    (1, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    (56, "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"),
    (42161, "0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
    (10, "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
    (137, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
    (43114, "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
    (59144, "0x176211869cA2b568f2A7D4EE941E073a821EE1ff"),
    (8453, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
    (80094, "0x549943e04f40284185054145c6E4e9568C1D3241"),
    (4337, "0x29219dd400f2Bf60E5a23d13Be72B486D4038894"),
];

/// One stablecoin deployment and the endpoint used to read it.
///
/// An empty `rpc_url` means no endpoint was configured for the chain: the
/// entry stays listed but is never dispatched.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub chain: ChainInfo,
    pub token_address: Address,
    pub rpc_url: String,
}

impl TokenConfig {
    pub fn has_endpoint(&self) -> bool {
        !self.rpc_url.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FetchTask {
    pub config: TokenConfig,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<TokenType, BTreeMap<ChainId, TokenConfig>>,
}

impl TokenRegistry {
    /// Builds the registry from the built-in deployment table, attaching the
    /// configured endpoint of each chain.
    pub fn standard(rpc_urls: &HashMap<ChainId, String>) -> Result<Self, RegistryError> {
        let chains: HashMap<ChainId, ChainInfo> = CHAINS
            .iter()
            .map(|def| {
                (
                    ChainId(def.id),
                    ChainInfo {
                        id: ChainId(def.id),
                        name: def.name.to_string(),
                        color: def.color.to_string(),
                        icon: Some(def.icon.to_string()),
                    },
                )
            })
            .collect();

        for def in CHAINS {
            let chain_id = ChainId(def.id);
            if !rpc_urls.contains_key(&chain_id) {
                warn!(
                    %chain_id,
                    env_var = %format!("RPC_URL_{chain_id}"),
                    chain = def.name,
                    "no RPC endpoint configured, chain will be skipped"
                );
            }
        }

        let mut registry = Self::default();
        for (token_type, table) in [
            (TokenType::Usdt, USDT_CONTRACTS),
            (TokenType::Usdc, USDC_CONTRACTS),
        ] {
            for (id, raw_address) in table {
                let chain_id = ChainId(*id);
                let chain = chains
                    .get(&chain_id)
                    .cloned()
                    .ok_or(RegistryError::UnknownChain(chain_id))?;
                let token_address =
                    Address::from_str(raw_address).map_err(|_| RegistryError::InvalidContract {
                        token_type,
                        chain_id,
                        address: raw_address.to_string(),
                    })?;
                registry.insert(
                    token_type,
                    TokenConfig {
                        chain,
                        token_address,
                        rpc_url: rpc_urls.get(&chain_id).cloned().unwrap_or_default(),
                    },
                );
            }
        }
        Ok(registry)
    }

    pub fn insert(&mut self, token_type: TokenType, config: TokenConfig) {
        self.tokens
            .entry(token_type)
            .or_default()
            .insert(config.chain.id, config);
    }

    pub fn lookup(&self, token_type: TokenType, chain_id: ChainId) -> Option<&TokenConfig> {
        self.tokens.get(&token_type)?.get(&chain_id)
    }

    /// Every entry as a fetch task, token type by token type, chains in
    /// ascending id order. Entries without an endpoint are included.
    pub fn tasks(&self) -> Vec<FetchTask> {
        TokenType::ALL
            .iter()
            .filter_map(|token_type| self.tokens.get(token_type).map(|m| (*token_type, m)))
            .flat_map(|(token_type, configs)| {
                configs.values().map(move |config| FetchTask {
                    config: config.clone(),
                    token_type,
                })
            })
            .collect()
    }

    pub fn public_tokens(&self) -> Vec<PublicTokenConfig> {
        self.tasks()
            .into_iter()
            .map(|task| PublicTokenConfig {
                enabled: task.config.has_endpoint(),
                token_address: checksum(&task.config.token_address),
                chain: task.config.chain,
                token_type: task.token_type,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries that have an endpoint and will actually be queried.
    pub fn enabled_len(&self) -> usize {
        self.tokens
            .values()
            .flat_map(BTreeMap::values)
            .filter(|config| config.has_endpoint())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(entries: &[(u64, &str)]) -> HashMap<ChainId, String> {
        entries
            .iter()
            .map(|(id, url)| (ChainId(*id), url.to_string()))
            .collect()
    }

    #[test]
    fn standard_registry_covers_both_tokens() {
        let registry = TokenRegistry::standard(&HashMap::new()).unwrap();
        assert_eq!(registry.len(), USDT_CONTRACTS.len() + USDC_CONTRACTS.len());
        assert!(registry.lookup(TokenType::Usdt, ChainId(56)).is_some());
        assert!(registry.lookup(TokenType::Usdc, ChainId(8453)).is_some());
        // USDT is not deployed on Base in the table.
        assert!(registry.lookup(TokenType::Usdt, ChainId(8453)).is_none());
    }

    #[test]
    fn missing_endpoint_keeps_entry_with_empty_url() {
        let registry =
            TokenRegistry::standard(&urls(&[(1, "https://eth.example.org/v2/key")])).unwrap();
        let mainnet = registry.lookup(TokenType::Usdc, ChainId(1)).unwrap();
        assert!(mainnet.has_endpoint());
        let bsc = registry.lookup(TokenType::Usdc, ChainId(56)).unwrap();
        assert!(!bsc.has_endpoint());
        assert_eq!(bsc.chain.name, "BNB Chain");
        // USDT and USDC on mainnet.
        assert_eq!(registry.enabled_len(), 2);
    }

    #[test]
    fn tasks_list_usdt_before_usdc_in_chain_order() {
        let registry = TokenRegistry::standard(&HashMap::new()).unwrap();
        let tasks = registry.tasks();
        let first_usdc = tasks
            .iter()
            .position(|t| t.token_type == TokenType::Usdc)
            .unwrap();
        assert!(tasks[..first_usdc]
            .iter()
            .all(|t| t.token_type == TokenType::Usdt));
        let usdt_ids: Vec<u64> = tasks[..first_usdc]
            .iter()
            .map(|t| t.config.chain.id.as_u64())
            .collect();
        let mut sorted = usdt_ids.clone();
        sorted.sort_unstable();
        assert_eq!(usdt_ids, sorted);
    }

    #[test]
    fn public_tokens_hide_endpoints() {
        let registry = TokenRegistry::standard(&urls(&[(10, "https://op.example.org")])).unwrap();
        let public = registry.public_tokens();
        let optimism_usdc = public
            .iter()
            .find(|t| t.chain.id == ChainId(10) && t.token_type == TokenType::Usdc)
            .unwrap();
        assert!(optimism_usdc.enabled);
        assert_eq!(
            optimism_usdc.token_address,
            "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"
        );
        assert!(public
            .iter()
            .filter(|t| t.chain.id != ChainId(10))
            .all(|t| !t.enabled));
    }
}
