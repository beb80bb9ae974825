//! Multi-chain stablecoin balance aggregation.
//!
//! A query flows registry -> scheduler -> fetcher -> aggregate -> cache,
//! fronted by [`AggregatorService`].

pub mod address;
pub mod aggregate;
pub mod cache;
pub mod decimals;
pub mod fetcher;
pub mod reader;
pub mod registry;
pub mod scheduler;
pub mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use address::{checksum, parse_wallet_address, AddressError};
pub use aggregate::aggregate;
pub use cache::{BalanceCache, CacheEntry, InMemoryBalanceCache};
pub use decimals::DecimalsTable;
pub use fetcher::BalanceFetcher;
pub use reader::{Erc20Reader, EthersErc20Reader, RpcError};
pub use registry::{FetchTask, TokenConfig, TokenRegistry};
pub use scheduler::{BatchConfig, BatchScheduler};
pub use service::{AggregationError, AggregatorService, BalanceQuery, BalanceService, CacheStatus};
