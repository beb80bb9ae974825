use std::{collections::HashMap, env, time::Duration};

use anyhow::{Context, Result};
use domain::ChainId;
use indexer::{
    cache::{DEFAULT_CACHE_DURATION, DEFAULT_CACHE_MAX_ENTRIES},
    fetcher::DEFAULT_RPC_TIMEOUT,
    scheduler::{DEFAULT_BATCH_DELAY, DEFAULT_MAX_CONCURRENT_REQUESTS},
};

const RPC_URL_PREFIX: &str = "RPC_URL_";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub chain_rpc_urls: HashMap<ChainId, String>,
    pub cache_duration: Duration,
    pub cache_max_entries: usize,
    pub max_concurrent_requests: usize,
    pub batch_delay: Duration,
    pub rpc_timeout: Duration,
    pub frontend_origins: Vec<String>,
    pub redis_url: Option<String>,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain_rpc_urls: HashMap::new(),
            cache_duration: DEFAULT_CACHE_DURATION,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            batch_delay: DEFAULT_BATCH_DELAY,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            frontend_origins: vec!["http://localhost:3000".to_string()],
            redis_url: None,
            port: 8081,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        // RPC_URL_<chainId> first, then CHAIN_RPC_URLS entries on top.
        let mut chain_rpc_urls = parse_rpc_url_vars(env::vars());
        chain_rpc_urls.extend(parse_chain_urls("CHAIN_RPC_URLS"));

        Ok(Self {
            chain_rpc_urls,
            cache_duration: parse_duration_millis("BALANCE_CACHE_TTL_MS", defaults.cache_duration),
            cache_max_entries: parse_usize("BALANCE_CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            max_concurrent_requests: parse_usize(
                "MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            ),
            batch_delay: parse_duration_millis("BATCH_DELAY_MS", defaults.batch_delay),
            rpc_timeout: parse_duration_millis("RPC_TIMEOUT_MS", defaults.rpc_timeout),
            frontend_origins: parse_origins(),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .context("PORT must be a valid u16")?,
        })
    }
}

/// Collects `RPC_URL_<chainId>=<url>` pairs; blank values count as unset.
pub fn parse_rpc_url_vars(
    vars: impl IntoIterator<Item = (String, String)>,
) -> HashMap<ChainId, String> {
    vars.into_iter()
        .filter_map(|(key, value)| {
            let chain_id = key.strip_prefix(RPC_URL_PREFIX)?.parse::<u64>().ok()?;
            let url = value.trim();
            if url.is_empty() {
                return None;
            }
            Some((ChainId(chain_id), url.to_string()))
        })
        .collect()
}

fn parse_origins() -> Vec<String> {
    if let Ok(list) = env::var("FRONTEND_ORIGINS") {
        split_origins(&list)
    } else if let Ok(origin) = env::var("FRONTEND_ORIGIN") {
        split_origins(&origin)
    } else {
        vec!["http://localhost:3000".to_string()]
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_duration_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_chain_urls(key: &str) -> HashMap<ChainId, String> {
    let raw = match env::var(key) {
        Ok(v) => v,
        Err(_) => return HashMap::new(),
    };
    split_chain_urls(&raw)
}

fn split_chain_urls(raw: &str) -> HashMap<ChainId, String> {
    raw.split(',')
        .filter_map(|item| {
            let (chain, url) = item.split_once('=')?;
            let chain_id = chain.trim().parse::<u64>().ok()?;
            let url = url.trim();
            if url.is_empty() {
                return None;
            }
            Some((ChainId(chain_id), url.to_string()))
        })
        .collect()
}
