//! In-process stand-ins for the RPC layer.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use ethers::types::{Address, U256};

use crate::reader::{Erc20Reader, RpcError};

/// Scripted [`Erc20Reader`] that counts calls and concurrent requests.
///
/// Unknown (endpoint, token) pairs report a zero balance.
#[derive(Default)]
pub struct FakeErc20Reader {
    balances: Mutex<HashMap<(String, Address), U256>>,
    decimals: Mutex<HashMap<(String, Address), u8>>,
    hanging: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    latency: Mutex<Duration>,
    balance_calls: AtomicUsize,
    decimals_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeErc20Reader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, rpc_url: &str, token: Address, raw: U256) {
        self.balances
            .lock()
            .unwrap()
            .insert((rpc_url.to_string(), token), raw);
    }

    pub fn set_decimals(&self, rpc_url: &str, token: Address, decimals: u8) {
        self.decimals
            .lock()
            .unwrap()
            .insert((rpc_url.to_string(), token), decimals);
    }

    /// Calls against this endpoint never complete.
    pub fn hang(&self, rpc_url: &str) {
        self.hanging.lock().unwrap().insert(rpc_url.to_string());
    }

    /// Calls against this endpoint fail immediately.
    pub fn fail(&self, rpc_url: &str) {
        self.failing.lock().unwrap().insert(rpc_url.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn decimals_calls(&self) -> usize {
        self.decimals_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.balance_calls() + self.decimals_calls()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn simulate(&self, rpc_url: &str) -> Result<(), RpcError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let latency = *self.latency.lock().unwrap();
        let hangs = self.hanging.lock().unwrap().contains(rpc_url);
        let fails = self.failing.lock().unwrap().contains(rpc_url);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if hangs {
            std::future::pending::<()>().await;
        }
        if fails {
            return Err(RpcError::Call(format!("{rpc_url} refused the call")));
        }
        Ok(())
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Erc20Reader for FakeErc20Reader {
    async fn balance_of(
        &self,
        rpc_url: &str,
        token: Address,
        _owner: Address,
    ) -> Result<U256, RpcError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(rpc_url).await?;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(rpc_url.to_string(), token))
            .copied()
            .unwrap_or_default())
    }

    async fn decimals(&self, rpc_url: &str, token: Address) -> Result<u8, RpcError> {
        self.decimals_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(rpc_url).await?;
        self.decimals
            .lock()
            .unwrap()
            .get(&(rpc_url.to_string(), token))
            .copied()
            .ok_or_else(|| RpcError::Call("decimals() reverted".to_string()))
    }
}
