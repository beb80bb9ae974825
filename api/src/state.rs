use indexer::{BalanceService, TokenRegistry};
use std::sync::Arc;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<TokenRegistry>,
    pub balances: Arc<dyn BalanceService>,
}

// Axum state must be shareable across worker threads.
#[allow(dead_code)]
fn _assert_state_types_are_send_sync()
where
    AppConfig: Send + Sync + 'static,
    TokenRegistry: Send + Sync + 'static,
    dyn BalanceService: Send + Sync,
{
}

#[allow(dead_code)]
fn _assert_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
