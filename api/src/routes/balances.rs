use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use domain::BalanceResponse;
use indexer::{parse_wallet_address, BalanceQuery, CacheStatus};
use serde::Deserialize;
use std::time::Duration;

use crate::{error::ApiError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/get-token-balances", get(get_token_balances))
}

#[derive(Debug, Deserialize)]
struct BalanceParams {
    address: Option<String>,
    force: Option<String>,
}

async fn get_token_balances(
    State(state): State<AppState>,
    Query(params): Query<BalanceParams>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let raw = params
        .address
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingAddress)?;
    let owner = parse_wallet_address(raw).map_err(|err| {
        tracing::debug!(address = %raw, error = %err, "rejected wallet address");
        ApiError::InvalidAddress
    })?;
    let force_refresh = params.force.as_deref() == Some("true");

    let query = state.balances.balances(owner, force_refresh).await?;
    Ok(Json(balance_response(query, state.balances.cache_window())))
}

pub fn balance_response(query: BalanceQuery, cache_window: Duration) -> BalanceResponse {
    match query.status {
        CacheStatus::Fresh => BalanceResponse::fresh(query.snapshot, cache_window),
        CacheStatus::Cached {
            age,
            next_refresh_in,
        } => BalanceResponse::cached(query.snapshot, age, next_refresh_in),
    }
}
