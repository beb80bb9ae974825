use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Liveness plus how many tokens have an endpoint to query.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "configuredTokens": state.registry.enabled_len(),
        "cacheWindowSecs": state.config.cache_duration.as_secs(),
    }))
}
