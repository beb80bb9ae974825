use balance_api::{config::AppConfig, routes::balances::balance_response, telemetry};
use indexer::{parse_wallet_address, CacheStatus};

/// One-shot balance lookup: `fetch_balances <address>` or `BALANCE_ADDRESS`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;
    let config = AppConfig::from_env()?;

    let raw = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BALANCE_ADDRESS").ok())
        .ok_or_else(|| anyhow::anyhow!("pass a wallet address or set BALANCE_ADDRESS"))?;
    let owner = parse_wallet_address(raw.trim())?;
    let force_refresh = std::env::var("FORCE_REFRESH")
        .map(|v| v == "true")
        .unwrap_or(false);

    let state = balance_api::bootstrap::build_state(&config).await?;
    let query = state.balances.balances(owner, force_refresh).await?;

    for asset in &query.snapshot.assets {
        tracing::info!(
            chain = %asset.chain.name,
            token = %asset.token_type,
            balance = %asset.balance,
            "balance found"
        );
    }
    tracing::info!(
        total_usd = %query.snapshot.total_usd_value,
        assets = query.snapshot.assets.len(),
        cached = matches!(query.status, CacheStatus::Cached { .. }),
        "balances fetched"
    );
    let response = balance_response(query, state.balances.cache_window());
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
