use axum::middleware::{from_fn, from_fn_with_state};
use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use helper_gateway::access::{BearerAuth, bearer_auth, identity_headers};
use helper_gateway::config::Args;
use helper_gateway::router;
use helper_gateway::state::AppState;
use helper_gateway::store::{MemoryStore, sweeper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();
    let rate_limit = args.rate_limit_config()?;

    let store = Arc::new(MemoryStore::new());

    // spawn the background sweeper
    let sweep_every = Duration::from_secs(args.sweep_interval.max(1));
    tokio::spawn(sweeper(store.clone(), sweep_every));

    // creating shared state
    let state = Arc::new(AppState::new(
        store,
        rate_limit.clone(),
        Duration::from_secs(args.cache_ttl),
        Duration::from_secs(args.reset_token_ttl),
    ));

    let mut app = router(state);
    if args.trust_identity_headers {
        tracing::warn!("trusting X-User-Id / X-User-Role headers, run this only behind an authenticating proxy");
        app = app.layer(from_fn(identity_headers));
    }
    // outermost, so a verified token wins over forwarded headers
    match args.jwt_secret.as_deref() {
        Some(secret) => {
            app = app.layer(from_fn_with_state(Arc::new(BearerAuth::new(secret)), bearer_auth));
        }
        None if !args.trust_identity_headers => {
            tracing::warn!("no --jwt-secret and no trusted identity headers, guarded routes will answer 401");
        }
        None => {}
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Gateway running on http://localhost:{}", args.port);
    if rate_limit.enabled {
        tracing::info!(
            "Rate limit: {} requests per {} seconds (store failure policy: {:?})",
            rate_limit.limit,
            rate_limit.timeframe.as_secs(),
            rate_limit.failure_policy
        );
    } else {
        tracing::info!("Rate limit: disabled");
    }
    tracing::info!("Cache TTL: {} seconds", args.cache_ttl);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
