use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ggstats_api::{router, AppState, ImageEmbedder, StreetViewEmbedder};
use ggstats_common::Config;
use ggstats_ledger::PgLedger;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ggstats=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::api_from_env();
    config.log_redacted();

    let ledger = PgLedger::connect(&config.database_url).await?;
    ledger.migrate().await?;

    let embedder: Option<Arc<dyn ImageEmbedder>> = match (
        &config.streetview_api_key,
        &config.embedding_endpoint,
        &config.embedding_token,
    ) {
        (Some(key), Some(endpoint), Some(token)) => Some(Arc::new(StreetViewEmbedder::new(
            key.clone(),
            endpoint.clone(),
            token.clone(),
        ))),
        _ => {
            warn!("STREETVIEW_API_KEY / EMBEDDING_ENDPOINT / EMBEDDING_TOKEN not set, process-round will be unavailable");
            None
        }
    };

    let state = Arc::new(AppState::new(Arc::new(ledger), embedder));
    let app = router(state, &config.cors_allow_origin);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("GGStats API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
