pub mod enrichment;
pub mod processor;
pub mod rest;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, CorsLayer};

use ggstats_ledger::{EmbeddingStore, Ledger};

pub use enrichment::{ImageEmbedder, StreetViewEmbedder};
pub use processor::{ProcessError, ProcessOutcome, RoundProcessor};

pub struct AppState {
    pub ledger: Arc<dyn Ledger>,
    pub embeddings: Arc<dyn EmbeddingStore>,
    pub processor: RoundProcessor,
    /// Serializes commits so two sync posts never interleave their
    /// existence checks and appends.
    pub sync_lock: Mutex<()>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, embedder: Option<Arc<dyn ImageEmbedder>>) -> Self
    where
        S: Ledger + EmbeddingStore + 'static,
    {
        let ledger: Arc<dyn Ledger> = store.clone();
        let embeddings: Arc<dyn EmbeddingStore> = store;
        Self {
            processor: RoundProcessor::new(ledger.clone(), embeddings.clone(), embedder),
            ledger,
            embeddings,
            sync_lock: Mutex::new(()),
        }
    }
}

fn cors(allow_origin: &str) -> CorsLayer {
    let origin = match allow_origin {
        "*" => AllowOrigin::any(),
        origin => match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin, "Invalid CORS origin, allowing any");
                AllowOrigin::any()
            }
        },
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn router(state: Arc<AppState>, cors_allow_origin: &str) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Sync
        .route("/api/last-sync", get(rest::api_last_sync))
        .route("/api/sync", post(rest::api_sync))
        // Enrichment
        .route("/api/process-round", post(rest::api_process_round))
        .route("/api/embeddings/count", get(rest::api_embedding_count))
        // Duels
        .route("/api/duels", get(rest::api_duels))
        .route("/api/duels/{id}", get(rest::api_duel_detail))
        .with_state(state)
        .layer(cors(cors_allow_origin))
        // Logging layer: method + path only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
