use std::env;
use std::str::FromStr;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Ledger
    pub database_url: String,

    // Upstream
    pub geoguessr_session: String,
    pub geoguessr_api_url: String,
    pub geoguessr_game_server_url: String,
    pub tracked_game_mode: String,

    // Feed walking / resolution pacing
    pub feed_page_size: u32,
    pub feed_max_pages: u32,
    pub feed_page_delay_ms: u64,
    pub duel_batch_size: usize,
    pub duel_batch_delay_ms: u64,

    // Enrichment
    pub ggstats_api_url: String,
    pub enrich_delay_ms: u64,
    pub streetview_api_key: Option<String>,
    pub embedding_endpoint: Option<String>,
    pub embedding_token: Option<String>,

    // Web server
    pub api_host: String,
    pub api_port: u16,
    pub cors_allow_origin: String,
}

impl Config {
    /// Load configuration for the `sync` binary.
    /// Panics with a clear message if required vars are missing.
    pub fn sync_from_env() -> Self {
        Self {
            geoguessr_session: required_env("GEOGUESSR_COOKIE"),
            ..Self::base_from_env()
        }
    }

    /// Load configuration for the API server (no upstream session needed).
    pub fn api_from_env() -> Self {
        Self::base_from_env()
    }

    fn base_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            geoguessr_session: env::var("GEOGUESSR_COOKIE").unwrap_or_default(),
            geoguessr_api_url: env::var("GEOGUESSR_BASE_URL")
                .unwrap_or_else(|_| "https://www.geoguessr.com/api".to_string()),
            geoguessr_game_server_url: env::var("GEOGUESSR_GAME_SERVER_URL")
                .unwrap_or_else(|_| "https://game-server.geoguessr.com/api".to_string()),
            tracked_game_mode: env::var("TRACKED_GAME_MODE")
                .unwrap_or_else(|_| "Duels".to_string()),
            feed_page_size: parsed_env("FEED_PAGE_SIZE", 25),
            feed_max_pages: parsed_env("FEED_MAX_PAGES", 200),
            feed_page_delay_ms: parsed_env("FEED_PAGE_DELAY_MS", 100),
            duel_batch_size: parsed_env("DUEL_BATCH_SIZE", 10),
            duel_batch_delay_ms: parsed_env("DUEL_BATCH_DELAY_MS", 1000),
            ggstats_api_url: env::var("GGSTATS_API_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            enrich_delay_ms: parsed_env("ENRICH_DELAY_MS", 50),
            streetview_api_key: optional_env("STREETVIEW_API_KEY"),
            embedding_endpoint: optional_env("EMBEDDING_ENDPOINT"),
            embedding_token: optional_env("EMBEDDING_TOKEN"),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_env("API_PORT", 3000),
            cors_allow_origin: env::var("CORS_ALLOW_ORIGIN")
                .unwrap_or_else(|_| "https://www.geoguessr.com".to_string()),
        }
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            database_url = redact(&self.database_url),
            geoguessr_session = redact(&self.geoguessr_session),
            geoguessr_api_url = self.geoguessr_api_url.as_str(),
            geoguessr_game_server_url = self.geoguessr_game_server_url.as_str(),
            tracked_game_mode = self.tracked_game_mode.as_str(),
            feed_page_size = self.feed_page_size,
            feed_max_pages = self.feed_max_pages,
            feed_page_delay_ms = self.feed_page_delay_ms,
            duel_batch_size = self.duel_batch_size,
            duel_batch_delay_ms = self.duel_batch_delay_ms,
            ggstats_api_url = self.ggstats_api_url.as_str(),
            enrich_delay_ms = self.enrich_delay_ms,
            streetview_api_key = redact(self.streetview_api_key.as_deref().unwrap_or("")),
            embedding_endpoint = self.embedding_endpoint.as_deref().unwrap_or("(unset)"),
            embedding_token = redact(self.embedding_token.as_deref().unwrap_or("")),
            "Loaded config"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {raw:?}")),
        Err(_) => default,
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(unset)"
    } else {
        "***"
    }
}
