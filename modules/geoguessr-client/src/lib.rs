pub mod error;
pub mod types;

pub use error::{GeoGuessrError, Result};
pub use types::{FeedEntry, FeedPage, FeedPayload, FeedSubEvent, GameEvent};

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

const API_URL: &str = "https://www.geoguessr.com/api";
const GAME_SERVER_URL: &str = "https://game-server.geoguessr.com/api";

/// Name of the session cookie the site uses for authentication.
const SESSION_COOKIE: &str = "_ncfa";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GeoGuessrClient {
    client: reqwest::Client,
    api_url: String,
    game_server_url: String,
    session: String,
}

impl GeoGuessrClient {
    /// Client authenticated as the owner of `session` (the `_ncfa` cookie value).
    pub fn new(session: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: API_URL.to_string(),
            game_server_url: GAME_SERVER_URL.to_string(),
            session,
        }
    }

    /// Point the client at different hosts (staging, a local fake in tests).
    pub fn with_urls(mut self, api_url: impl Into<String>, game_server_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self.game_server_url = game_server_url.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header(reqwest::header::COOKIE, format!("{SESSION_COOKIE}={}", self.session))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(REQUEST_TIMEOUT)
    }

    /// Fetch one page of the private activity feed (newest first).
    pub async fn feed_page(&self, count: u32, page: u32) -> Result<FeedPage> {
        let url = format!("{}/v4/feed/private", self.api_url);
        let resp = self
            .get(&url)
            .query(&[("count", count), ("page", page)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeoGuessrError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let feed: FeedPage = serde_json::from_str(&body)?;
        tracing::debug!(page, entries = feed.entries.len(), "Fetched feed page");
        Ok(feed)
    }

    /// Fetch a full duel. Returns `Ok(None)` when the game server does not
    /// know the id (or no longer serves it).
    pub async fn duel<T: DeserializeOwned>(&self, game_id: &str) -> Result<Option<T>> {
        let url = format!("{}/duels/{}", self.game_server_url, game_id);
        let resp = self.get(&url).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeoGuessrError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let duel: T = serde_json::from_str(&body)?;
        Ok(Some(duel))
    }
}
