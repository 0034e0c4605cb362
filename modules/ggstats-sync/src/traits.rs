// Trait abstractions for the upstream service.
//
// FeedSource: paged activity feed.
// MatchSource: full duel lookups by id.
//
// GeoGuessrClient implements both; tests use MockFeed / MockMatches from
// `testing` so the whole pipeline runs without network access.

use anyhow::Result;
use async_trait::async_trait;

use geoguessr_client::{FeedPage, GeoGuessrClient};
use ggstats_common::MatchId;

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// One page of the feed, newest first. Errors are fatal to the run.
    async fn page(&self, count: u32, page: u32) -> Result<FeedPage>;
}

#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Raw duel JSON, `Ok(None)` if the upstream does not have it.
    async fn fetch(&self, id: &MatchId) -> Result<Option<serde_json::Value>>;
}

#[async_trait]
impl FeedSource for GeoGuessrClient {
    async fn page(&self, count: u32, page: u32) -> Result<FeedPage> {
        Ok(self.feed_page(count, page).await?)
    }
}

#[async_trait]
impl MatchSource for GeoGuessrClient {
    async fn fetch(&self, id: &MatchId) -> Result<Option<serde_json::Value>> {
        Ok(self.duel::<serde_json::Value>(id.as_str()).await?)
    }
}
