use std::time::Duration;

use ggstats_common::Config;
use typed_builder::TypedBuilder;

/// Pacing and scope knobs for one sync run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SyncSettings {
    /// Entries requested per feed page.
    #[builder(default = 25)]
    pub page_size: u32,
    /// Hard cap on feed pages per run.
    #[builder(default = 200)]
    pub max_pages: u32,
    #[builder(default = Duration::from_millis(100))]
    pub page_delay: Duration,
    /// Duels fetched concurrently per batch.
    #[builder(default = 10)]
    pub batch_size: usize,
    #[builder(default = Duration::from_millis(1000))]
    pub batch_delay: Duration,
    #[builder(default = Duration::from_millis(50))]
    pub enrich_delay: Duration,
    #[builder(default = "Duels".to_string(), setter(into))]
    pub game_mode: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .page_size(config.feed_page_size)
            .max_pages(config.feed_max_pages)
            .page_delay(Duration::from_millis(config.feed_page_delay_ms))
            .batch_size(config.duel_batch_size)
            .batch_delay(Duration::from_millis(config.duel_batch_delay_ms))
            .enrich_delay(Duration::from_millis(config.enrich_delay_ms))
            .game_mode(config.tracked_game_mode.clone())
            .build()
    }
}
