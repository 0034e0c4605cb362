// Feed walker: pages the activity feed newest-first and collects candidate
// duel ids until the feed runs dry, the page cap is hit, or an entry at or
// before the boundary shows up.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use geoguessr_client::FeedPayload;
use ggstats_common::MatchId;

use crate::settings::SyncSettings;
use crate::traits::FeedSource;

/// Where the walk stops looking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Walk until the feed is empty or the page cap is hit.
    Unbounded,
    /// Stop at the first entry created at or before this instant.
    At(DateTime<Utc>),
}

impl Boundary {
    fn reached_by(&self, created: &DateTime<Utc>) -> bool {
        match self {
            Boundary::Unbounded => false,
            // Watermarks are whole milliseconds.
            Boundary::At(limit) => created.timestamp_millis() <= limit.timestamp_millis(),
        }
    }
}

/// A duel id seen in the feed, with the creation time of its feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: MatchId,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStop {
    /// The page cap was reached first. History beyond it was not scanned.
    PageCap,
    /// The feed returned an empty page.
    Exhausted,
    /// An entry at or before the boundary was found.
    Boundary,
}

#[derive(Debug, Clone)]
pub struct WalkReport {
    /// Deduplicated, in feed order (newest first).
    pub candidates: Vec<Candidate>,
    pub pages_scanned: u32,
    pub entries_scanned: usize,
    pub malformed_entries: usize,
    pub stop: WalkStop,
}

pub struct FeedWalker {
    source: Arc<dyn FeedSource>,
    page_size: u32,
    max_pages: u32,
    page_delay: Duration,
    game_mode: String,
}

impl FeedWalker {
    pub fn new(source: Arc<dyn FeedSource>, settings: &SyncSettings) -> Self {
        Self {
            source,
            page_size: settings.page_size,
            max_pages: settings.max_pages,
            page_delay: settings.page_delay,
            game_mode: settings.game_mode.clone(),
        }
    }

    /// Walk the feed from page 0. Pages are fetched strictly one after
    /// another with `page_delay` between them; a failed page fetch aborts
    /// the walk.
    pub async fn walk(&self, boundary: Boundary) -> Result<WalkReport> {
        let mut seen: HashSet<MatchId> = HashSet::new();
        let mut candidates = Vec::new();
        let mut entries_scanned = 0usize;
        let mut malformed_entries = 0usize;
        let mut page = 0u32;

        let stop = loop {
            if page >= self.max_pages {
                warn!(max_pages = self.max_pages, "Reached feed page cap");
                break WalkStop::PageCap;
            }

            if page > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let feed = self
                .source
                .page(self.page_size, page)
                .await
                .with_context(|| format!("Failed to fetch activity feed (page {page})"))?;

            if feed.entries.is_empty() {
                info!(page, "Empty feed page, history exhausted");
                break WalkStop::Exhausted;
            }

            let oldest = feed.entries.iter().rev().find_map(|e| e.created_at());
            info!(
                page,
                entries = feed.entries.len(),
                oldest = %oldest.map(|d| d.date_naive().to_string()).unwrap_or_default(),
                "Scanning feed page"
            );

            let mut reached_boundary = false;
            for entry in &feed.entries {
                entries_scanned += 1;

                let Some(created) = entry.created_at() else {
                    malformed_entries += 1;
                    warn!(page, created = ?entry.created, "Feed entry without a usable timestamp, skipping");
                    continue;
                };

                if boundary.reached_by(&created) {
                    info!(page, %created, "Reached sync boundary");
                    reached_boundary = true;
                    break;
                }

                let payload = match FeedPayload::decode(&entry.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        malformed_entries += 1;
                        debug!(page, error = %e, "Skipping malformed feed payload");
                        continue;
                    }
                };

                for id in payload.game_ids_for_mode(&self.game_mode) {
                    let id = MatchId::from(id);
                    if seen.insert(id.clone()) {
                        candidates.push(Candidate { id, created });
                    }
                }
            }

            if reached_boundary {
                break WalkStop::Boundary;
            }
            page += 1;
        };

        let pages_scanned = match stop {
            WalkStop::PageCap => page,
            WalkStop::Exhausted | WalkStop::Boundary => page + 1,
        };

        info!(
            candidates = candidates.len(),
            pages = pages_scanned,
            malformed = malformed_entries,
            stop = ?stop,
            "Feed walk complete"
        );

        Ok(WalkReport {
            candidates,
            pages_scanned,
            entries_scanned,
            malformed_entries,
            stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, batch_entry, duel_entry, feed_entry, MockFeed};
    use geoguessr_client::FeedEntry;
    use serde_json::{json, Value};

    fn walker(feed: MockFeed, max_pages: u32) -> (Arc<MockFeed>, FeedWalker) {
        let feed = Arc::new(feed);
        let settings = SyncSettings::builder()
            .max_pages(max_pages)
            .page_delay(Duration::ZERO)
            .build();
        (feed.clone(), FeedWalker::new(feed, &settings))
    }

    fn ids(report: &WalkReport) -> Vec<&str> {
        report.candidates.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn boundary_mid_page_stops_at_that_entry() {
        let feed = MockFeed::new()
            .page(vec![duel_entry(100, "a"), duel_entry(90, "b"), duel_entry(80, "c")])
            .page(vec![duel_entry(70, "d")]);
        let (mock, walker) = walker(feed, 10);

        let report = walker.walk(Boundary::At(at(85))).await.unwrap();
        assert_eq!(ids(&report), vec!["a", "b"]);
        assert_eq!(report.stop, WalkStop::Boundary);
        assert_eq!(mock.requested_pages(), vec![0]);
    }

    #[tokio::test]
    async fn entry_exactly_at_boundary_is_excluded() {
        let feed = MockFeed::new().page(vec![duel_entry(100, "a"), duel_entry(85, "b")]);
        let (_, walker) = walker(feed, 10);

        let report = walker.walk(Boundary::At(at(85))).await.unwrap();
        assert_eq!(ids(&report), vec!["a"]);
    }

    #[tokio::test]
    async fn sub_millisecond_entry_in_the_boundary_millisecond_is_excluded() {
        let payload = json!({ "gameId": "b", "gameMode": "Duels" }).to_string();
        let late = FeedEntry {
            created: Some((at(85) + chrono::Duration::microseconds(500)).to_rfc3339()),
            payload: Value::String(payload),
        };
        let feed = MockFeed::new().page(vec![duel_entry(100, "a"), late]);
        let (_, walker) = walker(feed, 10);

        let report = walker.walk(Boundary::At(at(85))).await.unwrap();
        assert_eq!(ids(&report), vec!["a"]);
        assert_eq!(report.stop, WalkStop::Boundary);
    }

    #[tokio::test]
    async fn unbounded_walk_runs_until_empty_page() {
        let feed = MockFeed::new()
            .page(vec![duel_entry(100, "a")])
            .page(vec![duel_entry(50, "b")]);
        let (mock, walker) = walker(feed, 10);

        let report = walker.walk(Boundary::Unbounded).await.unwrap();
        assert_eq!(ids(&report), vec!["a", "b"]);
        assert_eq!(report.stop, WalkStop::Exhausted);
        assert_eq!(report.pages_scanned, 3);
        assert_eq!(mock.requested_pages(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn page_cap_is_a_deliberate_stop() {
        let feed = MockFeed::new()
            .page(vec![duel_entry(100, "a")])
            .page(vec![duel_entry(90, "b")])
            .page(vec![duel_entry(80, "c")]);
        let (mock, walker) = walker(feed, 2);

        let report = walker.walk(Boundary::At(at(10))).await.unwrap();
        assert_eq!(ids(&report), vec!["a", "b"]);
        assert_eq!(report.stop, WalkStop::PageCap);
        assert_eq!(report.pages_scanned, 2);
        assert_eq!(mock.requested_pages(), vec![0, 1]);
    }

    #[tokio::test]
    async fn malformed_payloads_are_skipped_not_fatal() {
        let feed = MockFeed::new().page(vec![
            feed_entry(100, json!("{broken")),
            feed_entry(95, json!(17)),
            duel_entry(90, "ok"),
        ]);
        let (_, walker) = walker(feed, 10);

        let report = walker.walk(Boundary::Unbounded).await.unwrap();
        assert_eq!(ids(&report), vec!["ok"]);
        assert_eq!(report.malformed_entries, 2);
    }

    #[tokio::test]
    async fn batch_payloads_and_repeats_are_deduplicated() {
        let feed = MockFeed::new()
            .page(vec![batch_entry(100, &["a", "b"]), duel_entry(90, "a")])
            .page(vec![duel_entry(80, "b"), duel_entry(70, "c")]);
        let (_, walker) = walker(feed, 10);

        let report = walker.walk(Boundary::Unbounded).await.unwrap();
        assert_eq!(ids(&report), vec!["a", "b", "c"]);
        // First sighting wins, which is the newest entry.
        assert_eq!(report.candidates[0].created, at(100));
        assert_eq!(report.candidates[1].created, at(100));
    }

    #[tokio::test]
    async fn other_game_modes_are_ignored() {
        let standard = json!({"gameId": "s1", "gameMode": "Standard"}).to_string();
        let feed = MockFeed::new().page(vec![feed_entry(100, json!(standard)), duel_entry(90, "d1")]);
        let (_, walker) = walker(feed, 10);

        let report = walker.walk(Boundary::Unbounded).await.unwrap();
        assert_eq!(ids(&report), vec!["d1"]);
    }

    #[tokio::test]
    async fn failed_page_fetch_is_fatal() {
        let feed = MockFeed::new()
            .page(vec![duel_entry(100, "a")])
            .fail_at(1);
        let (_, walker) = walker(feed, 10);

        let err = walker.walk(Boundary::Unbounded).await.unwrap_err();
        assert!(err.to_string().contains("page 1"), "got: {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn pages_are_spaced_by_the_page_delay() {
        let feed = Arc::new(
            MockFeed::new()
                .page(vec![duel_entry(100, "a")])
                .page(vec![duel_entry(90, "b")]),
        );
        let settings = SyncSettings::builder()
            .page_delay(Duration::from_millis(100))
            .build();
        let walker = FeedWalker::new(feed, &settings);

        let start = tokio::time::Instant::now();
        walker.walk(Boundary::Unbounded).await.unwrap();
        // Three fetches (two pages + the empty one), two gaps.
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }
}
