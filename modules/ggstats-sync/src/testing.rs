// Test mocks for the sync pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockFeed (FeedSource): scripted pages, optional failing page
// - MockMatches (MatchSource): HashMap-based id→duel JSON
// - RecordingEnricher (RoundEnricher): records calls, fails chosen rounds
//
// Plus helpers for building feed entries, duel JSON and MatchRecords with
// timestamps expressed as seconds since the epoch.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use geoguessr_client::{FeedEntry, FeedPage};
use ggstats_common::{MatchId, MatchRecord, RoundId, Watermark};

use crate::dispatcher::RoundEnricher;
use crate::traits::{FeedSource, MatchSource};

// ---------------------------------------------------------------------------
// Time helpers
// ---------------------------------------------------------------------------

/// `secs` seconds after the epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp in range")
}

/// Watermark at `secs` seconds after the epoch.
pub fn ms(secs: i64) -> Watermark {
    Watermark::from_datetime(&at(secs))
}

// ---------------------------------------------------------------------------
// Feed entries
// ---------------------------------------------------------------------------

pub fn feed_entry(secs: i64, payload: Value) -> FeedEntry {
    FeedEntry {
        created: Some(at(secs).to_rfc3339()),
        payload,
    }
}

/// A single-game entry for a duel, with its payload JSON-in-a-string the way
/// the feed sends it.
pub fn duel_entry(secs: i64, id: &str) -> FeedEntry {
    let payload = json!({ "gameId": id, "gameMode": "Duels" }).to_string();
    feed_entry(secs, Value::String(payload))
}

/// A batched entry holding several duels played close together.
pub fn batch_entry(secs: i64, ids: &[&str]) -> FeedEntry {
    let events: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "type": 6, "payload": { "gameId": id, "gameMode": "Duels" } }))
        .collect();
    feed_entry(secs, Value::String(Value::Array(events).to_string()))
}

// ---------------------------------------------------------------------------
// Duels
// ---------------------------------------------------------------------------

/// Duel JSON roughly as the game server returns it: no `created`, a couple
/// of teams and `rounds` rounds with panoramas.
pub fn duel_json(id: &str, rounds: usize) -> Value {
    let rounds: Vec<Value> = (1..=rounds)
        .map(|n| {
            json!({
                "roundNumber": n,
                "multiplier": 1.0,
                "panorama": {
                    "lat": 40.0 + n as f64,
                    "lng": -70.0 - n as f64,
                    "heading": 90.0,
                    "pitch": 0.0,
                    "zoom": 1,
                    "countryCode": "us"
                }
            })
        })
        .collect();

    json!({
        "gameId": id,
        "status": "Finished",
        "teams": [
            { "id": "t1", "name": "red", "health": 6000, "players": [] },
            { "id": "t2", "name": "blue", "health": 0, "players": [] }
        ],
        "rounds": rounds,
        "options": { "initialHealth": 6000 },
        "result": { "isDraw": false, "winningTeamId": "t1" }
    })
}

/// A stored-shape record created at `secs`.
pub fn record(id: &str, secs: i64, rounds: usize) -> MatchRecord {
    let mut raw = duel_json(id, rounds);
    raw["created"] = Value::String(at(secs).to_rfc3339());
    MatchRecord::from_json(raw).expect("valid test record")
}

// ---------------------------------------------------------------------------
// MockFeed
// ---------------------------------------------------------------------------

/// Scripted feed. Pages past the last scripted one are empty.
/// Builder pattern: `.page()`, `.fail_at()`.
pub struct MockFeed {
    pages: Vec<Vec<FeedEntry>>,
    fail_at: Option<u32>,
    requests: Mutex<Vec<(u32, u32)>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            fail_at: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn page(mut self, entries: Vec<FeedEntry>) -> Self {
        self.pages.push(entries);
        self
    }

    /// Make the fetch of `page` fail with a transport-style error.
    pub fn fail_at(mut self, page: u32) -> Self {
        self.fail_at = Some(page);
        self
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requests.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }

    pub fn requested_counts(&self) -> Vec<u32> {
        self.requests.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }
}

impl Default for MockFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn page(&self, count: u32, page: u32) -> Result<FeedPage> {
        self.requests.lock().unwrap().push((count, page));
        if self.fail_at == Some(page) {
            bail!("connection reset while fetching page {page}");
        }
        let entries = self.pages.get(page as usize).cloned().unwrap_or_default();
        Ok(FeedPage { entries })
    }
}

// ---------------------------------------------------------------------------
// MockMatches
// ---------------------------------------------------------------------------

/// HashMap-based duel source. Unknown ids resolve to `Ok(None)`.
pub struct MockMatches {
    duels: HashMap<String, Value>,
    failing: HashSet<String>,
    calls: Mutex<Vec<MatchId>>,
}

impl MockMatches {
    pub fn new() -> Self {
        Self {
            duels: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_duel(mut self, id: &str, duel: Value) -> Self {
        self.duels.insert(id.to_string(), duel);
        self
    }

    /// Register a standard duel with `rounds` rounds.
    pub fn with_rounds(self, id: &str, rounds: usize) -> Self {
        self.with_duel(id, duel_json(id, rounds))
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<MatchId> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockMatches {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchSource for MockMatches {
    async fn fetch(&self, id: &MatchId) -> Result<Option<Value>> {
        self.calls.lock().unwrap().push(id.clone());
        if self.failing.contains(id.as_str()) {
            bail!("upstream returned 500 for duel {id}");
        }
        Ok(self.duels.get(id.as_str()).cloned())
    }
}

// ---------------------------------------------------------------------------
// RecordingEnricher
// ---------------------------------------------------------------------------

pub struct RecordingEnricher {
    failing: HashSet<String>,
    calls: Mutex<Vec<RoundId>>,
}

impl RecordingEnricher {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, round: &str) -> Self {
        self.failing.insert(round.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RoundId> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for RecordingEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoundEnricher for RecordingEnricher {
    async fn enrich(&self, round: &RoundId) -> Result<()> {
        self.calls.lock().unwrap().push(round.clone());
        if self.failing.contains(&round.to_string()) {
            bail!("embedding endpoint unavailable");
        }
        Ok(())
    }
}
