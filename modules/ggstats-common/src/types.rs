use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GgStatsError;

type JsonMap = serde_json::Map<String, serde_json::Value>;

// --- Identifiers ---

/// Opaque id of one duel, as issued by the game server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MatchId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One round of one duel: `{match_id}_{index}`, index starting at 1.
/// This is the unit of downstream enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundId {
    pub match_id: MatchId,
    pub index: u32,
}

impl RoundId {
    pub fn new(match_id: MatchId, index: u32) -> Self {
        Self { match_id, index }
    }

    /// Zero-based position of this round in `MatchRecord::rounds`.
    pub fn position(&self) -> usize {
        self.index.saturating_sub(1) as usize
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.match_id, self.index)
    }
}

impl FromStr for RoundId {
    type Err = GgStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, index) = s
            .rsplit_once('_')
            .ok_or_else(|| GgStatsError::InvalidRoundId(s.to_string()))?;
        let index: u32 = index
            .parse()
            .map_err(|_| GgStatsError::InvalidRoundId(s.to_string()))?;
        if id.is_empty() || index == 0 {
            return Err(GgStatsError::InvalidRoundId(s.to_string()));
        }
        Ok(Self::new(MatchId::new(id), index))
    }
}

impl Serialize for RoundId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoundId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// --- Watermark ---

/// "Everything created at or before this instant is already ingested."
/// Stored as epoch milliseconds; zero means nothing has been synced yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Watermark(i64);

impl Watermark {
    pub const ZERO: Watermark = Watermark(0);

    pub fn from_millis(ms: i64) -> Self {
        Self(ms.max(0))
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        Self::from_millis(dt.timestamp_millis())
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.0).unwrap_or_default()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The later of the two. A watermark only ever moves forward.
    pub fn advanced_to(self, candidate: Watermark) -> Watermark {
        self.max(candidate)
    }

    /// True when `t` is at or before this watermark.
    pub fn covers(&self, t: &DateTime<Utc>) -> bool {
        t.timestamp_millis() <= self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            f.write_str("never")
        } else {
            write!(f, "{}", self.to_datetime().to_rfc3339())
        }
    }
}

// --- Sync mode ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Stop at the stored watermark.
    Incremental,
    /// Stop at now minus `days`.
    Windowed { days: u32 },
    /// Walk the whole feed (up to the page cap).
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Incremental => f.write_str("incremental"),
            SyncMode::Windowed { days } => write!(f, "windowed({days}d)"),
            SyncMode::Full => f.write_str("full"),
        }
    }
}

// --- Match record ---

/// A resolved duel. Immutable once ingested.
///
/// Only the fields the pipeline and its readers touch are typed; everything
/// else the game server sends is kept verbatim in `extra` so the stored record
/// stays a faithful copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "gameId")]
    pub game_id: MatchId,
    /// When the duel showed up in the activity feed.
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub rounds: Vec<Round>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl MatchRecord {
    /// Decode a record posted by a client. A record without `created` falls
    /// back to the start time of its first round.
    pub fn from_json(mut value: serde_json::Value) -> Result<Self, GgStatsError> {
        let obj = value
            .as_object_mut()
            .ok_or_else(|| GgStatsError::Validation("match record must be an object".into()))?;

        if !obj.contains_key("created") {
            let first_start = obj
                .get("rounds")
                .and_then(|r| r.get(0))
                .and_then(|r| r.get("startTime"))
                .cloned();
            if let Some(start) = first_start {
                obj.insert("created".to_string(), start);
            }
        }

        let record: MatchRecord = serde_json::from_value(value)
            .map_err(|e| GgStatsError::Validation(format!("invalid match record: {e}")))?;
        if record.game_id.is_empty() {
            return Err(GgStatsError::Validation("match record has an empty gameId".into()));
        }
        Ok(record)
    }

    /// One id per round, `{gameId}_1 ..= {gameId}_K`, in round order.
    pub fn round_ids(&self) -> Vec<RoundId> {
        (1..=self.rounds.len() as u32)
            .map(|i| RoundId::new(self.game_id.clone(), i))
            .collect()
    }

    pub fn round(&self, id: &RoundId) -> Option<&Round> {
        if id.match_id != self.game_id || id.index == 0 {
            return None;
        }
        self.rounds.get(id.position())
    }

    pub fn created_watermark(&self) -> Watermark {
        Watermark::from_datetime(&self.created)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default, rename = "playerId")]
    pub player_id: String,
    #[serde(default)]
    pub guesses: Vec<Guess>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guess {
    #[serde(default, rename = "roundNumber")]
    pub round_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Meters from the actual location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Seconds from round start to guess.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    #[serde(default, rename = "roundNumber")]
    pub round_number: u32,
    #[serde(default, rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panorama: Option<Panorama>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Round {
    pub fn country_code(&self) -> Option<&str> {
        self.panorama.as_ref()?.country_code.as_deref()
    }

    /// Actual location as (lat, lng).
    pub fn location(&self) -> Option<(f64, f64)> {
        let p = self.panorama.as_ref()?;
        Some((p.lat?, p.lng?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panorama {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, rename = "countryCode", skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Panorama {
    /// The camera view for this panorama; `None` without lat, lng and heading.
    pub fn street_view(&self) -> Option<StreetView> {
        Some(StreetView {
            lat: self.lat?,
            lng: self.lng?,
            heading: self.heading?,
            pitch: self.pitch.unwrap_or(0.0),
            zoom: self.zoom.unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(default, rename = "winningTeamId", skip_serializing_if = "Option::is_none")]
    pub winning_team_id: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// A Street View camera position, as shown to players at round start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreetView {
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub pitch: f64,
    pub zoom: f64,
}

impl StreetView {
    /// Field of view matching the in-game zoom level.
    pub fn fov(&self) -> u32 {
        match self.zoom.round() as i64 {
            1 => 60,
            2 => 40,
            3 => 20,
            _ => 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_duel() -> serde_json::Value {
        json!({
            "gameId": "duel-1",
            "created": "2025-09-14T10:00:00Z",
            "teams": [{
                "id": "t1",
                "players": [{
                    "playerId": "me",
                    "guesses": [{"roundNumber": 1, "lat": 1.5, "lng": 2.5, "score": 4200, "distance": 120000.0}]
                }]
            }],
            "rounds": [
                {"roundNumber": 1, "startTime": "2025-09-14T09:58:00Z", "panorama": {"lat": 10.0, "lng": 20.0, "heading": 90, "countryCode": "se"}},
                {"roundNumber": 2, "startTime": "2025-09-14T09:59:00Z", "multiplier": 1.5}
            ],
            "result": {"winningTeamId": "t1"},
            "status": "Finished"
        })
    }

    #[test]
    fn round_id_round_trips_through_string() {
        let id: RoundId = "abc_def_3".parse().unwrap();
        assert_eq!(id.match_id.as_str(), "abc_def");
        assert_eq!(id.index, 3);
        assert_eq!(id.to_string(), "abc_def_3");
    }

    #[test]
    fn round_id_rejects_bad_input() {
        assert!("nounderscore".parse::<RoundId>().is_err());
        assert!("abc_0".parse::<RoundId>().is_err());
        assert!("abc_x".parse::<RoundId>().is_err());
        assert!("_2".parse::<RoundId>().is_err());
    }

    #[test]
    fn round_ids_are_one_based_and_complete() {
        let record = MatchRecord::from_json(sample_duel()).unwrap();
        let ids: Vec<String> = record.round_ids().iter().map(|r| r.to_string()).collect();
        assert_eq!(ids, vec!["duel-1_1", "duel-1_2"]);
    }

    #[test]
    fn round_lookup_uses_one_based_index() {
        let record = MatchRecord::from_json(sample_duel()).unwrap();
        let first = record.round(&"duel-1_1".parse().unwrap()).unwrap();
        assert_eq!(first.country_code(), Some("se"));
        assert_eq!(first.location(), Some((10.0, 20.0)));
        assert!(record.round(&"duel-1_3".parse().unwrap()).is_none());
        assert!(record.round(&"other_1".parse().unwrap()).is_none());
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let record = MatchRecord::from_json(sample_duel()).unwrap();
        assert_eq!(record.extra.get("status"), Some(&json!("Finished")));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["status"], json!("Finished"));
        assert_eq!(back["rounds"][1]["multiplier"], json!(1.5));
    }

    #[test]
    fn missing_created_falls_back_to_first_round_start() {
        let mut duel = sample_duel();
        duel.as_object_mut().unwrap().remove("created");
        let record = MatchRecord::from_json(duel).unwrap();
        assert_eq!(record.created.to_rfc3339(), "2025-09-14T09:58:00+00:00");
    }

    #[test]
    fn record_without_game_id_is_rejected() {
        let mut duel = sample_duel();
        duel.as_object_mut().unwrap().remove("gameId");
        assert!(MatchRecord::from_json(duel).is_err());
        assert!(MatchRecord::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn watermark_only_moves_forward() {
        let w = Watermark::from_millis(100);
        assert_eq!(w.advanced_to(Watermark::from_millis(50)), w);
        assert_eq!(
            w.advanced_to(Watermark::from_millis(150)),
            Watermark::from_millis(150)
        );
    }

    #[test]
    fn watermark_covers_is_inclusive() {
        let t = DateTime::<Utc>::from_timestamp_millis(85).unwrap();
        assert!(Watermark::from_millis(85).covers(&t));
        assert!(!Watermark::from_millis(84).covers(&t));
    }

    #[test]
    fn street_view_needs_heading_and_maps_zoom_to_fov() {
        let record = MatchRecord::from_json(sample_duel()).unwrap();
        let view = record.rounds[0].panorama.as_ref().unwrap().street_view().unwrap();
        assert_eq!(view.fov(), 90);
        assert_eq!(StreetView { zoom: 1.2, ..view }.fov(), 60);
        assert_eq!(StreetView { zoom: 2.0, ..view }.fov(), 40);
        assert_eq!(StreetView { zoom: 3.0, ..view }.fov(), 20);

        let no_heading = Panorama {
            lat: Some(1.0),
            lng: Some(2.0),
            heading: None,
            pitch: None,
            zoom: None,
            country_code: None,
            extra: Default::default(),
        };
        assert!(no_heading.street_view().is_none());
    }
}
