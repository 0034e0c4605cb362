use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Activity feed ---

/// One page of `/v4/feed/private`. Entries arrive newest first.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,
}

/// A single activity feed item. The payload is left opaque here and decoded
/// with [`FeedPayload::decode`], so one odd entry never fails the page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedEntry {
    #[serde(default, alias = "time")]
    pub created: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl FeedEntry {
    /// Creation time, if present and RFC 3339.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// The shapes a feed payload can take once decoded.
///
/// Some feed items describe one game; others fold several games played in a
/// short window into an array of sub-events, each wrapping its own payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedPayload {
    Batch(Vec<FeedSubEvent>),
    Single(GameEvent),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSubEvent {
    #[serde(default)]
    pub payload: Option<GameEvent>,
}

/// The fields of a game event we care about. Other event kinds (badges,
/// level-ups, ...) decode with both fields empty and are simply not games.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameEvent {
    #[serde(default, rename = "gameMode")]
    pub game_mode: Option<String>,
    #[serde(default, rename = "gameId")]
    pub game_id: Option<String>,
}

impl GameEvent {
    /// The game id, when this event is a game of `mode`.
    pub fn game_id_for_mode(&self, mode: &str) -> Option<&str> {
        match (self.game_mode.as_deref(), self.game_id.as_deref()) {
            (Some(m), Some(id)) if m == mode && !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

impl FeedPayload {
    /// Decode a raw payload. The feed usually sends the payload as a JSON
    /// string holding JSON; an inline object or array is accepted as well.
    /// Anything else (numbers, null, malformed text) is an error.
    pub fn decode(raw: &serde_json::Value) -> crate::Result<Self> {
        let payload = match raw {
            serde_json::Value::String(text) => serde_json::from_str(text)?,
            other => serde_json::from_value(other.clone())?,
        };
        Ok(payload)
    }

    /// All game events carried by this payload, in feed order.
    pub fn games(&self) -> Vec<&GameEvent> {
        match self {
            FeedPayload::Single(event) => vec![event],
            FeedPayload::Batch(subs) => subs.iter().filter_map(|s| s.payload.as_ref()).collect(),
        }
    }

    /// Game ids of `mode` carried by this payload, in feed order.
    pub fn game_ids_for_mode<'a>(&'a self, mode: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.games()
            .into_iter()
            .filter_map(move |g| g.game_id_for_mode(mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_event_encoded_as_string_decodes() {
        let raw = json!(r#"{"gameId":"abc","gameMode":"Duels","mapSlug":"world"}"#);
        let payload = FeedPayload::decode(&raw).unwrap();
        let ids: Vec<_> = payload.game_ids_for_mode("Duels").collect();
        assert_eq!(ids, vec!["abc"]);
    }

    #[test]
    fn batch_of_sub_events_keeps_only_tracked_mode() {
        let raw = json!([
            {"type": 7, "payload": {"gameId": "d1", "gameMode": "Duels"}},
            {"type": 7, "payload": {"gameId": "s1", "gameMode": "Standard"}},
            {"type": 7},
            {"type": 7, "payload": {"gameId": "d2", "gameMode": "Duels"}}
        ]);
        let payload = FeedPayload::decode(&raw).unwrap();
        let ids: Vec<_> = payload.game_ids_for_mode("Duels").collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[test]
    fn non_game_event_yields_no_ids() {
        let raw = json!(r#"{"badgeId":"x","level":3}"#);
        let payload = FeedPayload::decode(&raw).unwrap();
        assert_eq!(payload.game_ids_for_mode("Duels").count(), 0);
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let raw = json!("{not json");
        assert!(FeedPayload::decode(&raw).is_err());
    }

    #[test]
    fn scalar_payload_is_a_parse_error() {
        assert!(FeedPayload::decode(&json!(42)).is_err());
        assert!(FeedPayload::decode(&serde_json::Value::Null).is_err());
    }

    #[test]
    fn empty_game_id_is_not_a_candidate() {
        let event = GameEvent {
            game_mode: Some("Duels".into()),
            game_id: Some(String::new()),
        };
        assert!(event.game_id_for_mode("Duels").is_none());
    }

    #[test]
    fn created_parses_rfc3339_and_time_alias() {
        let entry: FeedEntry =
            serde_json::from_value(json!({"time": "2025-09-14T10:00:00.000Z", "payload": "{}"}))
                .unwrap();
        assert_eq!(
            entry.created_at().unwrap().to_rfc3339(),
            "2025-09-14T10:00:00+00:00"
        );

        let bad: FeedEntry =
            serde_json::from_value(json!({"created": "yesterday", "payload": "{}"})).unwrap();
        assert!(bad.created_at().is_none());
    }
}
