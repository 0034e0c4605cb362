use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use ggstats_common::MatchRecord;

use crate::settings::SyncSettings;
use crate::traits::MatchSource;
use crate::walker::Candidate;

/// Outcome of resolving a set of candidates.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Successfully resolved duels, in candidate order.
    pub records: Vec<MatchRecord>,
    /// Candidates that failed, were missing upstream, or came back unusable.
    pub unavailable: Vec<Candidate>,
}

/// Fetches full duel records in bounded-concurrency batches.
pub struct MatchResolver {
    source: Arc<dyn MatchSource>,
    batch_size: usize,
    batch_delay: Duration,
}

impl MatchResolver {
    pub fn new(source: Arc<dyn MatchSource>, settings: &SyncSettings) -> Self {
        Self {
            source,
            batch_size: settings.batch_size.max(1),
            batch_delay: settings.batch_delay,
        }
    }

    /// Resolve candidates. At most `batch_size` requests are in flight at
    /// once, with `batch_delay` between consecutive batches. A failure for one
    /// id never fails the others.
    pub async fn resolve(&self, candidates: &[Candidate]) -> Resolution {
        let mut resolution = Resolution::default();
        let batches = candidates.chunks(self.batch_size);
        let total_batches = batches.len();

        for (i, batch) in batches.enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            info!(
                batch = i + 1,
                of = total_batches,
                size = batch.len(),
                "Resolving duel batch"
            );

            let mut results: Vec<(usize, Option<MatchRecord>)> = stream::iter(batch.iter().enumerate())
                .map(|(pos, candidate)| async move { (pos, self.resolve_one(candidate).await) })
                .buffer_unordered(self.batch_size)
                .collect()
                .await;
            results.sort_by_key(|(pos, _)| *pos);

            for (pos, record) in results {
                match record {
                    Some(record) => resolution.records.push(record),
                    None => resolution.unavailable.push(batch[pos].clone()),
                }
            }
        }

        info!(
            resolved = resolution.records.len(),
            unavailable = resolution.unavailable.len(),
            "Duel resolution complete"
        );
        resolution
    }

    async fn resolve_one(&self, candidate: &Candidate) -> Option<MatchRecord> {
        let raw = match self.source.fetch(&candidate.id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!(game_id = %candidate.id, "Duel not found upstream, dropping");
                return None;
            }
            Err(e) => {
                warn!(game_id = %candidate.id, error = %e, "Failed to fetch duel, dropping");
                return None;
            }
        };

        match stamp(raw, candidate) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(game_id = %candidate.id, error = %e, "Unusable duel record, dropping");
                None
            }
        }
    }
}

/// Attach the feed entry's creation time and id to the raw upstream duel and
/// decode it. The feed's time wins over anything the game server sent.
fn stamp(mut raw: serde_json::Value, candidate: &Candidate) -> anyhow::Result<MatchRecord> {
    let obj = raw
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("duel payload is not an object"))?;
    obj.insert(
        "created".to_string(),
        serde_json::Value::String(candidate.created.to_rfc3339()),
    );
    obj.entry("gameId")
        .or_insert_with(|| serde_json::Value::String(candidate.id.to_string()));

    Ok(MatchRecord::from_json(raw)?)
}
