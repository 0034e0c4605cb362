use std::sync::Arc;

use tracing::{info, warn};

use ggstats_common::RoundId;
use ggstats_ledger::{EmbeddingStore, Ledger, LedgerError};

use crate::enrichment::ImageEmbedder;

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// An embedding already exists; nothing was done.
    AlreadyEnriched,
    /// The round has no usable panorama, so there is nothing to embed.
    MissingPanorama,
    Enriched { dimensions: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Unknown round {0}")]
    UnknownRound(RoundId),

    #[error("Image embedding is not configured")]
    NotConfigured,

    #[error("Embedding failed: {0}")]
    Embedding(anyhow::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Enriches a single round. Idempotent: a round is embedded at most once.
pub struct RoundProcessor {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn EmbeddingStore>,
    embedder: Option<Arc<dyn ImageEmbedder>>,
}

impl RoundProcessor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn EmbeddingStore>,
        embedder: Option<Arc<dyn ImageEmbedder>>,
    ) -> Self {
        Self {
            ledger,
            store,
            embedder,
        }
    }

    pub async fn process(&self, round_id: &RoundId) -> Result<ProcessOutcome, ProcessError> {
        if self.store.has_embedding(round_id).await? {
            info!(round_id = %round_id, "Embedding already exists, skipping");
            return Ok(ProcessOutcome::AlreadyEnriched);
        }

        let record = self
            .ledger
            .get(&round_id.match_id)
            .await?
            .ok_or_else(|| ProcessError::UnknownRound(round_id.clone()))?;
        let round = record
            .round(round_id)
            .ok_or_else(|| ProcessError::UnknownRound(round_id.clone()))?;

        let Some(view) = round.panorama.as_ref().and_then(|p| p.street_view()) else {
            warn!(round_id = %round_id, "Round has no usable panorama, skipping");
            return Ok(ProcessOutcome::MissingPanorama);
        };

        let embedder = self.embedder.as_ref().ok_or(ProcessError::NotConfigured)?;
        let embedding = embedder
            .embed(&view)
            .await
            .map_err(ProcessError::Embedding)?;

        let stored = self.store.store_embedding(round_id, &embedding).await?;
        if !stored {
            // Another request got there first.
            return Ok(ProcessOutcome::AlreadyEnriched);
        }

        info!(round_id = %round_id, dimensions = embedding.len(), "Stored round embedding");
        Ok(ProcessOutcome::Enriched {
            dimensions: embedding.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::FixedEmbedder;
    use ggstats_common::{MatchRecord, Watermark};
    use ggstats_ledger::MemoryLedger;
    use serde_json::json;

    fn duel() -> MatchRecord {
        MatchRecord::from_json(json!({
            "gameId": "g1",
            "created": "2025-09-14T10:00:00Z",
            "rounds": [
                {"roundNumber": 1, "panorama": {"lat": 59.3, "lng": 18.1, "heading": 45, "zoom": 2}},
                {"roundNumber": 2, "panorama": {"countryCode": "se"}}
            ]
        }))
        .unwrap()
    }

    fn processor(embedder: Option<Arc<FixedEmbedder>>) -> (Arc<MemoryLedger>, RoundProcessor) {
        let ledger = Arc::new(MemoryLedger::with_records(vec![duel()], Watermark::ZERO));
        let embedder = embedder.map(|e| e as Arc<dyn ImageEmbedder>);
        let processor = RoundProcessor::new(ledger.clone(), ledger.clone(), embedder);
        (ledger, processor)
    }

    fn id(s: &str) -> RoundId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn embeds_once_then_skips() {
        let embedder = Arc::new(FixedEmbedder::new());
        let (ledger, processor) = processor(Some(embedder.clone()));

        let first = processor.process(&id("g1_1")).await.unwrap();
        assert_eq!(first, ProcessOutcome::Enriched { dimensions: 4 });
        assert_eq!(embedder.calls()[0].fov(), 40);

        let second = processor.process(&id("g1_1")).await.unwrap();
        assert_eq!(second, ProcessOutcome::AlreadyEnriched);
        assert_eq!(embedder.calls().len(), 1);
        assert_eq!(ledger.embedding_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn round_without_coordinates_is_skipped() {
        let embedder = Arc::new(FixedEmbedder::new());
        let (_, processor) = processor(Some(embedder.clone()));

        let outcome = processor.process(&id("g1_2")).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::MissingPanorama);
        assert!(embedder.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_duel_or_round_is_an_error() {
        let (_, processor) = processor(Some(Arc::new(FixedEmbedder::new())));

        assert!(matches!(
            processor.process(&id("nope_1")).await,
            Err(ProcessError::UnknownRound(_))
        ));
        assert!(matches!(
            processor.process(&id("g1_9")).await,
            Err(ProcessError::UnknownRound(_))
        ));
    }

    #[tokio::test]
    async fn embedder_failure_stores_nothing() {
        let (ledger, processor) = processor(Some(Arc::new(FixedEmbedder::failing())));

        let err = processor.process(&id("g1_1")).await.unwrap_err();
        assert!(matches!(err, ProcessError::Embedding(_)));
        assert_eq!(ledger.embedding_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_backend_is_reported() {
        let (_, processor) = processor(None);
        assert!(matches!(
            processor.process(&id("g1_1")).await,
            Err(ProcessError::NotConfigured)
        ));
    }
}
