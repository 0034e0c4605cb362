// Enrichment dispatch: trait boundary + sequential, paced delivery.
//
// The sync run hands newly ingested round ids to a RoundEnricher one at a
// time. Production POSTs to the API's process-round endpoint; tests use
// RecordingEnricher. A failed round is logged and counted, never retried
// here, and never affects ingestion.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use ggstats_common::RoundId;
use ggstats_ledger::Ledger;

#[async_trait]
pub trait RoundEnricher: Send + Sync {
    async fn enrich(&self, round: &RoundId) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<RoundId>,
}

pub struct EnrichmentDispatcher {
    enricher: Arc<dyn RoundEnricher>,
    delay: Duration,
}

impl EnrichmentDispatcher {
    pub fn new(enricher: Arc<dyn RoundEnricher>, delay: Duration) -> Self {
        Self { enricher, delay }
    }

    /// Request enrichment for each round, in order, one at a time.
    pub async fn dispatch(&self, rounds: &[RoundId]) -> DispatchStats {
        let mut stats = DispatchStats::default();
        if rounds.is_empty() {
            return stats;
        }

        info!(rounds = rounds.len(), "Dispatching round enrichment");

        for (i, round) in rounds.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            stats.attempted += 1;
            match self.enricher.enrich(round).await {
                Ok(()) => stats.succeeded += 1,
                Err(e) => {
                    warn!(round = %round, error = %e, "Round enrichment failed");
                    stats.failed.push(round.clone());
                }
            }

            if (i + 1) % 25 == 0 {
                info!(done = i + 1, of = rounds.len(), "Enrichment progress");
            }
        }

        info!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed.len(),
            "Enrichment dispatch complete"
        );
        stats
    }
}

/// Every round of every stored duel, newest duel first. Used to backfill
/// enrichment after the fact; already-enriched rounds are cheap no-ops on
/// the receiving side.
pub async fn all_rounds(ledger: &dyn Ledger) -> Result<Vec<RoundId>> {
    let records = ledger.all().await.context("Failed to load stored duels")?;
    Ok(records.iter().flat_map(|r| r.round_ids()).collect())
}

// ---------------------------------------------------------------------------
// HttpRoundEnricher (production)
// ---------------------------------------------------------------------------

/// POSTs `{ "roundId": ... }` to `{api_url}/api/process-round`.
pub struct HttpRoundEnricher {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct ProcessRoundResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl HttpRoundEnricher {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RoundEnricher for HttpRoundEnricher {
    async fn enrich(&self, round: &RoundId) -> Result<()> {
        let url = format!("{}/api/process-round", self.api_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "roundId": round.to_string() }))
            .send()
            .await
            .with_context(|| format!("process-round request failed for {round}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("process-round failed ({status}): {body}");
        }

        let body: ProcessRoundResponse = resp
            .json()
            .await
            .context("Invalid process-round response")?;
        if body.status != "success" {
            anyhow::bail!(
                "process-round returned {}: {}",
                body.status,
                body.message.unwrap_or_default()
            );
        }
        Ok(())
    }
}
