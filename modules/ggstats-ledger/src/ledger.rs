// Ledger trait boundary.
//
// The sync pipeline and the API only see these traits. Production wires in
// PgLedger; tests use MemoryLedger.

use std::collections::HashSet;

use async_trait::async_trait;

use ggstats_common::{MatchId, MatchRecord, RoundId, Watermark};

use crate::error::Result;

/// Durable record of every ingested duel plus the sync watermark.
///
/// Existence-check-then-append is not atomic against concurrent writers, so
/// callers serialize runs. `append` still ignores ids that are already present.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current watermark, `Watermark::ZERO` if nothing has been synced.
    async fn watermark(&self) -> Result<Watermark>;

    /// The subset of `ids` already in the ledger.
    async fn existing_ids(&self, ids: &[MatchId]) -> Result<HashSet<MatchId>>;

    /// Persist `records` all-or-nothing. Returns the ids actually inserted,
    /// which excludes any that were already present.
    async fn append(&self, records: &[MatchRecord]) -> Result<Vec<MatchId>>;

    /// Move the watermark to `candidate` if that is later than the stored
    /// value. Returns the stored value afterwards.
    async fn advance_watermark(&self, candidate: Watermark) -> Result<Watermark>;

    async fn get(&self, id: &MatchId) -> Result<Option<MatchRecord>>;

    /// Every ingested record, newest first.
    async fn all(&self) -> Result<Vec<MatchRecord>>;

    async fn count(&self) -> Result<u64>;
}

/// Enrichment outputs, keyed by round id in their own namespace.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn has_embedding(&self, round: &RoundId) -> Result<bool>;

    /// Store an embedding. Returns false if one already existed (left as is).
    async fn store_embedding(&self, round: &RoundId, embedding: &[f32]) -> Result<bool>;

    async fn embedding_count(&self) -> Result<u64>;
}
