// In-process ledger for tests and local runs without Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use ggstats_common::{MatchId, MatchRecord, RoundId, Watermark};

use crate::error::{LedgerError, Result};
use crate::ledger::{EmbeddingStore, Ledger};

#[derive(Default)]
struct State {
    records: HashMap<MatchId, MatchRecord>,
    watermark: Watermark,
    embeddings: HashMap<RoundId, Vec<f32>>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<State>,
    fail_next_append: AtomicBool,
    append_calls: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with already-ingested records and a watermark.
    pub fn with_records(records: Vec<MatchRecord>, watermark: Watermark) -> Self {
        let state = State {
            records: records
                .into_iter()
                .map(|r| (r.game_id.clone(), r))
                .collect(),
            watermark,
            embeddings: HashMap::new(),
        };
        Self {
            state: RwLock::new(state),
            ..Self::default()
        }
    }

    /// Make the next `append` fail without writing anything.
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    /// Number of `append` calls seen, including rejected ones.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub async fn ids(&self) -> HashSet<MatchId> {
        self.state.read().await.records.keys().cloned().collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn watermark(&self) -> Result<Watermark> {
        Ok(self.state.read().await.watermark)
    }

    async fn existing_ids(&self, ids: &[MatchId]) -> Result<HashSet<MatchId>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter(|id| state.records.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn append(&self, records: &[MatchRecord]) -> Result<Vec<MatchId>> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::WriteRejected("injected append failure".into()));
        }

        let mut state = self.state.write().await;
        let mut inserted = Vec::new();
        for record in records {
            if state.records.contains_key(&record.game_id) {
                continue;
            }
            state.records.insert(record.game_id.clone(), record.clone());
            inserted.push(record.game_id.clone());
        }
        Ok(inserted)
    }

    async fn advance_watermark(&self, candidate: Watermark) -> Result<Watermark> {
        let mut state = self.state.write().await;
        state.watermark = state.watermark.advanced_to(candidate);
        Ok(state.watermark)
    }

    async fn get(&self, id: &MatchId) -> Result<Option<MatchRecord>> {
        Ok(self.state.read().await.records.get(id).cloned())
    }

    async fn all(&self) -> Result<Vec<MatchRecord>> {
        let mut records: Vec<MatchRecord> =
            self.state.read().await.records.values().cloned().collect();
        records.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(records)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.read().await.records.len() as u64)
    }
}

#[async_trait]
impl EmbeddingStore for MemoryLedger {
    async fn has_embedding(&self, round: &RoundId) -> Result<bool> {
        Ok(self.state.read().await.embeddings.contains_key(round))
    }

    async fn store_embedding(&self, round: &RoundId, embedding: &[f32]) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.embeddings.contains_key(round) {
            return Ok(false);
        }
        state.embeddings.insert(round.clone(), embedding.to_vec());
        Ok(true)
    }

    async fn embedding_count(&self) -> Result<u64> {
        Ok(self.state.read().await.embeddings.len() as u64)
    }
}
