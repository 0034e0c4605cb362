// Postgres-backed ledger.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use ggstats_common::{MatchId, MatchRecord, RoundId, Watermark};

use crate::error::{LedgerError, Result};
use crate::ledger::{EmbeddingStore, Ledger};

/// Reserved `sync_state` key holding the watermark.
const WATERMARK_KEY: &str = "last_sync";

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Ledger migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_record(game_id: &str, value: serde_json::Value) -> Result<MatchRecord> {
    serde_json::from_value(value).map_err(|e| LedgerError::Corrupt {
        id: game_id.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Ledger for PgLedger {
    async fn watermark(&self) -> Result<Watermark> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM sync_state WHERE key = $1")
            .bind(WATERMARK_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.map(Watermark::from_millis).unwrap_or(Watermark::ZERO))
    }

    async fn existing_ids(&self, ids: &[MatchId]) -> Result<HashSet<MatchId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let raw: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query_scalar::<_, String>("SELECT game_id FROM duels WHERE game_id = ANY($1)")
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(MatchId::from).collect())
    }

    async fn append(&self, records: &[MatchRecord]) -> Result<Vec<MatchId>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(records.len());

        for record in records {
            let row = sqlx::query_scalar::<_, String>(
                r#"
                INSERT INTO duels (game_id, created_at, record)
                VALUES ($1, $2, $3)
                ON CONFLICT (game_id) DO NOTHING
                RETURNING game_id
                "#,
            )
            .bind(record.game_id.as_str())
            .bind(record.created)
            .bind(sqlx::types::Json(record))
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                Some(id) => inserted.push(MatchId::from(id)),
                None => warn!(game_id = %record.game_id, "Duel already in ledger, not re-inserted"),
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn advance_watermark(&self, candidate: Watermark) -> Result<Watermark> {
        let stored = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sync_state (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key)
            DO UPDATE SET value = GREATEST(sync_state.value, EXCLUDED.value),
                          updated_at = now()
            RETURNING value
            "#,
        )
        .bind(WATERMARK_KEY)
        .bind(candidate.as_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(Watermark::from_millis(stored))
    }

    async fn get(&self, id: &MatchId) -> Result<Option<MatchRecord>> {
        let row = sqlx::query_scalar::<_, serde_json::Value>("SELECT record FROM duels WHERE game_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|value| decode_record(id.as_str(), value)).transpose()
    }

    async fn all(&self) -> Result<Vec<MatchRecord>> {
        let rows = sqlx::query_as::<_, (String, serde_json::Value)>(
            "SELECT game_id, record FROM duels ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (game_id, value) in rows {
            match decode_record(&game_id, value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(game_id = %game_id, error = %e, "Skipping unreadable duel"),
            }
        }
        Ok(records)
    }

    async fn count(&self) -> Result<u64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM duels")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl EmbeddingStore for PgLedger {
    async fn has_embedding(&self, round: &RoundId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM round_embeddings WHERE round_id = $1)",
        )
        .bind(round.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn store_embedding(&self, round: &RoundId, embedding: &[f32]) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO round_embeddings (round_id, embedding)
            VALUES ($1, $2)
            ON CONFLICT (round_id) DO NOTHING
            "#,
        )
        .bind(round.to_string())
        .bind(embedding)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn embedding_count(&self) -> Result<u64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM round_embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}
