//! PgLedger against a real Postgres.
//!
//! Requirements: Docker (for Postgres via testcontainers).
//! Skipped unless `GGSTATS_PG_TESTS` is set.

use chrono::{DateTime, Utc};
use ggstats_common::{MatchId, MatchRecord, RoundId, Watermark};
use ggstats_ledger::testutil::postgres_container;
use ggstats_ledger::{EmbeddingStore, Ledger};

fn record(id: &str, created_ms: i64, rounds: usize) -> MatchRecord {
    let rounds: Vec<serde_json::Value> = (1..=rounds)
        .map(|n| serde_json::json!({"roundNumber": n}))
        .collect();
    MatchRecord::from_json(serde_json::json!({
        "gameId": id,
        "created": DateTime::<Utc>::from_timestamp_millis(created_ms).unwrap(),
        "rounds": rounds,
        "status": "Finished",
    }))
    .unwrap()
}

fn enabled() -> bool {
    if std::env::var("GGSTATS_PG_TESTS").is_err() {
        eprintln!("Skipping: GGSTATS_PG_TESTS not set");
        return false;
    }
    true
}

#[tokio::test]
async fn append_is_idempotent_and_reads_back_verbatim() {
    if !enabled() {
        return;
    }
    let (_container, ledger) = postgres_container().await;

    let first = ledger
        .append(&[record("a", 1_000, 3), record("b", 2_000, 5)])
        .await
        .unwrap();
    assert_eq!(first.len(), 2);

    let second = ledger
        .append(&[record("a", 1_000, 3), record("c", 3_000, 1)])
        .await
        .unwrap();
    assert_eq!(second, vec![MatchId::from("c")]);
    assert_eq!(ledger.count().await.unwrap(), 3);

    let existing = ledger
        .existing_ids(&[MatchId::from("a"), MatchId::from("zzz")])
        .await
        .unwrap();
    assert!(existing.contains(&MatchId::from("a")));
    assert_eq!(existing.len(), 1);

    let b = ledger.get(&MatchId::from("b")).await.unwrap().unwrap();
    assert_eq!(b.rounds.len(), 5);
    assert_eq!(b.extra.get("status"), Some(&serde_json::json!("Finished")));

    let order: Vec<String> = ledger
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.game_id.to_string())
        .collect();
    assert_eq!(order, vec!["c", "b", "a"]);
}

#[tokio::test]
async fn watermark_is_monotonic_in_storage() {
    if !enabled() {
        return;
    }
    let (_container, ledger) = postgres_container().await;

    assert_eq!(ledger.watermark().await.unwrap(), Watermark::ZERO);
    ledger.advance_watermark(Watermark::from_millis(500)).await.unwrap();
    let after = ledger.advance_watermark(Watermark::from_millis(100)).await.unwrap();
    assert_eq!(after, Watermark::from_millis(500));
    assert_eq!(ledger.watermark().await.unwrap(), Watermark::from_millis(500));
}

#[tokio::test]
async fn embeddings_live_in_their_own_namespace() {
    if !enabled() {
        return;
    }
    let (_container, ledger) = postgres_container().await;

    let round: RoundId = "a_1".parse().unwrap();
    assert!(ledger.store_embedding(&round, &[0.25, 0.5]).await.unwrap());
    assert!(!ledger.store_embedding(&round, &[1.0]).await.unwrap());
    assert!(ledger.has_embedding(&round).await.unwrap());
    assert_eq!(ledger.embedding_count().await.unwrap(), 1);
    assert_eq!(ledger.count().await.unwrap(), 0);
}
