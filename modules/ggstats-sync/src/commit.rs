// Commit step shared by the sync binary and the HTTP API: dedupe against the
// ledger, append what is new, then move the watermark.
//
// The watermark only moves after the append has succeeded, so a failed write
// leaves the next run looking at the same window again.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{info, warn};

use ggstats_common::{MatchId, MatchRecord, RoundId, Watermark};
use ggstats_ledger::Ledger;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    /// Ids actually written by this commit.
    pub added: Vec<MatchId>,
    /// Records that were already in the ledger (or repeated in the batch).
    pub skipped: usize,
    /// Round ids of the newly written duels, in duel then round order.
    pub rounds_to_process: Vec<RoundId>,
    /// Rounds across every committed record, new or not.
    pub rounds_total: usize,
    /// Watermark after the commit.
    pub watermark: Watermark,
}

impl CommitOutcome {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

/// Persist `records` and advance the watermark to `candidate` when it is
/// newer than `current`.
///
/// `current` is the watermark the caller read at the start of its run; the
/// ledger enforces monotonicity on its own as well.
pub async fn commit(
    ledger: &dyn Ledger,
    records: &[MatchRecord],
    current: Watermark,
    candidate: Option<Watermark>,
) -> Result<CommitOutcome> {
    let mut seen = HashSet::new();
    let unique: Vec<&MatchRecord> = records
        .iter()
        .filter(|r| seen.insert(r.game_id.clone()))
        .collect();
    let repeated = records.len() - unique.len();

    let ids: Vec<MatchId> = unique.iter().map(|r| r.game_id.clone()).collect();
    let existing = ledger
        .existing_ids(&ids)
        .await
        .context("Failed to check existing duels")?;

    let fresh: Vec<MatchRecord> = unique
        .iter()
        .filter(|r| !existing.contains(&r.game_id))
        .map(|r| (*r).clone())
        .collect();

    let added = if fresh.is_empty() {
        Vec::new()
    } else {
        ledger
            .append(&fresh)
            .await
            .context("Failed to persist duels")?
    };

    let inserted: HashSet<&MatchId> = added.iter().collect();
    let rounds_to_process: Vec<RoundId> = fresh
        .iter()
        .filter(|r| inserted.contains(&r.game_id))
        .flat_map(|r| r.round_ids())
        .collect();
    let rounds_total = unique.iter().map(|r| r.rounds.len()).sum();

    let watermark = match candidate {
        Some(candidate) if candidate > current => ledger
            .advance_watermark(candidate)
            .await
            .context("Failed to advance sync watermark")?,
        _ => current,
    };

    let skipped = records.len() - added.len();
    if added.len() < fresh.len() {
        warn!(
            expected = fresh.len(),
            written = added.len(),
            "Some duels were written concurrently by another run"
        );
    }

    info!(
        added = added.len(),
        skipped,
        repeated,
        new_rounds = rounds_to_process.len(),
        watermark = %watermark,
        "Commit complete"
    );

    Ok(CommitOutcome {
        added,
        skipped,
        rounds_to_process,
        rounds_total,
        watermark,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ms, record};
    use ggstats_ledger::MemoryLedger;

    #[tokio::test]
    async fn new_records_are_appended_and_rounds_emitted() {
        let ledger = MemoryLedger::new();
        let records = vec![record("a", 100, 2), record("b", 90, 3)];

        let out = commit(&ledger, &records, Watermark::ZERO, Some(ms(100)))
            .await
            .unwrap();

        assert_eq!(out.added_count(), 2);
        assert_eq!(out.skipped, 0);
        let rounds: Vec<String> = out.rounds_to_process.iter().map(|r| r.to_string()).collect();
        assert_eq!(rounds, vec!["a_1", "a_2", "b_1", "b_2", "b_3"]);
        assert_eq!(out.watermark, ms(100));
        assert_eq!(ledger.watermark().await.unwrap(), ms(100));
    }

    #[tokio::test]
    async fn existing_records_are_skipped_without_rounds() {
        let ledger = MemoryLedger::with_records(vec![record("a", 100, 2)], ms(100));
        let records = vec![record("a", 100, 2), record("b", 110, 1)];

        let out = commit(&ledger, &records, ms(100), Some(ms(110)))
            .await
            .unwrap();

        assert_eq!(out.added, vec![MatchId::from("b")]);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.rounds_to_process.len(), 1);
        assert_eq!(out.rounds_total, 3);
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_are_written_once() {
        let ledger = MemoryLedger::new();
        let records = vec![record("a", 100, 1), record("a", 100, 1)];

        let out = commit(&ledger, &records, Watermark::ZERO, None).await.unwrap();
        assert_eq!(out.added_count(), 1);
        assert_eq!(out.skipped, 1);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_append_leaves_the_watermark_alone() {
        let ledger = MemoryLedger::with_records(vec![], ms(50));
        ledger.fail_next_append();

        let err = commit(&ledger, &[record("a", 100, 1)], ms(50), Some(ms(100)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("persist"));
        assert_eq!(ledger.watermark().await.unwrap(), ms(50));
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn older_candidate_does_not_regress() {
        let ledger = MemoryLedger::with_records(vec![], ms(200));
        let out = commit(&ledger, &[record("a", 100, 1)], ms(200), Some(ms(100)))
            .await
            .unwrap();

        assert_eq!(out.watermark, ms(200));
        assert_eq!(ledger.watermark().await.unwrap(), ms(200));
        assert_eq!(out.added[0], MatchId::from("a"));
    }
}
