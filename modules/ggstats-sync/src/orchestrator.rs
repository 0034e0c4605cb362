// Sync orchestration: boundary -> walk -> resolve -> commit.
//
// The watermark is read once per run and threaded through a SyncContext, so
// a run is fully determined by (mode, context, upstream). Nothing is written
// until every candidate has been resolved.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use ggstats_common::{MatchRecord, RoundId, SyncMode, Watermark};
use ggstats_ledger::Ledger;

use crate::commit::{commit, CommitOutcome};
use crate::resolver::{MatchResolver, Resolution};
use crate::settings::SyncSettings;
use crate::stats::SyncSummary;
use crate::traits::{FeedSource, MatchSource};
use crate::walker::{Boundary, Candidate, FeedWalker, WalkReport, WalkStop};

/// Inputs a run depends on besides the upstream itself.
#[derive(Debug, Clone, Copy)]
pub struct SyncContext {
    pub watermark: Watermark,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub added_count: usize,
    /// Round ids of every newly persisted duel, ready for enrichment.
    pub new_rounds: Vec<RoundId>,
    pub summary: SyncSummary,
}

impl SyncOutcome {
    pub fn watermark(&self) -> Watermark {
        self.summary.watermark_after
    }
}

pub struct Orchestrator {
    walker: FeedWalker,
    resolver: MatchResolver,
    ledger: Arc<dyn Ledger>,
}

impl Orchestrator {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        matches: Arc<dyn MatchSource>,
        ledger: Arc<dyn Ledger>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            walker: FeedWalker::new(feed, settings),
            resolver: MatchResolver::new(matches, settings),
            ledger,
        }
    }

    /// Run a sync against the ledger's current watermark.
    pub async fn run(&self, mode: SyncMode) -> Result<SyncOutcome> {
        let ctx = self.context().await?;
        self.run_with(mode, ctx).await
    }

    /// Walk and resolve without writing anything. `added_count` is what a
    /// real run would add right now.
    pub async fn preview(&self, mode: SyncMode) -> Result<SyncOutcome> {
        let ctx = self.context().await?;
        let (mut summary, resolution, _) = self.collect(mode, ctx).await?;
        summary.dry_run = true;

        let ids: Vec<_> = resolution.records.iter().map(|r| r.game_id.clone()).collect();
        let existing = self
            .ledger
            .existing_ids(&ids)
            .await
            .context("Failed to check existing duels")?;

        let mut seen = HashSet::new();
        let would_add: Vec<&MatchRecord> = resolution
            .records
            .iter()
            .filter(|r| !existing.contains(&r.game_id) && seen.insert(r.game_id.clone()))
            .collect();
        let new_rounds: Vec<RoundId> = would_add.iter().flat_map(|r| r.round_ids()).collect();
        let preview = CommitOutcome {
            added: would_add.iter().map(|r| r.game_id.clone()).collect(),
            ..Default::default()
        };

        summary.record_days(&resolution.records, Some(&preview));
        summary.added = preview.added_count();
        summary.skipped = resolution.records.len() - preview.added_count();
        summary.rounds_total = resolution.records.iter().map(|r| r.rounds.len()).sum();
        summary.rounds_new = new_rounds.len();

        Ok(SyncOutcome {
            added_count: preview.added_count(),
            new_rounds,
            summary,
        })
    }

    /// Run a sync with an explicit context. The returned summary carries the
    /// watermark the next run should start from.
    pub async fn run_with(&self, mode: SyncMode, ctx: SyncContext) -> Result<SyncOutcome> {
        let (mut summary, resolution, candidate) = self.collect(mode, ctx).await?;

        let outcome = commit(self.ledger.as_ref(), &resolution.records, ctx.watermark, candidate)
            .await
            .context("Sync commit failed")?;

        summary.record_days(&resolution.records, Some(&outcome));
        summary.added = outcome.added_count();
        summary.skipped = outcome.skipped;
        summary.rounds_total = outcome.rounds_total;
        summary.rounds_new = outcome.rounds_to_process.len();
        summary.watermark_after = outcome.watermark;

        info!(
            mode = %mode,
            added = summary.added,
            skipped = summary.skipped,
            new_rounds = summary.rounds_new,
            watermark = %summary.watermark_after,
            partial = summary.partial,
            "Sync run complete"
        );

        Ok(SyncOutcome {
            added_count: outcome.added_count(),
            new_rounds: outcome.rounds_to_process,
            summary,
        })
    }

    async fn context(&self) -> Result<SyncContext> {
        let watermark = self
            .ledger
            .watermark()
            .await
            .context("Failed to read sync watermark")?;
        Ok(SyncContext {
            watermark,
            now: Utc::now(),
        })
    }

    /// Walk and resolve. Also returns the watermark candidate for the walk.
    async fn collect(
        &self,
        mode: SyncMode,
        ctx: SyncContext,
    ) -> Result<(SyncSummary, Resolution, Option<Watermark>)> {
        let boundary = boundary_for(mode, &ctx);
        info!(mode = %mode, boundary = ?boundary, watermark = %ctx.watermark, "Starting sync");

        let walk: WalkReport = self.walker.walk(boundary).await?;
        let mut summary = SyncSummary::new(mode, ctx.watermark);
        summary.pages_scanned = walk.pages_scanned;
        summary.malformed_entries = walk.malformed_entries;
        summary.found = walk.candidates.len();
        summary.partial = walk.stop == WalkStop::PageCap;
        if summary.partial && boundary != Boundary::Unbounded {
            warn!(
                mode = %mode,
                pages = walk.pages_scanned,
                "Page cap reached before the sync boundary; older history was not scanned"
            );
        }

        let candidate = watermark_candidate(&walk.candidates);
        let resolution = self.resolver.resolve(&walk.candidates).await;
        summary.resolved = resolution.records.len();
        summary.unavailable = resolution.unavailable.len();

        Ok((summary, resolution, candidate))
    }
}

/// Where a mode stops walking.
pub fn boundary_for(mode: SyncMode, ctx: &SyncContext) -> Boundary {
    match mode {
        SyncMode::Incremental if ctx.watermark.is_zero() => Boundary::Unbounded,
        SyncMode::Incremental => Boundary::At(ctx.watermark.to_datetime()),
        // A window reaching past the representable calendar covers everything.
        SyncMode::Windowed { days } => Duration::try_days(i64::from(days))
            .and_then(|window| ctx.now.checked_sub_signed(window))
            .map_or(Boundary::Unbounded, Boundary::At),
        SyncMode::Full => Boundary::Unbounded,
    }
}

/// The newest creation time across every candidate the walk observed.
///
/// Resolved or not, new or already stored: the boundary keeps moving even
/// when a run adds nothing. A duel the upstream could not serve is left to
/// `full` or `recent` runs.
pub fn watermark_candidate(candidates: &[Candidate]) -> Option<Watermark> {
    candidates
        .iter()
        .map(|c| Watermark::from_datetime(&c.created))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, ms};
    use ggstats_common::MatchId;

    fn cand(id: &str, secs: i64) -> Candidate {
        Candidate {
            id: MatchId::from(id),
            created: at(secs),
        }
    }

    #[test]
    fn boundaries_per_mode() {
        let ctx = SyncContext {
            watermark: ms(85),
            now: at(10 * 86_400),
        };
        assert_eq!(boundary_for(SyncMode::Incremental, &ctx), Boundary::At(at(85)));
        assert_eq!(
            boundary_for(SyncMode::Windowed { days: 3 }, &ctx),
            Boundary::At(at(7 * 86_400))
        );
        assert_eq!(boundary_for(SyncMode::Full, &ctx), Boundary::Unbounded);

        let fresh = SyncContext {
            watermark: Watermark::ZERO,
            now: at(0),
        };
        assert_eq!(boundary_for(SyncMode::Incremental, &fresh), Boundary::Unbounded);
    }

    #[test]
    fn candidate_is_newest_observed_candidate() {
        let candidates = vec![cand("a", 90), cand("b", 100), cand("c", 80)];
        assert_eq!(watermark_candidate(&candidates), Some(ms(100)));
        assert_eq!(watermark_candidate(&[]), None);
    }

    #[test]
    fn oversized_window_walks_everything() {
        let ctx = SyncContext {
            watermark: Watermark::ZERO,
            now: at(10 * 86_400),
        };
        assert_eq!(
            boundary_for(SyncMode::Windowed { days: 200_000_000 }, &ctx),
            Boundary::Unbounded
        );
        assert_eq!(
            boundary_for(SyncMode::Windowed { days: u32::MAX }, &ctx),
            Boundary::Unbounded
        );
    }
}
