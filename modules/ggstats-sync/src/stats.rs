use std::collections::BTreeMap;

use chrono::NaiveDate;

use ggstats_common::{MatchRecord, SyncMode, Watermark};

use crate::commit::CommitOutcome;
use crate::dispatcher::DispatchStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayStats {
    pub duels: u32,
    pub new_rounds: u32,
}

/// What one sync run saw and did.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub mode: SyncMode,
    pub dry_run: bool,
    pub pages_scanned: u32,
    pub malformed_entries: usize,
    /// The page cap stopped the walk before the boundary or feed end.
    pub partial: bool,
    pub found: usize,
    pub resolved: usize,
    pub unavailable: usize,
    pub added: usize,
    pub skipped: usize,
    pub rounds_total: usize,
    pub rounds_new: usize,
    pub watermark_before: Watermark,
    pub watermark_after: Watermark,
    /// Resolved duels per UTC day of their feed time.
    pub by_day: BTreeMap<NaiveDate, DayStats>,
    pub enrichment: Option<DispatchStats>,
}

impl SyncSummary {
    pub fn new(mode: SyncMode, watermark: Watermark) -> Self {
        Self {
            mode,
            dry_run: false,
            pages_scanned: 0,
            malformed_entries: 0,
            partial: false,
            found: 0,
            resolved: 0,
            unavailable: 0,
            added: 0,
            skipped: 0,
            rounds_total: 0,
            rounds_new: 0,
            watermark_before: watermark,
            watermark_after: watermark,
            by_day: BTreeMap::new(),
            enrichment: None,
        }
    }

    /// Tally resolved records by day, counting new rounds only for the ids
    /// the commit actually wrote.
    pub(crate) fn record_days(&mut self, records: &[MatchRecord], commit: Option<&CommitOutcome>) {
        for record in records {
            let day = self.by_day.entry(record.created.date_naive()).or_default();
            day.duels += 1;
            if commit.is_some_and(|c| c.added.contains(&record.game_id)) {
                day.new_rounds += record.rounds.len() as u32;
            }
        }
    }

    pub fn rounds_skipped(&self) -> usize {
        self.rounds_total.saturating_sub(self.rounds_new)
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let title = if self.dry_run { "Sync Preview" } else { "Sync Complete" };
        writeln!(f, "\n=== {title} ({}) ===", self.mode)?;
        writeln!(f, "Feed pages scanned: {}", self.pages_scanned)?;
        if self.partial {
            writeln!(f, "  (page cap reached, older history not scanned)")?;
        }
        writeln!(f, "Malformed entries:  {}", self.malformed_entries)?;
        writeln!(f, "Duels found:        {}", self.found)?;
        writeln!(f, "Duels resolved:     {}", self.resolved)?;
        writeln!(f, "Duels unavailable:  {}", self.unavailable)?;
        writeln!(f, "Duels added:        {}", self.added)?;
        writeln!(f, "Duels skipped:      {} (already stored)", self.skipped)?;
        writeln!(f, "Rounds total:       {}", self.rounds_total)?;
        writeln!(f, "Rounds new:         {}", self.rounds_new)?;
        writeln!(f, "Rounds skipped:     {}", self.rounds_skipped())?;
        writeln!(f, "Watermark:          {} -> {}", self.watermark_before, self.watermark_after)?;

        if !self.by_day.is_empty() {
            writeln!(f, "\nBy day:")?;
            for (day, stats) in self.by_day.iter().rev() {
                writeln!(f, "  {day}: {} duels, {} new rounds", stats.duels, stats.new_rounds)?;
            }
        }

        if let Some(enrichment) = &self.enrichment {
            writeln!(f, "\nEnrichment:")?;
            writeln!(f, "  Attempted: {}", enrichment.attempted)?;
            writeln!(f, "  Succeeded: {}", enrichment.succeeded)?;
            writeln!(f, "  Failed:    {}", enrichment.failed.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ms, record};
    use ggstats_common::MatchId;

    #[test]
    fn days_count_new_rounds_only_for_written_ids() {
        let mut summary = SyncSummary::new(SyncMode::Full, Watermark::ZERO);
        let records = vec![record("a", 100, 2), record("b", 200, 3)];
        let commit = CommitOutcome {
            added: vec![MatchId::from("b")],
            watermark: ms(200),
            ..Default::default()
        };

        summary.record_days(&records, Some(&commit));

        let day = summary.by_day.values().next().copied().unwrap();
        assert_eq!(summary.by_day.len(), 1);
        assert_eq!(day, DayStats { duels: 2, new_rounds: 3 });
    }

    #[test]
    fn display_mentions_partial_runs() {
        let mut summary = SyncSummary::new(SyncMode::Incremental, ms(10));
        summary.partial = true;
        summary.rounds_total = 5;
        summary.rounds_new = 2;

        let text = summary.to_string();
        assert!(text.contains("page cap reached"));
        assert!(text.contains("Rounds skipped:     3"));
    }
}
