pub mod commit;
pub mod dispatcher;
pub mod orchestrator;
pub mod resolver;
pub mod settings;
pub mod stats;
pub mod traits;
pub mod walker;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use commit::{commit, CommitOutcome};
pub use dispatcher::{DispatchStats, EnrichmentDispatcher, HttpRoundEnricher, RoundEnricher};
pub use orchestrator::{Orchestrator, SyncContext, SyncOutcome};
pub use settings::SyncSettings;
pub use stats::SyncSummary;
pub use traits::{FeedSource, MatchSource};
