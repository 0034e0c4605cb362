pub mod error;
mod ledger;
mod memory;
mod postgres;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use error::{LedgerError, Result};
pub use ledger::{EmbeddingStore, Ledger};
pub use memory::MemoryLedger;
pub use postgres::PgLedger;
