/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stored record for {id} is unreadable: {message}")]
    Corrupt { id: String, message: String },

    #[error("Write rejected: {0}")]
    WriteRejected(String),
}
