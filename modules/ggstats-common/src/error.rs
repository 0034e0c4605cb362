use thiserror::Error;

#[derive(Error, Debug)]
pub enum GgStatsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid round id: {0}")]
    InvalidRoundId(String),
}
