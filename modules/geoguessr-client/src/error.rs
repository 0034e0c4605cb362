use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeoGuessrError>;

#[derive(Debug, Error)]
pub enum GeoGuessrError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GeoGuessrError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GeoGuessrError::Parse(err.to_string())
        } else {
            GeoGuessrError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GeoGuessrError {
    fn from(err: serde_json::Error) -> Self {
        GeoGuessrError::Parse(err.to_string())
    }
}
