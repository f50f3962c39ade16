use thiserror::Error;

use crate::model::TvId;

/// Result type alias for wall client operations
pub type Result<T> = std::result::Result<T, WallError>;

#[derive(Error, Debug)]
pub enum WallError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} failed with HTTP status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    // Réponse 2xx sans `success`
    #[error("Backend did not accept {0}")]
    Rejected(String),
    #[error("Invalid image size {width}x{height}")]
    InvalidImageSize { width: f64, height: f64 },
    #[error("Invalid wall layout: {0}")]
    InvalidLayout(String),
    #[error("Unknown screen {0}")]
    UnknownScreen(TvId),
}

impl WallError {
    pub fn rejected(command: &str) -> Self {
        WallError::Rejected(command.to_string())
    }

    pub fn invalid_layout(message: impl Into<String>) -> Self {
        WallError::InvalidLayout(message.into())
    }
}
