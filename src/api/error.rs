use thiserror::Error;

use crate::auth::AuthError;

/// Typed platform API errors enabling retry classification.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Write to {url} failed: {reason}")]
    Write { url: String, reason: String },

    #[error("Unexpected response from {url}: {detail}")]
    Malformed { url: String, detail: String },
}

impl ApiError {
    /// Whether a read that failed this way is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ApiError::Fetch { .. } => true,
            ApiError::Auth(_) | ApiError::Write { .. } | ApiError::Malformed { .. } => false,
        }
    }

    pub(crate) fn malformed(url: &str, detail: impl std::fmt::Display) -> Self {
        ApiError::Malformed {
            url: url.to_string(),
            detail: detail.to_string(),
        }
    }
}
