use thiserror::Error;

use crate::ports::bundle::BundleError;

#[derive(Error, Debug, Clone)]
pub enum JitoError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Block engine error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Bundle did not land in time")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed response: {0}")]
    Response(String),
}

impl JitoError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, JitoError::Http(_) | JitoError::Timeout | JitoError::RateLimited)
    }
}

impl From<reqwest::Error> for JitoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            JitoError::Timeout
        } else {
            JitoError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for JitoError {
    fn from(err: serde_json::Error) -> Self {
        JitoError::Response(err.to_string())
    }
}

impl From<JitoError> for BundleError {
    fn from(err: JitoError) -> Self {
        match err {
            JitoError::InvalidBundle(msg) | JitoError::Serialization(msg) => {
                BundleError::Invalid(msg)
            }
            JitoError::Response(msg) => BundleError::Status(msg),
            other => BundleError::Submission(other.to_string()),
        }
    }
}
