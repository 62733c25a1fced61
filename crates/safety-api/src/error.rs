//! Error types for safety-api.

use thiserror::Error;

/// Errors that can occur when talking to the safety backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success HTTP status.
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Backend answered `success: false`.
    #[error("Rejected by backend: {message}")]
    Rejected { message: String },

    /// A success response lacked a field the caller needs.
    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether retrying the same request later could succeed.
    ///
    /// Connection failures, timeouts and 5xx/408/429 answers are transient;
    /// explicit rejections and malformed responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(_) => true,
            ApiError::Status { code, .. } => *code >= 500 || *code == 408 || *code == 429,
            ApiError::Json(_)
            | ApiError::Rejected { .. }
            | ApiError::MissingField(_)
            | ApiError::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Status { code: 503, body: String::new() }.is_transient());
        assert!(ApiError::Status { code: 429, body: String::new() }.is_transient());
        assert!(!ApiError::Status { code: 404, body: String::new() }.is_transient());
        assert!(!ApiError::Rejected { message: "duplicate".into() }.is_transient());
        assert!(!ApiError::MissingField("alert.id").is_transient());
    }
}
