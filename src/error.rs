//! Domain-specific error types for listening-coach

use thiserror::Error;

/// Main error type for the generation pipeline.
///
/// None of these cross a public operation boundary: the gateway masks transport
/// failures with mock payloads and each synthesizer masks the rest with its
/// deterministic fallback. They exist so the internal stages can use `?`.
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("JSON extraction error: {message}")]
    JsonExtraction { message: String },

    #[error("Schema validation error: missing fields {missing:?}")]
    SchemaValidation { missing: Vec<String> },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoachError {
    /// Whether the gateway should spend another attempt on this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoachError::Network { .. }
                | CoachError::Timeout { .. }
                | CoachError::MalformedResponse { .. }
        )
    }
}

impl From<anyhow::Error> for CoachError {
    fn from(err: anyhow::Error) -> Self {
        CoachError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoachError {
    fn from(err: serde_json::Error) -> Self {
        CoachError::Serialization {
            message: err.to_string(),
        }
    }
}

// Client-side timeouts land here too; the reqwest text already says so.
impl From<reqwest::Error> for CoachError {
    fn from(err: reqwest::Error) -> Self {
        CoachError::Network {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

/// Result type alias for listening-coach operations
pub type Result<T> = std::result::Result<T, CoachError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retryable() {
        assert!(
            CoachError::Network {
                message: "refused".into()
            }
            .is_retryable()
        );
        assert!(
            CoachError::Timeout {
                operation: "x".into(),
                timeout_ms: 10
            }
            .is_retryable()
        );
        assert!(
            CoachError::MalformedResponse {
                message: "no choices".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn reqwest_errors_become_network_errors() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let mapped = CoachError::from(err);
        assert!(matches!(&mapped, CoachError::Network { message } if message.starts_with("HTTP request failed")));
        assert!(mapped.is_retryable());
    }

    #[test]
    fn local_failures_are_not_retryable() {
        assert!(
            !CoachError::SchemaValidation {
                missing: vec!["weak_areas".into()]
            }
            .is_retryable()
        );
        assert!(
            !CoachError::JsonExtraction {
                message: "no braces".into()
            }
            .is_retryable()
        );
    }
}
