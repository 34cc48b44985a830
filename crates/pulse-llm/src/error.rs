//! Error types for LLM operations

use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LLMError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Invalid API key or authentication failed
    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The provider refused the request shape (HTTP 400/422)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Request did not complete within the configured timeout
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LLMError {
    /// Whether the provider rejected the request itself rather than failing to serve it
    ///
    /// A rejection is the signal that a structured-output declaration may not be
    /// supported by the provider and a looser one could succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// Whether the failure concerns the body of an otherwise delivered response
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, Self::UnexpectedResponse(_) | Self::SerializationError(_))
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, body: String, model: &str) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed,
            429 => Self::RateLimitExceeded(body),
            400 | 422 => Self::InvalidRequest(body),
            404 => Self::ModelNotFound(model.to_string()),
            _ => Self::RequestFailed(format!("HTTP {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            LLMError::from_status(401, String::new(), "m"),
            LLMError::AuthenticationFailed
        ));
        assert!(matches!(
            LLMError::from_status(429, "slow down".into(), "m"),
            LLMError::RateLimitExceeded(_)
        ));
        assert!(LLMError::from_status(400, "bad response_format".into(), "m").is_rejection());
        assert!(LLMError::from_status(422, String::new(), "m").is_rejection());
        assert!(matches!(
            LLMError::from_status(404, String::new(), "sonar-pro"),
            LLMError::ModelNotFound(m) if m == "sonar-pro"
        ));
        assert!(matches!(
            LLMError::from_status(503, "down".into(), "m"),
            LLMError::RequestFailed(msg) if msg.contains("503")
        ));
    }

    #[test]
    fn test_rejection_is_not_transport_failure() {
        assert!(!LLMError::RateLimitExceeded(String::new()).is_rejection());
        assert!(!LLMError::Timeout(30).is_rejection());
        assert!(LLMError::UnexpectedResponse("no choices".into()).is_malformed_response());
    }
}
