//! Error types for the analysis pipeline

use thiserror::Error;

/// Pipeline errors
///
/// Only [`PulseError::ConfigError`] is meant to escape to the caller. Every
/// per-instrument failure is caught at the gateway/analyzer boundary and
/// turned into a degraded report entry.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Market data fetch exhausted its retries for one instrument
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Network or HTTP failure while calling the LLM provider
    #[error("LLM transport error: {0}")]
    LlmTransport(String),

    /// The LLM reply failed structured-output parsing or validation
    #[error("LLM schema error: {0}")]
    LlmSchema(String),

    /// Missing or invalid required configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The data source answered with an empty or unusable payload
    #[error("Malformed payload for {symbol}: {reason}")]
    MalformedPayload { symbol: String, reason: String },

    /// The data source reported a failure
    #[error("Data source error: {0}")]
    SourceError(String),

    /// Unknown instrument or unsupported code
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Filesystem error (pool files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Technical indicator construction error
    #[error("Technical indicator error: {0}")]
    IndicatorError(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PulseError>;

impl PulseError {
    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::MalformedPayload { .. }
                | Self::SourceError(_)
                | Self::NetworkError(_)
                | Self::JsonError(_)
        )
    }

    /// Short machine-friendly kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::LlmTransport(_) => "llm_transport",
            Self::LlmSchema(_) => "llm_schema",
            Self::ConfigError(_) => "configuration",
            Self::Timeout { .. } => "timeout",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::SourceError(_) => "source",
            Self::InvalidSymbol(_) => "invalid_symbol",
            Self::NetworkError(_) => "network",
            Self::JsonError(_) => "json",
            Self::Io(_) => "io",
            Self::IndicatorError(_) => "indicator",
        }
    }
}

impl From<pulse_utils::EnvError> for PulseError {
    fn from(err: pulse_utils::EnvError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<ta::errors::TaError> for PulseError {
    fn from(err: ta::errors::TaError) -> Self {
        Self::IndicatorError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PulseError::DataUnavailable {
            symbol: "510300".to_string(),
            reason: "3 attempts failed".to_string(),
        };
        assert_eq!(err.to_string(), "Data not available for 510300: 3 attempts failed");

        let err = PulseError::Timeout {
            operation: "quote 510300".to_string(),
            seconds: 30,
        };
        assert_eq!(err.to_string(), "quote 510300 timed out after 30s");
    }

    #[test]
    fn test_transient_classification() {
        assert!(PulseError::SourceError("503".into()).is_transient());
        assert!(
            PulseError::MalformedPayload {
                symbol: "X".into(),
                reason: "empty".into()
            }
            .is_transient()
        );
        assert!(!PulseError::InvalidSymbol("??".into()).is_transient());
        assert!(!PulseError::ConfigError("key".into()).is_transient());
        assert!(
            !PulseError::DataUnavailable {
                symbol: "X".into(),
                reason: "r".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_env_error_conversion() {
        let err: PulseError = pulse_utils::EnvError::Invalid {
            key: "CACHE_EXPIRE_SECONDS".into(),
            value: "soon".into(),
            reason: "invalid digit found in string".into(),
        }
        .into();
        assert!(matches!(err, PulseError::ConfigError(msg) if msg.contains("CACHE_EXPIRE_SECONDS")));
    }
}
