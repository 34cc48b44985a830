//! Response-format negotiation
//!
//! Compatible providers disagree on how structured output is declared. Some
//! want a full JSON schema under `response_format`, some only accept
//! `{"type": "json_object"}`, some accept neither. Requests start in the
//! configured mode and may fall back once to the next looser mode.

use pulse_llm::{LLMError, ResponseFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use super::verdict::{SCORE_MAX, SCORE_MIN};

/// Structured-output declaration sent with a completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatMode {
    /// `response_format = {"type": "json_schema", ...}`
    JsonSchema,
    /// `response_format = {"type": "json_object"}`
    JsonObject,
    /// No `response_format`; the prompt alone asks for JSON
    Text,
}

impl FormatMode {
    /// Next looser mode, if any
    pub fn looser(self) -> Option<Self> {
        match self {
            Self::JsonSchema => Some(Self::JsonObject),
            Self::JsonObject => Some(Self::Text),
            Self::Text => None,
        }
    }

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonSchema => "json_schema",
            Self::JsonObject => "json_object",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json_schema" | "schema" => Ok(Self::JsonSchema),
            "json_object" | "json" => Ok(Self::JsonObject),
            "text" | "none" => Ok(Self::Text),
            other => Err(format!("unknown response format '{other}'")),
        }
    }
}

/// Why an attempt in one mode did not produce a verdict
#[derive(Debug)]
pub enum AttemptFailure {
    /// The provider refused the request shape (HTTP 400/422)
    Rejected(LLMError),
    /// The reply could not be parsed or failed validation
    InvalidReply(String),
    /// Network, auth, rate-limit or server failure
    Transport(LLMError),
}

impl AttemptFailure {
    /// Classify a provider error
    pub fn from_provider(err: LLMError) -> Self {
        if err.is_rejection() {
            Self::Rejected(err)
        } else if err.is_malformed_response() {
            Self::InvalidReply(err.to_string())
        } else {
            Self::Transport(err)
        }
    }

    /// Whether a looser mode is worth trying
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(e) => write!(f, "request rejected: {e}"),
            Self::InvalidReply(reason) => write!(f, "invalid reply: {reason}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// Ordered modes to try: the configured one, then at most one fallback
pub fn plan(configured: FormatMode) -> Vec<FormatMode> {
    std::iter::once(configured).chain(configured.looser()).collect()
}

/// JSON schema of the expected reply
pub fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "score": {
                "type": "number",
                "minimum": SCORE_MIN,
                "maximum": SCORE_MAX,
                "description": "Overall score from 0 to 100, 50 is neutral"
            },
            "comment": {
                "type": "string",
                "description": "Short commentary on every indicator provided"
            }
        },
        "required": ["score", "comment"]
    })
}

/// `response_format` parameter for a mode
pub fn response_format(mode: FormatMode, schema_name: Option<&str>) -> Option<ResponseFormat> {
    match mode {
        FormatMode::JsonSchema => Some(ResponseFormat::json_schema(
            schema_name.map(str::to_string),
            verdict_schema(),
            None,
        )),
        FormatMode::JsonObject => Some(ResponseFormat::JsonObject),
        FormatMode::Text => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_has_one_fallback() {
        assert_eq!(plan(FormatMode::JsonSchema), vec![FormatMode::JsonSchema, FormatMode::JsonObject]);
        assert_eq!(plan(FormatMode::JsonObject), vec![FormatMode::JsonObject, FormatMode::Text]);
        assert_eq!(plan(FormatMode::Text), vec![FormatMode::Text]);
    }

    #[test]
    fn test_response_format_shapes() {
        let schema = serde_json::to_value(response_format(FormatMode::JsonSchema, None)).unwrap();
        assert_eq!(schema["type"], "json_schema");
        assert_eq!(schema["json_schema"]["schema"]["required"][0], "score");
        assert!(schema["json_schema"].get("name").is_none());

        let object = serde_json::to_value(response_format(FormatMode::JsonObject, None)).unwrap();
        assert_eq!(object, json!({"type": "json_object"}));

        assert!(response_format(FormatMode::Text, Some("verdict")).is_none());
    }

    #[test]
    fn test_failure_classification() {
        let rejected = AttemptFailure::from_provider(LLMError::from_status(400, "response_format not supported".into(), "m"));
        assert!(matches!(rejected, AttemptFailure::Rejected(_)));
        assert!(rejected.allows_fallback());

        let throttled = AttemptFailure::from_provider(LLMError::from_status(429, String::new(), "m"));
        assert!(!throttled.allows_fallback());

        let down = AttemptFailure::from_provider(LLMError::from_status(503, String::new(), "m"));
        assert!(!down.allows_fallback());

        let garbled = AttemptFailure::from_provider(LLMError::UnexpectedResponse("no choices".into()));
        assert!(garbled.allows_fallback());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("json_object".parse::<FormatMode>(), Ok(FormatMode::JsonObject));
        assert_eq!(FormatMode::JsonSchema.to_string(), "json_schema");
        assert!("xml".parse::<FormatMode>().is_err());
    }
}
