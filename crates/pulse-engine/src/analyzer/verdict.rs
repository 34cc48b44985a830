//! LLM verdicts and reply parsing

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

use super::negotiation::FormatMode;
use crate::error::{PulseError, Result};

/// Lowest accepted score
pub const SCORE_MIN: f64 = 0.0;
/// Highest accepted score
pub const SCORE_MAX: f64 = 100.0;

static CODE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*(.*?)\s*```\s*$").ok());

/// Why a verdict is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Market data could not be fetched, so no analysis was attempted
    DataUnavailable,
    /// The LLM provider could not be reached or refused to serve
    Transport,
    /// The LLM replied with something that is not a valid verdict
    Schema,
    /// The run did not ask for LLM analysis
    NotRequested,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataUnavailable => write!(f, "data unavailable"),
            Self::Transport | Self::Schema => write!(f, "analysis unavailable"),
            Self::NotRequested => write!(f, "not requested"),
        }
    }
}

/// Score and commentary for one instrument, or an explicit sentinel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// A validated reply
    Scored {
        score: f64,
        commentary: String,
        /// Response format that produced the reply
        format: FormatMode,
    },
    /// No verdict; never carries a score
    Unavailable {
        reason: UnavailableReason,
        detail: String,
    },
}

impl Verdict {
    /// Sentinel verdict
    pub fn unavailable(reason: UnavailableReason, detail: impl Into<String>) -> Self {
        Self::Unavailable {
            reason,
            detail: detail.into(),
        }
    }

    /// Sentinel for an analysis error
    pub fn from_error(err: &PulseError) -> Self {
        let reason = match err {
            PulseError::LlmSchema(_) => UnavailableReason::Schema,
            PulseError::DataUnavailable { .. } => UnavailableReason::DataUnavailable,
            _ => UnavailableReason::Transport,
        };
        Self::unavailable(reason, err.to_string())
    }

    /// Score, when available
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Scored { score, .. } => Some(*score),
            Self::Unavailable { .. } => None,
        }
    }

    /// Whether this verdict carries a score
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Scored { .. })
    }
}

/// A reply that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub score: f64,
    pub commentary: String,
}

fn schema_error(reason: impl Into<String>) -> PulseError {
    PulseError::LlmSchema(reason.into())
}

/// Strip a surrounding Markdown code fence
fn strip_fence(text: &str) -> &str {
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
}

/// Parse as JSON, or failing that, parse the outermost `{...}` span
fn parse_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn read_score(value: &Value) -> Result<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| schema_error(format!("score is not numeric: {value}")))?;

    if !score.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        return Err(schema_error(format!(
            "score {score} outside [{SCORE_MIN}, {SCORE_MAX}]"
        )));
    }
    Ok(score)
}

/// Parse, repair and validate a model reply
///
/// Accepted repairs: a Markdown fence around the JSON, prose around a single
/// JSON object, a list wrapping the object (first element is used), the
/// commentary under `comment` or `commentary`, and a numeric string score.
/// Anything else is a schema error.
pub fn parse_reply(content: &str) -> Result<ParsedReply> {
    let text = strip_fence(content.trim());
    if text.is_empty() {
        return Err(schema_error("empty reply"));
    }

    let mut value = parse_json(text).ok_or_else(|| schema_error("reply is not JSON"))?;
    if let Value::Array(items) = value {
        value = items
            .into_iter()
            .next()
            .ok_or_else(|| schema_error("reply is an empty list"))?;
    }
    let Value::Object(object) = value else {
        return Err(schema_error("reply is not a JSON object"));
    };

    let score = read_score(
        object
            .get("score")
            .ok_or_else(|| schema_error("reply has no score"))?,
    )?;

    let commentary = object
        .get("comment")
        .or_else(|| object.get("commentary"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| schema_error("reply has no commentary"))?;

    Ok(ParsedReply {
        score,
        commentary: commentary.to_string(),
    })
}
