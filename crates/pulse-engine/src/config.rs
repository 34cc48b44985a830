//! Configuration for the analysis pipeline

use crate::analyzer::FormatMode;
use crate::error::{PulseError, Result};
use pulse_utils::{env_optional, env_parse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Market data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// Eastmoney quote and k-line endpoints (A-share codes, default)
    #[default]
    Eastmoney,
    /// Yahoo Finance (international tickers)
    Yahoo,
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eastmoney" | "em" | "akshare" => Ok(Self::Eastmoney),
            "yahoo" => Ok(Self::Yahoo),
            other => Err(format!("unknown data source '{other}'")),
        }
    }
}

/// Language of prompts and report labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    /// Simplified Chinese
    #[default]
    Chinese,
    /// English
    English,
}

impl Language {
    /// ISO 639-1 code
    pub fn code(self) -> &'static str {
        match self {
            Self::Chinese => "zh",
            Self::English => "en",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "chinese" | "中文" | "zh-cn" | "zh-hans" => Ok(Self::Chinese),
            "en" | "english" => Ok(Self::English),
            other => Err(format!("unsupported language '{other}'")),
        }
    }
}

/// LLM provider settings
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Base URL of the OpenAI-compatible API
    pub api_base: String,
    /// API key
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Structured-output mode requested first
    pub response_format: FormatMode,
    /// Schema name sent with `json_schema` requests; some providers reject a name
    pub schema_name: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: String::new(),
            response_format: FormatMode::JsonSchema,
            schema_name: None,
            timeout: Duration::from_secs(120),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("response_format", &self.response_format)
            .field("schema_name", &self.schema_name)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl LlmSettings {
    /// Require base URL, key and model
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("LLM_API_BASE", &self.api_base),
            ("LLM_API_KEY", &self.api_key),
            ("LLM_MODEL_NAME", &self.model),
        ] {
            if value.trim().is_empty() {
                return Err(PulseError::ConfigError(format!("{key} is not set")));
            }
        }
        if self.timeout.is_zero() {
            return Err(PulseError::ConfigError("LLM timeout must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Thresholds and windows of the signal engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    /// Moving-average window in bars
    pub ma_window: usize,
    /// Trailing window for the average volume baseline
    pub volume_window: usize,
    /// Relative volume at or above which the volume anomaly flag is set
    pub relative_volume_threshold: f64,
    /// Absolute intraday move (percent) at or above which the move anomaly flag is set
    pub intraday_move_threshold_pct: f64,
    /// Relative distance from the moving average treated as flat
    pub trend_epsilon: f64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            ma_window: 20,
            volume_window: 20,
            relative_volume_threshold: 2.0,
            intraday_move_threshold_pct: 5.0,
            trend_epsilon: 0.001,
        }
    }
}

impl SignalSettings {
    /// Reject zero windows and non-positive thresholds
    pub fn validate(&self) -> Result<()> {
        if self.ma_window == 0 || self.volume_window == 0 {
            return Err(PulseError::ConfigError(
                "signal windows must be greater than 0".to_string(),
            ));
        }
        if self.relative_volume_threshold <= 0.0 || self.intraday_move_threshold_pct <= 0.0 {
            return Err(PulseError::ConfigError(
                "anomaly thresholds must be positive".to_string(),
            ));
        }
        if self.trend_epsilon < 0.0 {
            return Err(PulseError::ConfigError(
                "trend epsilon must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry and pacing settings for outbound calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingSettings {
    /// Lower bound of the random delay between serialized calls
    pub jitter_min: Duration,
    /// Upper bound of the random delay between serialized calls
    pub jitter_max: Duration,
    /// Attempts per market data request (first try included)
    pub max_attempts: u32,
    /// Base backoff between attempts
    pub retry_backoff: Duration,
    /// Deadline for each market data request
    pub request_timeout: Duration,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            jitter_min: Duration::from_millis(1000),
            jitter_max: Duration::from_millis(2500),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PacingSettings {
    /// Validate the retry and jitter bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(PulseError::ConfigError(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.jitter_min > self.jitter_max {
            return Err(PulseError::ConfigError(format!(
                "jitter_min ({:?}) exceeds jitter_max ({:?})",
                self.jitter_min, self.jitter_max
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(PulseError::ConfigError(
                "request_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Market data provider
    pub data_source: DataSourceKind,
    /// How long fetched market data stays valid
    pub cache_ttl: Duration,
    /// Daily bars requested per instrument
    pub history_days: usize,
    /// Prompt and report language
    pub language: Language,
    /// LLM provider settings
    pub llm: LlmSettings,
    /// Signal engine settings
    pub signals: SignalSettings,
    /// Retry and pacing settings
    pub pacing: PacingSettings,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            data_source: DataSourceKind::Eastmoney,
            cache_ttl: Duration::from_secs(60),
            history_days: 120,
            language: Language::Chinese,
            llm: LlmSettings::default(),
            signals: SignalSettings::default(),
            pacing: PacingSettings::default(),
        }
    }
}

impl PulseConfig {
    /// Create a new configuration builder
    pub fn builder() -> PulseConfigBuilder {
        PulseConfigBuilder::default()
    }

    /// Load configuration from the environment (after merging `.env`)
    ///
    /// LLM settings are read but not required here; [`LlmSettings::validate`]
    /// is enforced when an analyzer is constructed.
    pub fn from_env() -> Result<Self> {
        pulse_utils::load_dotenv(None);

        let defaults = Self::default();
        let mut llm = LlmSettings {
            api_base: env_optional("LLM_API_BASE").unwrap_or_default(),
            api_key: env_optional("LLM_API_KEY").unwrap_or_default(),
            model: env_optional("LLM_MODEL_NAME").unwrap_or_default(),
            schema_name: env_optional("LLM_SCHEMA_NAME"),
            ..LlmSettings::default()
        };
        if let Some(mode) = env_parse::<FormatMode>("LLM_RESPONSE_FORMAT")? {
            llm.response_format = mode;
        }
        if let Some(secs) = env_parse::<u64>("LLM_TIMEOUT_SECS")? {
            llm.timeout = Duration::from_secs(secs);
        }

        let mut pacing = PacingSettings::default();
        if let Some(n) = env_parse::<u32>("PULSE_MAX_ATTEMPTS")? {
            pacing.max_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>("PULSE_RETRY_BACKOFF_MS")? {
            pacing.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_JITTER_MIN_MS")? {
            pacing.jitter_min = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_JITTER_MAX_MS")? {
            pacing.jitter_max = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("PULSE_REQUEST_TIMEOUT_SECS")? {
            pacing.request_timeout = Duration::from_secs(secs);
        }

        let config = Self {
            data_source: env_parse("PULSE_DATA_SOURCE")?.unwrap_or(defaults.data_source),
            cache_ttl: env_parse::<u64>("CACHE_EXPIRE_SECONDS")?
                .map_or(defaults.cache_ttl, Duration::from_secs),
            history_days: env_parse("PULSE_HISTORY_DAYS")?.unwrap_or(defaults.history_days),
            language: env_parse("PULSE_LANGUAGE")?.unwrap_or(defaults.language),
            llm,
            signals: defaults.signals,
            pacing,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate everything except the LLM credentials
    pub fn validate(&self) -> Result<()> {
        if self.history_days == 0 {
            return Err(PulseError::ConfigError(
                "history_days must be greater than 0".to_string(),
            ));
        }
        self.signals.validate()?;
        self.pacing.validate()
    }
}

/// Builder for PulseConfig
#[derive(Debug, Default)]
pub struct PulseConfigBuilder {
    data_source: Option<DataSourceKind>,
    cache_ttl: Option<Duration>,
    history_days: Option<usize>,
    language: Option<Language>,
    llm: Option<LlmSettings>,
    signals: Option<SignalSettings>,
    pacing: Option<PacingSettings>,
}

impl PulseConfigBuilder {
    /// Set the market data provider
    pub fn data_source(mut self, source: DataSourceKind) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Set the cache TTL
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Set the number of daily bars fetched per instrument
    pub fn history_days(mut self, days: usize) -> Self {
        self.history_days = Some(days);
        self
    }

    /// Set the prompt and report language
    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Set the LLM settings
    pub fn llm(mut self, llm: LlmSettings) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the signal settings
    pub fn signals(mut self, signals: SignalSettings) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Set the pacing settings
    pub fn pacing(mut self, pacing: PacingSettings) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PulseConfig> {
        let defaults = PulseConfig::default();

        let config = PulseConfig {
            data_source: self.data_source.unwrap_or(defaults.data_source),
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            history_days: self.history_days.unwrap_or(defaults.history_days),
            language: self.language.unwrap_or(defaults.language),
            llm: self.llm.unwrap_or(defaults.llm),
            signals: self.signals.unwrap_or(defaults.signals),
            pacing: self.pacing.unwrap_or(defaults.pacing),
        };

        config.validate()?;
        Ok(config)
    }
}
