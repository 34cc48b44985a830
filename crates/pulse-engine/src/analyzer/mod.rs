//! LLM analyzer
//!
//! Sends an instrument's signals to an OpenAI-compatible model and turns the
//! reply into a [`Verdict`]. Requests go through the shared
//! [`RequestScheduler`]; the structured-output dialect is negotiated per
//! [`negotiation::plan`].

pub mod negotiation;
pub mod prompt;
pub mod verdict;

pub use negotiation::{AttemptFailure, FormatMode};
pub use prompt::{PromptBuilder, PromptPayload};
pub use verdict::{ParsedReply, SCORE_MAX, SCORE_MIN, UnavailableReason, Verdict, parse_reply};

use pulse_llm::{CompletionRequest, LLMProvider, Message};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::{Language, LlmSettings};
use crate::error::{PulseError, Result};
use crate::model::Instrument;
use crate::scheduler::RequestScheduler;
use crate::signals::SignalBundle;

/// Scores instruments with an LLM
pub struct LlmAnalyzer {
    provider: Arc<dyn LLMProvider>,
    scheduler: Arc<RequestScheduler>,
    settings: LlmSettings,
    prompts: PromptBuilder,
}

impl LlmAnalyzer {
    /// Create an analyzer
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        scheduler: Arc<RequestScheduler>,
        settings: LlmSettings,
        language: Language,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            scheduler,
            settings,
            prompts: PromptBuilder::new(language)?,
        })
    }

    /// Build an OpenAI-compatible provider from settings
    pub fn openai_provider(settings: &LlmSettings) -> Result<Arc<dyn LLMProvider>> {
        use pulse_llm::providers::{OpenAIConfig, OpenAIProvider};

        settings.validate()?;
        let config = OpenAIConfig::new(settings.api_key.clone())
            .with_api_base(settings.api_base.clone())
            .with_timeout(settings.timeout.as_secs().max(1));
        let provider = OpenAIProvider::with_config(config)
            .map_err(|e| PulseError::ConfigError(e.to_string()))?;
        Ok(Arc::new(provider))
    }

    fn request(&self, instrument: &Instrument, signals: &SignalBundle, mode: FormatMode) -> Result<CompletionRequest> {
        let system = self.prompts.system(instrument.kind, signals, mode)?;
        let user = self.prompts.user(&PromptPayload::new(instrument, signals))?;

        Ok(CompletionRequest::builder(self.settings.model.clone())
            .system(system)
            .add_message(Message::user(user))
            .max_tokens(self.settings.max_tokens)
            .temperature(self.settings.temperature)
            .response_format(negotiation::response_format(
                mode,
                self.settings.schema_name.as_deref(),
            ))
            .build())
    }

    async fn attempt(
        &self,
        instrument: &Instrument,
        signals: &SignalBundle,
        mode: FormatMode,
    ) -> std::result::Result<ParsedReply, AttemptFailure> {
        let request = self
            .request(instrument, signals, mode)
            .map_err(|e| AttemptFailure::InvalidReply(e.to_string()))?;

        let label = format!("llm {}", instrument.code);
        let response = self
            .scheduler
            .run(&label, || self.provider.complete(request))
            .await
            .map_err(AttemptFailure::from_provider)?;

        parse_reply(response.message.text().unwrap_or_default())
            .map_err(|e| AttemptFailure::InvalidReply(e.to_string()))
    }

    /// Score one instrument, negotiating the response format
    ///
    /// Returns a scored verdict with the mode that produced it, or the error
    /// of the last attempt as [`PulseError::LlmSchema`] or
    /// [`PulseError::LlmTransport`].
    pub async fn try_analyze(&self, instrument: &Instrument, signals: &SignalBundle) -> Result<Verdict> {
        let plan = negotiation::plan(self.settings.response_format);
        let mut last_failure = None;

        for (i, mode) in plan.iter().copied().enumerate() {
            match self.attempt(instrument, signals, mode).await {
                Ok(reply) => {
                    info!(code = %instrument.code, score = reply.score, format = %mode, "verdict received");
                    return Ok(Verdict::Scored {
                        score: reply.score,
                        commentary: reply.commentary,
                        format: mode,
                    });
                }
                Err(failure) => {
                    let next = plan.get(i + 1).filter(|_| failure.allows_fallback());
                    if let Some(next) = next {
                        warn!(
                            code = %instrument.code,
                            format = %mode,
                            "{failure}; falling back to {next}"
                        );
                    }
                    last_failure = Some(failure);
                    if next.is_none() {
                        break;
                    }
                }
            }
        }

        Err(match last_failure {
            Some(AttemptFailure::Transport(e)) => PulseError::LlmTransport(e.to_string()),
            Some(failure) => PulseError::LlmSchema(failure.to_string()),
            None => PulseError::LlmSchema("no response format to try".to_string()),
        })
    }

    /// Score one instrument; failures become an unavailable verdict
    #[instrument(skip(self, instrument, signals), fields(code = %instrument.code))]
    pub async fn analyze(&self, instrument: &Instrument, signals: &SignalBundle) -> Verdict {
        match self.try_analyze(instrument, signals).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(kind = e.kind(), "analysis unavailable: {e}");
                Verdict::from_error(&e)
            }
        }
    }
}
