//! Prompt construction
//!
//! The system prompt is a bilingual MiniJinja template. The user message is
//! the instrument's signals serialized as JSON, so every number reaches the
//! model exactly as computed.

use minijinja::{Environment, context};
use serde::Serialize;

use super::negotiation::{FormatMode, verdict_schema};
use super::verdict::{SCORE_MAX, SCORE_MIN};
use crate::config::Language;
use crate::error::{PulseError, Result};
use crate::model::{Instrument, InstrumentKind};
use crate::signals::{SignalBundle, TechnicalContext, Trend};

const SYSTEM_ZH: &str = r"你是一个专业的金融数据分析工具。请基于用户提供的JSON数据，客观地总结{{ kind_label }}的状态。
数据中的所有数值均已由程序计算完成，请直接引用，不要重新推算或编造数据。

请结合以下信息进行分析：
- 价格相对{{ ma_window }}日均线的趋势方向
- 相对成交量（当前成交量 / 近期平均成交量）及放量异常标记
- 日内涨跌幅及异常标记
- 均线排列形态（5/10/20/60日，多头/空头/纠缠）、MACD、布林带位置（如有）
{% if low_confidence %}- 注意：历史数据不足，部分指标置信度较低
{% endif %}
综合这些信息，给出一个{{ score_min }}到{{ score_max }}的综合评分（50为中性），并对每一个指标给出简短点评。
请严格以JSON格式返回，只包含'score'（数字）和'comment'（字符串）两个键，不要输出其他内容。
{% if inline_schema %}
返回内容必须符合以下JSON Schema：
{{ inline_schema }}
{% endif %}";

const SYSTEM_EN: &str = r"You are a professional financial data analysis tool. Based on the JSON data provided by the user, objectively summarize the state of this {{ kind_label }}.
Every number in the data has already been computed. Quote the values as given; do not recompute or invent figures.

Consider:
- the trend of the price against its {{ ma_window }}-day moving average
- relative volume (current volume / trailing average volume) and its anomaly flag
- the intraday move and its anomaly flag
- the 5/10/20/60-day moving-average alignment, MACD and Bollinger position when present
{% if low_confidence %}- note: history is short, some indicators are low-confidence
{% endif %}
Give an overall score from {{ score_min }} to {{ score_max }} (50 is neutral) and a brief comment on every indicator.
Reply with JSON only, containing exactly two keys: 'score' (number) and 'comment' (string).
{% if inline_schema %}
The reply must satisfy this JSON Schema:
{{ inline_schema }}
{% endif %}";

/// Everything the model sees about one instrument
#[derive(Debug, Serialize)]
pub struct PromptPayload<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub kind: InstrumentKind,
    pub last_price: f64,
    pub prev_close: f64,
    pub volume: f64,
    pub intraday_move_pct: f64,
    pub trend: Trend,
    pub reference_close: f64,
    pub moving_average: Option<f64>,
    pub ma_window: usize,
    pub bars_used: usize,
    pub average_volume: Option<f64>,
    pub relative_volume: Option<f64>,
    pub volume_anomaly: bool,
    pub move_anomaly: bool,
    pub low_confidence: bool,
    pub technical: &'a TechnicalContext,
}

impl<'a> PromptPayload<'a> {
    /// Collect the payload
    pub fn new(instrument: &'a Instrument, signals: &'a SignalBundle) -> Self {
        Self {
            code: &instrument.code,
            name: &instrument.name,
            kind: instrument.kind,
            last_price: signals.last_price,
            prev_close: signals.prev_close,
            volume: signals.volume,
            intraday_move_pct: signals.intraday_move_pct,
            trend: signals.trend,
            reference_close: signals.reference_close,
            moving_average: signals.moving_average,
            ma_window: signals.ma_window,
            bars_used: signals.bars_used,
            average_volume: signals.average_volume,
            relative_volume: signals.relative_volume,
            volume_anomaly: signals.volume_anomaly,
            move_anomaly: signals.move_anomaly,
            low_confidence: signals.low_confidence,
            technical: &signals.technical,
        }
    }
}

/// Renders system and user prompts
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    language: Language,
}

impl PromptBuilder {
    /// Create a builder for a language
    pub fn new(language: Language) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system.zh", SYSTEM_ZH).map_err(template_error)?;
        env.add_template("system.en", SYSTEM_EN).map_err(template_error)?;
        Ok(Self { env, language })
    }

    /// System prompt; in text mode the schema is spelled out in the prompt
    pub fn system(&self, kind: InstrumentKind, signals: &SignalBundle, mode: FormatMode) -> Result<String> {
        let name = format!("system.{}", self.language.code());
        let kind_label = match (self.language, kind) {
            (Language::Chinese, InstrumentKind::Etf) => "ETF",
            (Language::Chinese, InstrumentKind::Stock) => "股票",
            (Language::English, InstrumentKind::Etf) => "ETF",
            (Language::English, InstrumentKind::Stock) => "stock",
        };
        let inline_schema = match mode {
            FormatMode::Text => Some(verdict_schema().to_string()),
            FormatMode::JsonSchema | FormatMode::JsonObject => None,
        };

        self.env
            .get_template(&name)
            .and_then(|t| {
                t.render(context! {
                    kind_label,
                    ma_window => signals.ma_window,
                    low_confidence => signals.low_confidence,
                    score_min => SCORE_MIN as i64,
                    score_max => SCORE_MAX as i64,
                    inline_schema,
                })
            })
            .map_err(template_error)
    }

    /// User message: the payload as pretty JSON
    pub fn user(&self, payload: &PromptPayload<'_>) -> Result<String> {
        Ok(serde_json::to_string_pretty(payload)?)
    }
}

fn template_error(err: minijinja::Error) -> PulseError {
    PulseError::ConfigError(format!("prompt template: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalEngine;
    use crate::model::{Bar, BarSeries, QuoteSnapshot};
    use chrono::{NaiveDate, Utc};

    fn fixture() -> (Instrument, SignalBundle) {
        let instrument = Instrument::etf("510300", "沪深300ETF");
        let quote = QuoteSnapshot {
            code: "510300".to_string(),
            timestamp: Utc::now(),
            last: 4.0,
            open: 3.91,
            high: 4.05,
            low: 3.9,
            volume: 2_468_000.0,
            prev_close: 3.8,
        };
        let bars = (1..=10)
            .map(|d| Bar {
                date: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
                open: 3.8,
                high: 3.9,
                low: 3.7,
                close: 3.8 + f64::from(d) * 0.01,
                volume: 1_000_000.0,
            })
            .collect();
        let signals = SignalEngine::default()
            .compute(&quote, &BarSeries::new("510300", bars))
            .unwrap();
        (instrument, signals)
    }

    #[test]
    fn test_payload_carries_every_signal_verbatim() {
        let (instrument, signals) = fixture();
        let builder = PromptBuilder::new(Language::Chinese).unwrap();
        let user = builder.user(&PromptPayload::new(&instrument, &signals)).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&user).unwrap();
        assert_eq!(parsed["intraday_move_pct"].as_f64(), Some(signals.intraday_move_pct));
        assert_eq!(parsed["relative_volume"].as_f64(), signals.relative_volume);
        assert_eq!(parsed["moving_average"].as_f64(), signals.moving_average);
        assert_eq!(parsed["volume_anomaly"], true);
        assert_eq!(parsed["move_anomaly"], true);
        assert_eq!(parsed["low_confidence"], true);
        assert_eq!(parsed["trend"], "up");
        assert_eq!(parsed["name"], "沪深300ETF");
    }

    #[test]
    fn test_system_prompt_languages() {
        let (_, signals) = fixture();

        let zh = PromptBuilder::new(Language::Chinese).unwrap();
        let text = zh.system(InstrumentKind::Etf, &signals, FormatMode::JsonSchema).unwrap();
        assert!(text.contains("20日均线"));
        assert!(text.contains("置信度较低"));
        assert!(!text.contains("JSON Schema："));

        let en = PromptBuilder::new(Language::English).unwrap();
        let text = en.system(InstrumentKind::Stock, &signals, FormatMode::Text).unwrap();
        assert!(text.contains("this stock"));
        assert!(text.contains("\"required\""));
    }
}
