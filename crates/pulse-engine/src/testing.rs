//! Test doubles shared by unit tests

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use pulse_llm::{CompletionRequest, CompletionResponse, LLMError, LLMProvider, Message, StopReason, TokenUsage};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::error::{PulseError, Result};
use crate::market::{MarketDataSource, RawRecord};
use crate::model::{Bar, BarSeries, Instrument, QuoteSnapshot};
use crate::signals::{SignalBundle, SignalEngine};

/// LLM provider replaying scripted replies and recording requests
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<std::result::Result<String, LLMError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<std::result::Result<String, LLMError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> pulse_llm::Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::RequestFailed("script exhausted".to_string())))?;

        Ok(CompletionResponse {
            message: Message::assistant(reply),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn object(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Eastmoney-style quote record
pub fn raw_quote(last: f64, prev_close: f64, volume: f64) -> RawRecord {
    object(json!({
        "最新价": last,
        "今开": prev_close,
        "最高": last.max(prev_close),
        "最低": last.min(prev_close),
        "成交量": volume,
        "昨收": prev_close,
    }))
}

/// Eastmoney-style k-line rows with constant volume
pub fn raw_history(closes: &[f64], volume: f64) -> Vec<RawRecord> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            object(json!({
                "日期": (start + Duration::days(i as i64)).format("%Y-%m-%d").to_string(),
                "开盘": close.to_string(),
                "收盘": close.to_string(),
                "最高": close.to_string(),
                "最低": close.to_string(),
                "成交量": volume.to_string(),
            }))
        })
        .collect()
}

/// Market data source serving canned records per code
#[derive(Default)]
pub struct CannedSource {
    quotes: HashMap<String, RawRecord>,
    histories: HashMap<String, Vec<RawRecord>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl CannedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a quote and history for `code`
    pub fn with(mut self, code: &str, quote: RawRecord, history: Vec<RawRecord>) -> Self {
        self.quotes.insert(code.to_string(), quote);
        self.histories.insert(code.to_string(), history);
        self
    }

    /// Fail every request for `code` with a transient error
    pub fn failing(mut self, code: &str) -> Self {
        self.failing.insert(code.to_string());
        self
    }

    /// Calls made, as `quote CODE` / `history CODE`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MarketDataSource for CannedSource {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn fetch_quote(&self, code: &str) -> Result<RawRecord> {
        self.record(format!("quote {code}"));
        if self.failing.contains(code) {
            return Err(PulseError::SourceError("connection reset by peer".to_string()));
        }
        self.quotes
            .get(code)
            .cloned()
            .ok_or_else(|| PulseError::InvalidSymbol(code.to_string()))
    }

    async fn fetch_history(&self, code: &str, _lookback_days: usize) -> Result<Vec<RawRecord>> {
        self.record(format!("history {code}"));
        if self.failing.contains(code) {
            return Err(PulseError::SourceError("connection reset by peer".to_string()));
        }
        self.histories
            .get(code)
            .cloned()
            .ok_or_else(|| PulseError::InvalidSymbol(code.to_string()))
    }
}

/// An ETF with 25 rising bars and an anomalous session
pub fn sample_signals() -> (Instrument, SignalBundle) {
    let instrument = Instrument::etf("510300", "沪深300ETF");
    let quote = QuoteSnapshot {
        code: "510300".to_string(),
        timestamp: Utc::now(),
        last: 4.2,
        open: 4.0,
        high: 4.25,
        low: 3.98,
        volume: 3_000_000.0,
        prev_close: 4.0,
    };
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let bars = (0..25)
        .map(|i| {
            let close = 3.5 + f64::from(i) * 0.02;
            Bar {
                date: start + Duration::days(i64::from(i)),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect();
    let signals = SignalEngine::default()
        .compute(&quote, &BarSeries::new("510300", bars))
        .unwrap();
    (instrument, signals)
}
