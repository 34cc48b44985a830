//! Report assembly
//!
//! Runs every instrument of a pool through gateway, signal engine and
//! analyzer in declaration order, then ranks the entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::analyzer::{LlmAnalyzer, UnavailableReason, Verdict};
use crate::cache::MarketCache;
use crate::config::PulseConfig;
use crate::error::{PulseError, Result};
use crate::market::{MarketGateway, create_source};
use crate::model::{Instrument, QuoteSnapshot};
use crate::pool::Pool;
use crate::retry::RetryPolicy;
use crate::scheduler::RequestScheduler;
use crate::signals::{SignalBundle, SignalEngine};

/// One row of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub instrument: Instrument,
    /// Quote, when it could be fetched
    pub quote: Option<QuoteSnapshot>,
    /// Signals, when quote and history were both available
    pub signals: Option<SignalBundle>,
    pub verdict: Verdict,
    /// Why market data is missing
    pub data_error: Option<String>,
}

impl ReportEntry {
    fn degraded(instrument: &Instrument, quote: Option<QuoteSnapshot>, err: &PulseError) -> Self {
        Self {
            instrument: instrument.clone(),
            quote,
            signals: None,
            verdict: Verdict::unavailable(UnavailableReason::DataUnavailable, err.to_string()),
            data_error: Some(err.to_string()),
        }
    }

    /// Score, when the verdict carries one
    pub fn score(&self) -> Option<f64> {
        self.verdict.score()
    }

    /// Whether a pipeline stage failed for this entry
    pub fn is_degraded(&self) -> bool {
        self.data_error.is_some()
            || matches!(
                self.verdict,
                Verdict::Unavailable {
                    reason: UnavailableReason::Transport | UnavailableReason::Schema,
                    ..
                }
            )
    }
}

/// Ranked result of one pool run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub pool_name: String,
    pub generated_at: DateTime<Utc>,
    /// Whether the LLM stage ran
    pub analyzed: bool,
    pub entries: Vec<ReportEntry>,
}

impl AnalysisReport {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with a failed stage
    pub fn degraded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_degraded()).count()
    }

    /// Entries in rank order
    pub fn iter(&self) -> std::slice::Iter<'_, ReportEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a AnalysisReport {
    type Item = &'a ReportEntry;
    type IntoIter = std::slice::Iter<'a, ReportEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn by_score_desc(a: &ReportEntry, b: &ReportEntry) -> Ordering {
    match (a.score(), b.score()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort by score descending, unscored entries last, ties in input order
pub fn rank_entries(entries: &mut [ReportEntry]) {
    entries.sort_by(by_score_desc);
}

/// Builds [`AnalysisReport`]s for pools
pub struct ReportAssembler {
    gateway: MarketGateway,
    engine: SignalEngine,
    analyzer: Option<LlmAnalyzer>,
    history_days: usize,
}

impl ReportAssembler {
    /// Create an assembler without an LLM stage
    pub fn new(gateway: MarketGateway, engine: SignalEngine, history_days: usize) -> Self {
        Self {
            gateway,
            engine,
            analyzer: None,
            history_days,
        }
    }

    /// Attach the LLM stage
    pub fn with_analyzer(mut self, analyzer: LlmAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Wire the whole pipeline from configuration
    ///
    /// Gateway and analyzer share one scheduler, so data and LLM calls are
    /// serialized together. `with_llm` requires LLM credentials.
    pub fn from_config(config: &PulseConfig, with_llm: bool) -> Result<Self> {
        config.validate()?;

        let scheduler = Arc::new(RequestScheduler::from_pacing(&config.pacing));
        let gateway = MarketGateway::new(
            create_source(config.data_source)?,
            MarketCache::new(config.cache_ttl),
            scheduler.clone(),
        )
        .with_retry(RetryPolicy::from_pacing(&config.pacing))
        .with_request_timeout(config.pacing.request_timeout);

        let assembler = Self::new(gateway, SignalEngine::new(config.signals.clone()), config.history_days);
        if !with_llm {
            return Ok(assembler);
        }

        let provider = LlmAnalyzer::openai_provider(&config.llm)?;
        let analyzer = LlmAnalyzer::new(provider, scheduler, config.llm.clone(), config.language)?;
        Ok(assembler.with_analyzer(analyzer))
    }

    async fn signals_for(&self, instrument: &Instrument) -> std::result::Result<(QuoteSnapshot, SignalBundle), ReportEntry> {
        let quote = self
            .gateway
            .get_quote(instrument)
            .await
            .map_err(|e| ReportEntry::degraded(instrument, None, &e))?;

        let history = match self.gateway.get_history(instrument, self.history_days).await {
            Ok(history) => history,
            Err(e) => return Err(ReportEntry::degraded(instrument, Some(quote), &e)),
        };

        match self.engine.compute(&quote, &history) {
            Ok(signals) => Ok((quote, signals)),
            Err(e) => {
                warn!(code = %instrument.code, kind = e.kind(), "signals unavailable: {e}");
                Err(ReportEntry::degraded(instrument, Some(quote), &e))
            }
        }
    }

    async fn entry(&self, instrument: &Instrument, analyze: bool) -> ReportEntry {
        let (quote, signals) = match self.signals_for(instrument).await {
            Ok(pair) => pair,
            Err(entry) => return entry,
        };

        let verdict = match (&self.analyzer, analyze) {
            (Some(analyzer), true) => analyzer.analyze(instrument, &signals).await,
            (None, true) => Verdict::unavailable(UnavailableReason::NotRequested, "no LLM analyzer configured"),
            (_, false) => Verdict::unavailable(UnavailableReason::NotRequested, "signals-only run"),
        };

        ReportEntry {
            instrument: instrument.clone(),
            quote: Some(quote),
            signals: Some(signals),
            verdict,
            data_error: None,
        }
    }

    async fn run(&self, pool: &Pool, analyze: bool) -> AnalysisReport {
        let started = Instant::now();
        info!(instruments = pool.len(), analyze, "building report");

        let mut entries = Vec::with_capacity(pool.len());
        for instrument in &pool.instruments {
            entries.push(self.entry(instrument, analyze).await);
        }
        rank_entries(&mut entries);

        let report = AnalysisReport {
            pool_name: pool.name.clone(),
            generated_at: Utc::now(),
            analyzed: analyze && self.analyzer.is_some(),
            entries,
        };
        info!(
            entries = report.len(),
            degraded = report.degraded_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "report ready"
        );
        report
    }

    /// Fetch, compute, analyze and rank every instrument of the pool
    ///
    /// Every instrument yields an entry; failures produce degraded entries.
    #[instrument(skip(self, pool), fields(pool = %pool.name))]
    pub async fn build_report(&self, pool: &Pool) -> AnalysisReport {
        self.run(pool, true).await
    }

    /// Same pipeline without the LLM stage; entries keep pool order
    #[instrument(skip(self, pool), fields(pool = %pool.name))]
    pub async fn build_signal_report(&self, pool: &Pool) -> AnalysisReport {
        self.run(pool, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FormatMode;
    use crate::config::{Language, LlmSettings};
    use crate::testing::{CannedSource, ScriptedProvider, raw_history, raw_quote};
    use pulse_llm::LLMError;
    use std::time::Duration;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 3.0 + i as f64 * 0.01).collect()
    }

    fn assembler(source: Arc<CannedSource>, provider: Option<Arc<ScriptedProvider>>) -> ReportAssembler {
        let scheduler = Arc::new(RequestScheduler::immediate());
        let gateway = MarketGateway::new(source, MarketCache::new(Duration::from_secs(60)), scheduler.clone())
            .with_retry(RetryPolicy::fast());
        let assembler = ReportAssembler::new(gateway, SignalEngine::default(), 60);

        match provider {
            Some(provider) => {
                let settings = LlmSettings {
                    model: "sonar-pro".to_string(),
                    response_format: FormatMode::JsonSchema,
                    ..LlmSettings::default()
                };
                let analyzer = LlmAnalyzer::new(provider, scheduler, settings, Language::Chinese).unwrap();
                assembler.with_analyzer(analyzer)
            }
            None => assembler,
        }
    }

    fn entry(code: &str, verdict: Verdict) -> ReportEntry {
        ReportEntry {
            instrument: Instrument::etf(code, code),
            quote: None,
            signals: None,
            verdict,
            data_error: None,
        }
    }

    fn scored(score: f64) -> Verdict {
        Verdict::Scored {
            score,
            commentary: "ok".into(),
            format: FormatMode::JsonSchema,
        }
    }

    #[test]
    fn test_rank_entries_stable_with_unavailable_last() {
        let mut entries = vec![
            entry("A", Verdict::unavailable(UnavailableReason::Schema, "bad")),
            entry("B", scored(40.0)),
            entry("C", scored(80.0)),
            entry("D", Verdict::unavailable(UnavailableReason::DataUnavailable, "down")),
            entry("E", scored(80.0)),
        ];
        rank_entries(&mut entries);

        let codes: Vec<_> = entries.iter().map(|e| e.instrument.code.as_str()).collect();
        assert_eq!(codes, ["C", "E", "B", "A", "D"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_degraded_entry() {
        let source = Arc::new(
            CannedSource::new()
                .with("510300", raw_quote(3.5, 3.45, 1_000.0), raw_history(&rising(30), 1_000.0))
                .failing("159919"),
        );
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"score": 66, "comment": "温和上行"}"#.to_string(),
        )]));
        let assembler = assembler(source.clone(), Some(provider.clone()));
        let pool = Pool::new(
            "test",
            vec![Instrument::etf("510300", "沪深300ETF"), Instrument::etf("159919", "创业板50ETF")],
        );

        let report = assembler.build_report(&pool).await;

        assert_eq!(report.len(), 2);
        assert!(report.analyzed);
        assert_eq!(report.entries[0].instrument.code, "510300");
        assert_eq!(report.entries[0].score(), Some(66.0));
        assert!(!report.entries[0].is_degraded());

        let failed = &report.entries[1];
        assert_eq!(failed.instrument.code, "159919");
        assert!(failed.score().is_none());
        assert!(failed.data_error.is_some());
        assert!(matches!(
            failed.verdict,
            Verdict::Unavailable { reason: UnavailableReason::DataUnavailable, .. }
        ));
        assert_eq!(report.degraded_count(), 1);

        // No LLM call for the degraded instrument
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_localized_payload_lands_in_canonical_fields() {
        let source = Arc::new(CannedSource::new().with(
            "510300",
            raw_quote(3.92, 3.8, 2_468_000.0),
            raw_history(&rising(25), 1_000_000.0),
        ));
        let assembler = assembler(source, None);
        let pool = Pool::new("test", vec![Instrument::etf("510300", "沪深300ETF")]);

        let report = assembler.build_signal_report(&pool).await;
        let entry = &report.entries[0];
        let quote = entry.quote.as_ref().unwrap();

        assert_eq!(quote.last, 3.92);
        assert_eq!(quote.prev_close, 3.8);
        assert_eq!(quote.open, 3.8);
        assert_eq!(quote.volume, 2_468_000.0);

        let signals = entry.signals.as_ref().unwrap();
        assert!((signals.reference_close - 3.24).abs() < 1e-9);
        assert!(matches!(
            entry.verdict,
            Verdict::Unavailable { reason: UnavailableReason::NotRequested, .. }
        ));
        assert!(!entry.is_degraded());
        assert!(!report.analyzed);
    }

    #[tokio::test]
    async fn test_schema_rejection_recovers_with_json_object() {
        let source = Arc::new(CannedSource::new().with(
            "510300",
            raw_quote(3.5, 3.45, 1_000.0),
            raw_history(&rising(30), 1_000.0),
        ));
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LLMError::from_status(400, "json_schema is not supported".into(), "m")),
            Ok(r#"{"score": 58, "comment": "中性偏多"}"#.to_string()),
        ]));
        let assembler = assembler(source, Some(provider.clone()));
        let pool = Pool::new("test", vec![Instrument::etf("510300", "沪深300ETF")]);

        let report = assembler.build_report(&pool).await;

        assert!(matches!(
            report.entries[0].verdict,
            Verdict::Scored { format: FormatMode::JsonObject, .. }
        ));
        assert_eq!(report.entries[0].score(), Some(58.0));
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_relative_volume_boundary_consistent_across_runs() {
        let source = Arc::new(CannedSource::new().with(
            "510300",
            raw_quote(3.5, 3.5, 2_000.0),
            raw_history(&rising(20), 1_000.0),
        ));
        let assembler = assembler(source.clone(), None);
        let pool = Pool::new("test", vec![Instrument::etf("510300", "沪深300ETF")]);

        let first = assembler.build_signal_report(&pool).await;
        let second = assembler.build_signal_report(&pool).await;

        for report in [&first, &second] {
            let signals = report.entries[0].signals.as_ref().unwrap();
            assert_eq!(signals.relative_volume, Some(2.0));
            assert!(signals.volume_anomaly);
        }
        assert_eq!(first.entries[0].signals, second.entries[0].signals);

        // Second run is served from the cache
        assert_eq!(source.calls(), ["quote 510300", "history 510300"]);
    }

    #[tokio::test]
    async fn test_signal_report_keeps_pool_order() {
        let source = Arc::new(
            CannedSource::new()
                .failing("588000")
                .with("512000", raw_quote(1.0, 1.0, 10.0), raw_history(&rising(20), 10.0))
                .with("518880", raw_quote(5.0, 5.0, 10.0), raw_history(&rising(20), 10.0)),
        );
        let assembler = assembler(source, None);
        let pool = Pool::new(
            "test",
            vec![
                Instrument::etf("588000", "科创50ETF"),
                Instrument::etf("512000", "券商ETF"),
                Instrument::etf("518880", "黄金ETF"),
            ],
        );

        let report = assembler.build_signal_report(&pool).await;
        let codes: Vec<_> = report.iter().map(|e| e.instrument.code.as_str()).collect();
        assert_eq!(codes, ["588000", "512000", "518880"]);
        assert!(report.entries[0].is_degraded());
    }
}
