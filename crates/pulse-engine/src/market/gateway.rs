//! Market data gateway
//!
//! Cache lookup, then a paced, retried, time-limited provider call, then
//! normalization into typed entities. Exhausted retries surface as
//! [`PulseError::DataUnavailable`] for that instrument only.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use super::normalize::{quote_from_record, series_from_records};
use super::source::MarketDataSource;
use crate::cache::{CacheKey, CachedData, MarketCache};
use crate::error::{PulseError, Result};
use crate::model::{BarSeries, Instrument, QuoteSnapshot};
use crate::retry::RetryPolicy;
use crate::scheduler::RequestScheduler;

/// Typed, cached access to one market data source
pub struct MarketGateway {
    source: Arc<dyn MarketDataSource>,
    cache: MarketCache,
    scheduler: Arc<RequestScheduler>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl MarketGateway {
    /// Create a gateway with the default retry policy and a 30s request timeout
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        cache: MarketCache,
        scheduler: Arc<RequestScheduler>,
    ) -> Self {
        Self {
            source,
            cache,
            scheduler,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Shared cache handle
    pub fn cache(&self) -> &MarketCache {
        &self.cache
    }

    async fn with_timeout<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PulseError::Timeout {
                operation: operation.to_string(),
                seconds: self.request_timeout.as_secs(),
            }),
        }
    }

    fn unavailable(&self, instrument: &Instrument, what: &str, err: &PulseError) -> PulseError {
        error!(
            code = %instrument.code,
            source = self.source.name(),
            kind = err.kind(),
            "{what} unavailable: {err}"
        );
        PulseError::DataUnavailable {
            symbol: instrument.code.clone(),
            reason: format!("{what}: {err}"),
        }
    }

    /// Current quote for an instrument
    #[instrument(skip(self, instrument), fields(code = %instrument.code))]
    pub async fn get_quote(&self, instrument: &Instrument) -> Result<QuoteSnapshot> {
        let code = instrument.code.as_str();
        if let Some(quote) = self.cache.get_quote(code).await {
            return Ok(quote);
        }

        let op = format!("quote {code}");
        let op = op.as_str();
        let fetched = self
            .retry
            .execute(op, move || async move {
                let raw = self
                    .scheduler
                    .run(op, || self.with_timeout(op, self.source.fetch_quote(code)))
                    .await?;
                quote_from_record(code, &raw, Utc::now())
            })
            .await;

        match fetched {
            Ok(quote) => {
                info!(last = quote.last, "quote fetched");
                self.cache
                    .insert(CacheKey::quote(code), CachedData::Quote(quote.clone()))
                    .await;
                Ok(quote)
            }
            Err(e) => Err(self.unavailable(instrument, "quote", &e)),
        }
    }

    /// Up to `lookback_days` daily bars for an instrument
    #[instrument(skip(self, instrument), fields(code = %instrument.code))]
    pub async fn get_history(&self, instrument: &Instrument, lookback_days: usize) -> Result<BarSeries> {
        let code = instrument.code.as_str();
        if let Some(series) = self.cache.get_history(code, lookback_days).await {
            return Ok(series);
        }

        let op = format!("history {code}");
        let op = op.as_str();
        let fetched = self
            .retry
            .execute(op, move || async move {
                let rows = self
                    .scheduler
                    .run(op, || {
                        self.with_timeout(op, self.source.fetch_history(code, lookback_days))
                    })
                    .await?;
                series_from_records(code, &rows)
            })
            .await;

        match fetched {
            Ok(series) => {
                info!(bars = series.len(), "history fetched");
                self.cache
                    .insert(
                        CacheKey::history(code, lookback_days),
                        CachedData::History(series.clone()),
                    )
                    .await;
                Ok(series)
            }
            Err(e) => Err(self.unavailable(instrument, "history", &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::market::source::{MockMarketDataSource, RawRecord};
    use async_trait::async_trait;
    use serde_json::json;

    fn quote_record() -> RawRecord {
        match json!({"最新价": 3.95, "今开": 3.9, "最高": 3.97, "最低": 3.88, "成交量": 1000, "昨收": 3.9}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn gateway(source: impl MarketDataSource + 'static, clock: Arc<ManualClock>) -> MarketGateway {
        MarketGateway::new(
            Arc::new(source),
            MarketCache::with_clock(Duration::from_secs(60), clock),
            Arc::new(RequestScheduler::immediate()),
        )
        .with_retry(RetryPolicy::fast())
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc::now()))
    }

    #[tokio::test]
    async fn test_quote_cached_within_ttl() {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch_quote()
            .times(2)
            .returning(|_| Ok(quote_record()));

        let clock = clock();
        let gateway = gateway(source, clock.clone());
        let etf = Instrument::etf("510300", "沪深300ETF");

        gateway.get_quote(&etf).await.unwrap();
        clock.advance(Duration::from_secs(30));
        gateway.get_quote(&etf).await.unwrap();

        // Expired: a second provider call is made
        clock.advance(Duration::from_secs(31));
        let quote = gateway.get_quote(&etf).await.unwrap();
        assert_eq!(quote.last, 3.95);
    }

    #[tokio::test]
    async fn test_retries_exhausted_become_data_unavailable() {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch_quote()
            .times(3)
            .returning(|_| Err(PulseError::SourceError("connection reset".to_string())));

        let gateway = gateway(source, clock());
        let err = gateway
            .get_quote(&Instrument::etf("510300", "沪深300ETF"))
            .await
            .unwrap_err();

        assert!(matches!(err, PulseError::DataUnavailable { ref symbol, .. } if symbol == "510300"));
        assert!(gateway.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_payload_retried() {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        let mut calls = 0;
        source.expect_fetch_quote().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 { Ok(RawRecord::new()) } else { Ok(quote_record()) }
        });

        let gateway = gateway(source, clock());
        let quote = gateway.get_quote(&Instrument::etf("510300", "x")).await.unwrap();
        assert_eq!(quote.prev_close, 3.9);
    }

    #[tokio::test]
    async fn test_invalid_symbol_not_retried() {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch_history()
            .times(1)
            .returning(|code, _| Err(PulseError::InvalidSymbol(code.to_string())));

        let gateway = gateway(source, clock());
        let err = gateway
            .get_history(&Instrument::stock("999999", "nope"), 60)
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_localized_history_normalized() {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch_history().times(1).returning(|_, _| {
            Ok(vec![
                json!({"日期": "2024-06-04", "开盘": "3.85", "收盘": "3.95", "最高": "3.99", "最低": "3.80", "成交量": "1500"}),
                json!({"日期": "2024-06-03", "开盘": "3.80", "收盘": "3.85", "最高": "3.90", "最低": "3.70", "成交量": "1000"}),
            ]
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect())
        });

        let gateway = gateway(source, clock());
        let etf = Instrument::etf("510300", "沪深300ETF");
        let series = gateway.get_history(&etf, 60).await.unwrap();
        assert_eq!(series.closes(), vec![3.85, 3.95]);

        // Served from cache, no second provider call
        let again = gateway.get_history(&etf, 60).await.unwrap();
        assert_eq!(again, series);
    }

    struct SlowSource;

    #[async_trait]
    impl MarketDataSource for SlowSource {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch_quote(&self, _code: &str) -> Result<RawRecord> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(quote_record())
        }

        async fn fetch_history(&self, _code: &str, _lookback_days: usize) -> Result<Vec<RawRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient_and_bounded() {
        let gateway = gateway(SlowSource, clock()).with_request_timeout(Duration::from_millis(20));
        let started = std::time::Instant::now();
        let err = gateway.get_quote(&Instrument::etf("510300", "x")).await.unwrap_err();

        assert!(matches!(err, PulseError::DataUnavailable { ref reason, .. } if reason.contains("timed out")));
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
