//! Yahoo Finance market data source

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::instrument;
use yahoo_finance_api as yahoo;

use super::source::{MarketDataSource, RawRecord};
use crate::error::{PulseError, Result};

/// Yahoo Finance client for international tickers
#[derive(Debug, Default, Clone)]
pub struct YahooSource {}

fn source_error(e: impl std::fmt::Display) -> PulseError {
    PulseError::SourceError(format!("Yahoo Finance: {e}"))
}

fn bar_record(quote: &yahoo::Quote) -> RawRecord {
    let date = DateTime::from_timestamp(quote.timestamp as i64, 0)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string();

    let mut record = RawRecord::new();
    record.insert("Date".to_string(), Value::String(date));
    record.insert("Open".to_string(), json!(quote.open));
    record.insert("High".to_string(), json!(quote.high));
    record.insert("Low".to_string(), json!(quote.low));
    record.insert("Close".to_string(), json!(quote.close));
    record.insert("Volume".to_string(), json!(quote.volume));
    record
}

/// Start of a calendar window wide enough to hold `lookback_days` trading
/// sessions ending at `end`
fn history_start(end: DateTime<Utc>, lookback_days: usize) -> Result<DateTime<Utc>> {
    let out_of_range = || PulseError::ConfigError(format!("lookback of {lookback_days} days out of range"));
    let days = i64::try_from(lookback_days)
        .ok()
        .and_then(|days| days.checked_mul(7))
        .and_then(|days| (days / 5).checked_add(7))
        .ok_or_else(out_of_range)?;
    chrono::Duration::try_days(days)
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(out_of_range)
}

impl YahooSource {
    /// Create a new Yahoo Finance source
    pub fn new() -> Self {
        Self {}
    }

    fn connector() -> Result<yahoo::YahooConnector> {
        yahoo::YahooConnector::new().map_err(source_error)
    }
}

#[async_trait]
impl MarketDataSource for YahooSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    #[instrument(skip(self))]
    async fn fetch_quote(&self, code: &str) -> Result<RawRecord> {
        let response = Self::connector()?
            .get_quote_range(code, "1d", "5d")
            .await
            .map_err(source_error)?;
        let quotes = response.quotes().map_err(source_error)?;

        // The last daily bar is today's session; the one before holds the previous close
        let Some(today) = quotes.last() else {
            return Ok(RawRecord::new());
        };
        let mut record = bar_record(today);
        if let Some(prev) = quotes.len().checked_sub(2).and_then(|i| quotes.get(i)) {
            record.insert("PrevClose".to_string(), json!(prev.close));
        }
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn fetch_history(&self, code: &str, lookback_days: usize) -> Result<Vec<RawRecord>> {
        let end = Utc::now();
        let start = history_start(end, lookback_days)?;

        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| source_error(format!("invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| source_error(format!("invalid end timestamp: {e}")))?;

        let response = Self::connector()?
            .get_quote_history(code, start_odt, end_odt)
            .await
            .map_err(source_error)?;
        let quotes = response.quotes().map_err(source_error)?;

        let skip = quotes.len().saturating_sub(lookback_days);
        Ok(quotes.iter().skip(skip).map(bar_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::normalize::{quote_from_record, series_from_records};
    use chrono::TimeZone;

    #[test]
    fn test_history_start_spans_weekends() {
        let end = Utc.with_ymd_and_hms(2024, 6, 28, 8, 0, 0).unwrap();
        // 30 sessions: 30 * 7 / 5 + 7 = 49 calendar days
        let start = history_start(end, 30).unwrap();
        assert_eq!(end - start, chrono::Duration::days(49));
    }

    #[test]
    fn test_history_start_rejects_huge_lookback() {
        let end = Utc.with_ymd_and_hms(2024, 6, 28, 8, 0, 0).unwrap();
        let err = history_start(end, usize::MAX).unwrap_err();
        assert!(matches!(err, PulseError::ConfigError(_)));
        assert!(!err.is_transient());
        assert!(history_start(end, 1_000_000_000).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_get_quote() {
        let source = YahooSource::new();
        let record = source.fetch_quote("AAPL").await.unwrap();
        let quote = quote_from_record("AAPL", &record, Utc::now()).unwrap();
        assert!(quote.last > 0.0);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_get_history() {
        let source = YahooSource::new();
        let rows = source.fetch_history("AAPL", 30).await.unwrap();
        let series = series_from_records("AAPL", &rows).unwrap();
        assert!(series.len() <= 30);
        assert!(!series.is_empty());
    }
}
