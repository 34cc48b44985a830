//! Field-name normalization
//!
//! Providers name their columns differently (Eastmoney uses Chinese column
//! names, Yahoo capitalised English). Every alias maps onto one canonical
//! field before any value is read.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;

use super::source::RawRecord;
use crate::error::{PulseError, Result};
use crate::model::{Bar, BarSeries, QuoteSnapshot};

/// Canonical market data fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    Open,
    High,
    Low,
    Close,
    Last,
    Volume,
    PrevClose,
}

impl Field {
    /// Canonical lower-case name
    pub fn canonical(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Last => "last",
            Self::Volume => "volume",
            Self::PrevClose => "prev_close",
        }
    }

    /// Resolve a provider field name
    pub fn from_alias(name: &str) -> Option<Self> {
        Self::resolve(name).map(|(field, _)| field)
    }

    /// Field and preference of an alias; lower ranks are preferred
    fn resolve(name: &str) -> Option<(Self, usize)> {
        let name = name.trim();
        ALIASES.iter().find_map(|(field, aliases)| {
            aliases
                .iter()
                .position(|alias| *alias == name)
                .map(|rank| (*field, rank))
        })
    }
}

/// Provider aliases per field, most preferred first
const ALIASES: &[(Field, &[&str])] = &[
    (Field::Date, &["日期", "date", "Date", "trade_date"]),
    (Field::Open, &["开盘", "今开", "open", "Open"]),
    (Field::High, &["最高", "high", "High"]),
    (Field::Low, &["最低", "low", "Low"]),
    (Field::Close, &["收盘", "close", "Close", "Adj Close"]),
    (Field::Last, &["最新价", "last", "Last", "price", "Price"]),
    (Field::Volume, &["成交量", "volume", "Volume", "vol"]),
    (Field::PrevClose, &["昨收", "prev_close", "PrevClose", "previous_close", "preClose"]),
];

/// A record with canonical keys; unknown provider fields are dropped and
/// placeholder values (`"-"`, empty strings, null) are treated as missing
#[derive(Debug, Clone, Default)]
pub struct NormalizedRecord {
    values: HashMap<Field, Value>,
}

impl NormalizedRecord {
    /// Normalize one provider record
    pub fn from_raw(raw: &RawRecord) -> Self {
        let mut ranked: HashMap<Field, (usize, &Value)> = HashMap::new();
        for (key, value) in raw {
            let Some((field, rank)) = Field::resolve(key) else {
                continue;
            };
            if is_placeholder(value) {
                continue;
            }
            // Several aliases for one field: the most preferred one wins
            match ranked.get(&field) {
                Some((best, _)) if *best <= rank => {}
                _ => {
                    ranked.insert(field, (rank, value));
                }
            }
        }
        let values = ranked
            .into_iter()
            .map(|(field, (_, value))| (field, value.clone()))
            .collect();
        Self { values }
    }

    /// Numeric value of a field; numbers and numeric strings are accepted
    pub fn number(&self, field: Field) -> Option<f64> {
        match self.values.get(&field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    /// Date value of a field
    pub fn date(&self, field: Field) -> Option<NaiveDate> {
        match self.values.get(&field)? {
            Value::String(s) => parse_date(s),
            Value::Number(n) => n
                .as_i64()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.date_naive()),
            _ => None,
        }
    }
}

fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => matches!(s.trim(), "" | "-" | "--" | "N/A"),
        _ => false,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .or_else(|_| NaiveDate::parse_from_str(head, "%Y/%m/%d"))
        .ok()
}

fn malformed(code: &str, reason: impl Into<String>) -> PulseError {
    PulseError::MalformedPayload {
        symbol: code.to_string(),
        reason: reason.into(),
    }
}

/// Coerce a raw quote record into a validated [`QuoteSnapshot`]
///
/// The last price is required; a quote without it falls back to the close
/// column. Missing open/high/low fall back to the last price and missing
/// volume to zero (suspended instruments report `"-"` for these).
pub fn quote_from_record(code: &str, raw: &RawRecord, observed_at: DateTime<Utc>) -> Result<QuoteSnapshot> {
    if raw.is_empty() {
        return Err(malformed(code, "empty quote record"));
    }
    let record = NormalizedRecord::from_raw(raw);

    let last = record
        .number(Field::Last)
        .or_else(|| record.number(Field::Close))
        .ok_or_else(|| malformed(code, "quote has no last price"))?;
    let prev_close = record
        .number(Field::PrevClose)
        .ok_or_else(|| malformed(code, "quote has no previous close"))?;

    let quote = QuoteSnapshot {
        code: code.to_string(),
        timestamp: observed_at,
        last,
        open: record.number(Field::Open).unwrap_or(last),
        high: record.number(Field::High).unwrap_or(last),
        low: record.number(Field::Low).unwrap_or(last),
        volume: record.number(Field::Volume).unwrap_or(0.0),
        prev_close,
    };
    quote.validate()?;
    Ok(quote)
}

/// Coerce raw k-line rows into a [`BarSeries`]
///
/// Rows without a date or close are skipped. A payload with no usable row is
/// malformed.
pub fn series_from_records(code: &str, rows: &[RawRecord]) -> Result<BarSeries> {
    if rows.is_empty() {
        return Err(malformed(code, "empty history payload"));
    }

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let record = NormalizedRecord::from_raw(row);
        let (Some(date), Some(close)) = (record.date(Field::Date), record.number(Field::Close)) else {
            tracing::debug!(code, "skipping history row without date or close");
            continue;
        };
        let bar = Bar {
            date,
            open: record.number(Field::Open).unwrap_or(close),
            high: record.number(Field::High).unwrap_or(close),
            low: record.number(Field::Low).unwrap_or(close),
            close,
            volume: record.number(Field::Volume).unwrap_or(0.0),
        };
        if !close.is_finite() || bar.volume < 0.0 {
            tracing::debug!(code, %date, "skipping invalid history row");
            continue;
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(malformed(code, format!("none of {} history rows usable", rows.len())));
    }
    Ok(BarSeries::new(code, bars))
}
