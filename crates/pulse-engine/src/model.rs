//! Strongly typed market entities
//!
//! Everything the data sources return is coerced into these types at the
//! gateway boundary; nothing downstream sees raw provider records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PulseError, Result};

/// Kind of tradable instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Exchange-traded fund
    Etf,
    /// Single equity (or index tracked like one)
    Stock,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Etf => write!(f, "ETF"),
            Self::Stock => write!(f, "Stock"),
        }
    }
}

/// A watched instrument, identified by its exchange code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange code, e.g. `510300`
    pub code: String,
    /// Display name
    pub name: String,
    /// ETF or stock
    pub kind: InstrumentKind,
}

impl Instrument {
    /// Create a new instrument
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: InstrumentKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }

    /// Create an ETF instrument
    pub fn etf(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(code, name, InstrumentKind::Etf)
    }

    /// Create a stock instrument
    pub fn stock(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(code, name, InstrumentKind::Stock)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// Current quote for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// Instrument code the quote belongs to
    pub code: String,
    /// Time the quote was observed
    pub timestamp: DateTime<Utc>,
    /// Last traded price
    pub last: f64,
    /// Session open
    pub open: f64,
    /// Session high
    pub high: f64,
    /// Session low
    pub low: f64,
    /// Session volume (provider units)
    pub volume: f64,
    /// Previous session close
    pub prev_close: f64,
}

impl QuoteSnapshot {
    /// Check the snapshot invariants: finite prices, `volume >= 0`, `high >= low`
    pub fn validate(&self) -> Result<()> {
        let prices = [self.last, self.open, self.high, self.low, self.prev_close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(self.malformed("non-finite price"));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(self.malformed(&format!("invalid volume {}", self.volume)));
        }
        if self.high < self.low {
            return Err(self.malformed(&format!("high {} below low {}", self.high, self.low)));
        }
        Ok(())
    }

    fn malformed(&self, reason: &str) -> PulseError {
        PulseError::MalformedPayload {
            symbol: self.code.clone(),
            reason: reason.to_string(),
        }
    }
}

/// One daily bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chronologically ordered daily bars without duplicate dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    code: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series, sorting by date and keeping the last bar seen for a
    /// duplicated date
    pub fn new(code: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        // Stable sort keeps provider order among equal dates, so the later row wins below
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(prev) if prev.date == bar.date => *prev = bar,
                _ => deduped.push(bar),
            }
        }

        Self {
            code: code.into(),
            bars: deduped,
        }
    }

    /// Instrument code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// All bars, oldest first
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Number of bars
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether the series has no bars
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Most recent bar
    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Closing prices, oldest first
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Volumes, oldest first
    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}
