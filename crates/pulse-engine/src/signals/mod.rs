//! Signal engine
//!
//! Deterministic indicators computed from a quote and its daily history.
//! No I/O happens here.
//!
//! Threshold comparisons are inclusive: a relative volume of exactly the
//! threshold, or an intraday move of exactly the threshold, raises the flag.

pub mod technical;

pub use technical::{BollingerSnapshot, MaAlignment, MaStack, MacdSnapshot, TechnicalContext};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SignalSettings;
use crate::error::Result;
use crate::model::{BarSeries, QuoteSnapshot};
use technical::last_sma;

/// Direction of the last close relative to its moving average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// Signals for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBundle {
    /// Instrument code
    pub code: String,
    /// Last traded price
    pub last_price: f64,
    /// Previous session close
    pub prev_close: f64,
    /// Current session volume
    pub volume: f64,
    /// Trend of the last close against the moving average
    pub trend: Trend,
    /// Close the trend was judged on
    pub reference_close: f64,
    /// Moving average of closes; `None` without history
    pub moving_average: Option<f64>,
    /// Configured moving-average window
    pub ma_window: usize,
    /// Bars the averages were computed over
    pub bars_used: usize,
    /// Trailing average volume; `None` without usable history
    pub average_volume: Option<f64>,
    /// Current volume divided by the trailing average
    pub relative_volume: Option<f64>,
    /// Last price vs previous close, in percent
    pub intraday_move_pct: f64,
    /// Relative volume at or above its threshold
    pub volume_anomaly: bool,
    /// Absolute intraday move at or above its threshold
    pub move_anomaly: bool,
    /// Fewer bars than a window required
    pub low_confidence: bool,
    /// Longer-horizon indicators
    pub technical: TechnicalContext,
}

impl SignalBundle {
    /// Whether any anomaly flag is raised
    pub fn has_anomaly(&self) -> bool {
        self.volume_anomaly || self.move_anomaly
    }
}

/// Computes [`SignalBundle`]s with fixed settings
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    settings: SignalSettings,
}

impl SignalEngine {
    /// Create an engine
    pub fn new(settings: SignalSettings) -> Self {
        Self { settings }
    }

    /// Compute signals from a quote and its history
    ///
    /// Short histories are averaged over the bars available and flagged as
    /// low-confidence. A bar dated on the quote's own session is left out of
    /// the volume baseline.
    pub fn compute(&self, quote: &QuoteSnapshot, history: &BarSeries) -> Result<SignalBundle> {
        let s = &self.settings;
        let closes = history.closes();
        let session = quote.timestamp.date_naive();
        let volumes: Vec<f64> = history
            .bars()
            .iter()
            .filter(|bar| bar.date != session)
            .map(|bar| bar.volume)
            .collect();

        let reference_close = history.last().map_or(quote.last, |bar| bar.close);
        let moving_average = last_sma(&closes, s.ma_window)?;
        let trend = moving_average.map_or(Trend::Flat, |ma| {
            classify_trend(reference_close, ma, s.trend_epsilon)
        });

        let average_volume = last_sma(&volumes, s.volume_window)?;
        let relative_volume = average_volume
            .filter(|avg| *avg > 0.0)
            .map(|avg| quote.volume / avg);
        let volume_anomaly =
            relative_volume.is_some_and(|ratio| ratio >= s.relative_volume_threshold);

        let intraday_move_pct = if quote.prev_close == 0.0 {
            0.0
        } else {
            (quote.last - quote.prev_close) / quote.prev_close * 100.0
        };
        let move_anomaly = intraday_move_pct.abs() >= s.intraday_move_threshold_pct;

        let low_confidence = history.len() < s.ma_window || volumes.len() < s.volume_window;

        Ok(SignalBundle {
            code: quote.code.clone(),
            last_price: quote.last,
            prev_close: quote.prev_close,
            volume: quote.volume,
            trend,
            reference_close,
            moving_average,
            ma_window: s.ma_window,
            bars_used: history.len().min(s.ma_window),
            average_volume,
            relative_volume,
            intraday_move_pct,
            volume_anomaly,
            move_anomaly,
            low_confidence,
            technical: TechnicalContext::compute(&closes)?,
        })
    }
}

fn classify_trend(close: f64, ma: f64, epsilon: f64) -> Trend {
    if (close - ma).abs() <= epsilon * ma.abs() {
        Trend::Flat
    } else if close > ma {
        Trend::Up
    } else {
        Trend::Down
    }
}
