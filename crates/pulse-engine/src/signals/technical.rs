//! Extended technical context: moving-average stack, MACD and Bollinger bands

use serde::{Deserialize, Serialize};
use ta::{
    Next,
    indicators::{BollingerBands, MovingAverageConvergenceDivergence, SimpleMovingAverage},
};

use crate::error::Result;

/// MACD needs the slow EMA plus the signal EMA to settle
const MACD_MIN_BARS: usize = 35;
const BOLLINGER_PERIOD: usize = 20;
const MA_PERIODS: [usize; 4] = [5, 10, 20, 60];

/// Alignment of the 5/10/20/60 moving averages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaAlignment {
    /// MA5 > MA10 > MA20 > MA60
    Bullish,
    /// MA5 < MA10 < MA20 < MA60
    Bearish,
    /// Anything else
    Tangled,
}

/// Moving averages over 5/10/20/60 closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaStack {
    pub ma5: f64,
    pub ma10: f64,
    pub ma20: f64,
    pub ma60: f64,
    pub alignment: MaAlignment,
}

/// MACD(12, 26, 9) at the last bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdSnapshot {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Bollinger(20, 2σ) at the last bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerSnapshot {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Position of the last close inside the band (0 = lower, 1 = upper)
    pub percent_b: Option<f64>,
}

/// Longer-horizon indicators; each is `None` until enough bars exist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalContext {
    pub ma_stack: Option<MaStack>,
    pub macd: Option<MacdSnapshot>,
    pub bollinger: Option<BollingerSnapshot>,
}

impl TechnicalContext {
    /// Compute from closes, oldest first
    pub fn compute(closes: &[f64]) -> Result<Self> {
        Ok(Self {
            ma_stack: ma_stack(closes)?,
            macd: macd(closes)?,
            bollinger: bollinger(closes)?,
        })
    }
}

/// Last value of an SMA fed with every close
pub(crate) fn last_sma(values: &[f64], period: usize) -> Result<Option<f64>> {
    let mut sma = SimpleMovingAverage::new(period)?;
    Ok(values.iter().map(|&v| sma.next(v)).last())
}

fn ma_stack(closes: &[f64]) -> Result<Option<MaStack>> {
    if closes.len() < MA_PERIODS[3] {
        return Ok(None);
    }

    let mut values = [0.0; 4];
    for (slot, period) in values.iter_mut().zip(MA_PERIODS) {
        let Some(value) = last_sma(closes, period)? else {
            return Ok(None);
        };
        *slot = value;
    }
    let [ma5, ma10, ma20, ma60] = values;

    let alignment = if ma5 > ma10 && ma10 > ma20 && ma20 > ma60 {
        MaAlignment::Bullish
    } else if ma5 < ma10 && ma10 < ma20 && ma20 < ma60 {
        MaAlignment::Bearish
    } else {
        MaAlignment::Tangled
    };

    Ok(Some(MaStack {
        ma5,
        ma10,
        ma20,
        ma60,
        alignment,
    }))
}

fn macd(closes: &[f64]) -> Result<Option<MacdSnapshot>> {
    if closes.len() < MACD_MIN_BARS {
        return Ok(None);
    }

    let mut indicator = MovingAverageConvergenceDivergence::new(12, 26, 9)?;
    Ok(closes.iter().map(|&c| indicator.next(c)).last().map(|out| MacdSnapshot {
        macd: out.macd,
        signal: out.signal,
        histogram: out.histogram,
    }))
}

fn bollinger(closes: &[f64]) -> Result<Option<BollingerSnapshot>> {
    if closes.len() < BOLLINGER_PERIOD {
        return Ok(None);
    }

    let mut bands = BollingerBands::new(BOLLINGER_PERIOD, 2.0)?;
    let Some(out) = closes.iter().map(|&c| bands.next(c)).last() else {
        return Ok(None);
    };
    let width = out.upper - out.lower;
    let percent_b = closes
        .last()
        .filter(|_| width > f64::EPSILON)
        .map(|close| (close - out.lower) / width);

    Ok(Some(BollingerSnapshot {
        upper: out.upper,
        middle: out.average,
        lower: out.lower,
        percent_b,
    }))
}
