use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    pub fn to_binance_str(&self) -> &'static str {
        match self {
            Side::Long => "BUY",
            Side::Short => "SELL",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
}

/// Directional bias on the two higher timeframes, recomputed every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trend {
    pub d1: TrendDirection,
    pub h4: TrendDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    /// Open time in epoch milliseconds.
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn open_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.ts).single().unwrap_or_default()
    }

    fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }
}

/// Ordered candle sequence for one (symbol, timeframe) pair.
///
/// Construction normalizes the raw provider feed: non-finite rows are
/// dropped, candles are sorted by open time and duplicate timestamps keep
/// the last occurrence. Timestamps are strictly increasing afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series(Vec<Candle>);

impl Series {
    pub fn from_raw(mut candles: Vec<Candle>) -> Self {
        candles.retain(Candle::is_finite);
        candles.sort_by_key(|c| c.ts);
        candles.dedup_by(|next, prev| {
            if next.ts == prev.ts {
                *prev = *next;
                true
            } else {
                false
            }
        });
        Series(candles)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Candle> {
        self.0.get(idx)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.0.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.volume).collect()
    }

    /// Sub-series containing the first `len` candles.
    pub fn head(&self, len: usize) -> Series {
        Series(self.0.iter().take(len).copied().collect())
    }

    /// Sub-series with open time in `[start_ts, end_ts)`.
    pub fn slice_ts(&self, start_ts: i64, end_ts: i64) -> Series {
        Series(
            self.0
                .iter()
                .filter(|c| c.ts >= start_ts && c.ts < end_ts)
                .copied()
                .collect(),
        )
    }

    /// Sub-series with open time `<= end_ts` (used to avoid look-ahead when
    /// replaying historical days).
    pub fn up_to_ts(&self, end_ts: i64) -> Series {
        Series(self.0.iter().filter(|c| c.ts <= end_ts).copied().collect())
    }

    pub fn max_ts(&self) -> Option<i64> {
        self.0.last().map(|c| c.ts)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.0.iter()
    }
}

/// Candidate breakout level sourced from a previous daily extreme.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelCandidate {
    pub value: f64,
    /// Which trade direction a false breakout of this level triggers.
    pub side: Side,
    /// Open time of the source daily candle, epoch ms.
    pub ts: i64,
    /// Human label, e.g. `prev_high@2026-08-21` or `low@2026-08-14`.
    pub label: String,
    /// Distance in days from the scanned day, >= 1.
    pub age: usize,
}

/// A detected single-candle false breakout on the intraday timeframe:
/// the wick pierces the level and the same candle closes back inside.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutInfo {
    pub side: Side,
    pub level: f64,
    pub level_source: String,
    pub level_age: usize,
    /// Index of the breakout candle within the scanned window.
    pub idx: usize,
    pub ts: i64,
    /// Open of the following candle, if one exists in the window.
    pub next_open: Option<f64>,
    /// Fraction of the level the wick pierced past it.
    pub break_pct: f64,
    /// Fraction of the level the close returned on the safe side.
    pub close_back_pct: f64,
    pub candle_open: f64,
    pub candle_high: f64,
    pub candle_low: f64,
    pub candle_close: f64,
    pub volume: f64,
    pub volume_ma: f64,
    /// Extreme wick price (low for long levels, high for short levels).
    pub wick_price: f64,
}

/// Audit metadata carried on every planned trade, used for message
/// rendering and the replay report.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeMeta {
    pub level: f64,
    pub level_source: String,
    pub break_pct: f64,
    pub close_back_pct: f64,
    pub volume_ratio: Option<f64>,
    pub candle_ts: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTrade {
    pub side: Side,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub reason: &'static str,
    pub meta: TradeMeta,
}

impl PlannedTrade {
    /// Risk distance between entry and stop; strictly positive for any
    /// plan returned by the planner.
    pub fn risk_amount(&self) -> f64 {
        match self.side {
            Side::Long => self.entry - self.sl,
            Side::Short => self.sl - self.entry,
        }
    }
}
