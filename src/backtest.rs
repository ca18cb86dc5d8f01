// Replay harness: drives the same trend -> levels -> breakout -> plan
// pipeline across every historical day of a daily series and simulates
// fills and exits on the hourly series. Exists to validate the pipeline,
// not as a separate algorithm.

use crate::reporting::render_table;
use crate::strategy::{FalseBreakoutStrategy, StrategyContext};
use crate::types::{Series, Side};
use chrono::{TimeZone, Utc};

/// How many hourly candles after the fill are scanned for a stop or
/// target touch before the trade is written off as NoFill.
const EXIT_HORIZON_CANDLES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Tp,
    Sl,
    NoFill,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Tp => "TP",
            Outcome::Sl => "SL",
            Outcome::NoFill => "NoFill",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayRow {
    pub time_utc: String,
    pub side: Side,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub break_pct: f64,
    pub close_back_pct: f64,
    pub volume_ratio: Option<f64>,
    pub level_source: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayResult {
    pub signals: usize,
    pub filled: usize,
    pub tp: usize,
    pub sl: usize,
    pub nofill: usize,
    /// Total PnL in risk multiples: +rr per TP, -1 per SL.
    pub pnl_r: f64,
    pub rows: Vec<ReplayRow>,
}

impl ReplayResult {
    pub fn render_rows(&self) -> String {
        let headers = [
            "time_utc",
            "side",
            "entry",
            "sl",
            "tp",
            "break%",
            "close%",
            "vol",
            "level",
            "outcome",
        ];
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| {
                vec![
                    r.time_utc.clone(),
                    r.side.as_str().to_string(),
                    format!("{:.4}", r.entry),
                    format!("{:.4}", r.sl),
                    format!("{:.4}", r.tp),
                    format!("{:.2}", r.break_pct * 100.0),
                    format!("{:.2}", r.close_back_pct * 100.0),
                    r.volume_ratio
                        .map(|v| format!("{v:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                    r.level_source.clone(),
                    r.outcome.as_str().to_string(),
                ]
            })
            .collect();
        render_table(&headers, &rows)
    }
}

/// Tick approximation when no instrument precision is available offline.
fn approx_tick(level: f64) -> f64 {
    let tick = level.abs() * 0.0001;
    if tick <= 0.0 {
        0.01
    } else {
        tick
    }
}

/// Classify a filled trade by scanning forward candles for the first touch
/// of stop or target. A candle touching both resolves to whichever exit is
/// numerically closer to the entry price.
fn simulate_after_fill(forward: &Series, side: Side, entry: f64, sl: f64, tp: f64) -> Outcome {
    for candle in forward.iter() {
        let (hit_sl, hit_tp) = match side {
            Side::Long => (candle.low <= sl, candle.high >= tp),
            Side::Short => (candle.high >= sl, candle.low <= tp),
        };
        if hit_sl && hit_tp {
            return if (entry - sl).abs() <= (tp - entry).abs() {
                Outcome::Sl
            } else {
                Outcome::Tp
            };
        }
        if hit_sl {
            return Outcome::Sl;
        }
        if hit_tp {
            return Outcome::Tp;
        }
    }
    Outcome::NoFill
}

/// Replay the signal pipeline across the whole daily series.
///
/// Each historical day sees only the 4-hour candles available as of its
/// end (no look-ahead); the daily series is truncated the same way by the
/// strategy context.
pub fn run_replay(
    d1: &Series,
    h4: &Series,
    h1: &Series,
    strategy: &FalseBreakoutStrategy,
) -> ReplayResult {
    let mut result = ReplayResult::default();
    if d1.len() < 2 || h1.is_empty() {
        return result;
    }

    let rr = strategy.cfg().planner.risk_reward.max(0.1);

    for day_idx in 1..d1.len() {
        let day = match d1.get(day_idx) {
            Some(c) => c,
            None => continue,
        };
        let start_ts = day.ts;
        let end_ts = d1.get(day_idx + 1).map(|next| next.ts);

        let h4_scope = match end_ts {
            Some(end) => h4.up_to_ts(end),
            None => h4.clone(),
        };
        let ctx = StrategyContext {
            d1: d1.head(day_idx + 1),
            h4: h4_scope,
            h1: h1.clone(),
        };

        let trend = strategy.detect_trend(&ctx);
        let side = match strategy.determine_side(&trend) {
            Some(side) => side,
            None => continue,
        };

        let levels = strategy.collect_levels(&ctx, day_idx);
        let breakouts = strategy.find_breakouts(&ctx, &levels, start_ts, end_ts, Some(side));
        let breakout = match breakouts.into_iter().next() {
            Some(b) => b,
            None => continue,
        };
        result.signals += 1;

        let trade = match strategy.plan_trade(&breakout, approx_tick(breakout.level)) {
            Some(t) => t,
            None => continue,
        };

        // Fill scan: first candle from the breakout onward whose range
        // contains the entry price.
        let after = h1.slice_ts(breakout.ts, i64::MAX);
        let fill_ts = after
            .iter()
            .find(|c| c.low <= trade.entry && trade.entry <= c.high)
            .map(|c| c.ts);

        let outcome = match fill_ts {
            None => {
                result.nofill += 1;
                Outcome::NoFill
            }
            Some(fill_ts) => {
                result.filled += 1;
                let forward_all = h1.slice_ts(fill_ts + 1, i64::MAX);
                let forward = forward_all.head(EXIT_HORIZON_CANDLES);
                let outcome =
                    simulate_after_fill(&forward, trade.side, trade.entry, trade.sl, trade.tp);
                match outcome {
                    Outcome::Tp => {
                        result.tp += 1;
                        result.pnl_r += rr;
                    }
                    Outcome::Sl => {
                        result.sl += 1;
                        result.pnl_r -= 1.0;
                    }
                    Outcome::NoFill => {
                        result.nofill += 1;
                    }
                }
                outcome
            }
        };

        let time_utc = Utc
            .timestamp_millis_opt(breakout.ts)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| breakout.ts.to_string());
        result.rows.push(ReplayRow {
            time_utc,
            side: trade.side,
            entry: trade.entry,
            sl: trade.sl,
            tp: trade.tp,
            break_pct: trade.meta.break_pct,
            close_back_pct: trade.meta.close_back_pct,
            volume_ratio: trade.meta.volume_ratio,
            level_source: trade.meta.level_source.clone(),
            outcome,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::candle;

    #[test]
    fn ambiguous_candle_resolves_to_nearer_exit() {
        // Long 100 entry, SL 99 (distance 1), TP 103 (distance 3): a candle
        // spanning both exits counts as a stop because it is nearer.
        let forward = Series::from_raw(vec![candle(0, 100.0, 104.0, 98.0, 101.0, 1.0)]);
        assert_eq!(
            simulate_after_fill(&forward, Side::Long, 100.0, 99.0, 103.0),
            Outcome::Sl
        );
        // TP nearer than SL: same span resolves to the target.
        assert_eq!(
            simulate_after_fill(&forward, Side::Long, 100.0, 96.0, 101.0),
            Outcome::Tp
        );
    }

    #[test]
    fn no_touch_within_horizon_is_nofill() {
        let forward = Series::from_raw(vec![
            candle(0, 100.0, 100.5, 99.6, 100.2, 1.0),
            candle(3_600_000, 100.2, 100.6, 99.7, 100.1, 1.0),
        ]);
        assert_eq!(
            simulate_after_fill(&forward, Side::Long, 100.0, 99.0, 103.0),
            Outcome::NoFill
        );
    }
}
