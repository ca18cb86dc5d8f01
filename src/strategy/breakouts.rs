use crate::config::BreakoutCfg;
use crate::indicators::volume_ma;
use crate::types::{BreakoutInfo, Candle, LevelCandidate, Series, Side};

/// First candle in the window that prints a false breakout of `level`:
/// the wick pierces within the penetration band, the candle closes back on
/// the safe side within the close-back cap, and volume stays below the
/// climax ratio. A level contributes at most one event.
fn find_breakout_for_level(
    window: &[(usize, &Candle)],
    level: &LevelCandidate,
    vol_ma: &[Option<f64>],
    cfg: &BreakoutCfg,
) -> Option<BreakoutInfo> {
    for (pos, (series_idx, candle)) in window.iter().enumerate() {
        let ma = match vol_ma.get(*series_idx).copied().flatten() {
            Some(ma) if ma > 0.0 => ma,
            _ => continue,
        };
        if candle.volume > cfg.volume_max_ratio * ma {
            continue;
        }

        let value = level.value;
        if value == 0.0 {
            continue;
        }
        let (penetration, close_back, closed_inside, wick_price) = match level.side {
            Side::Long => (
                (value - candle.low) / value,
                (candle.close - value) / value,
                candle.close >= value,
                candle.low,
            ),
            Side::Short => (
                (candle.high - value) / value,
                (value - candle.close) / value,
                candle.close <= value,
                candle.high,
            ),
        };

        if penetration < cfg.penetration_min_pct || penetration > cfg.penetration_max_pct {
            continue;
        }
        if !closed_inside {
            continue;
        }
        if close_back < 0.0 || close_back > cfg.close_back_max_pct {
            continue;
        }

        let next_open = window.get(pos + 1).map(|(_, next)| next.open);

        return Some(BreakoutInfo {
            side: level.side,
            level: value,
            level_source: level.label.clone(),
            level_age: level.age,
            idx: *series_idx,
            ts: candle.ts,
            next_open,
            break_pct: penetration,
            close_back_pct: close_back,
            candle_open: candle.open,
            candle_high: candle.high,
            candle_low: candle.low,
            candle_close: candle.close,
            volume: candle.volume,
            volume_ma: ma,
            wick_price,
        });
    }

    None
}

/// Scan the intraday series restricted to `[start_ts, end_ts)` for false
/// breakouts of the given levels.
///
/// Levels whose side does not match `allowed_side` are skipped entirely.
/// The volume moving average is computed over the full series, not the
/// restricted slice, so the window edge does not truncate it. Results are
/// sorted by (timestamp, level age): earliest first, youngest level first
/// among simultaneous events.
pub fn find_false_breakouts_for_day(
    h1: &Series,
    levels: &[LevelCandidate],
    start_ts: i64,
    end_ts: Option<i64>,
    allowed_side: Option<Side>,
    cfg: &BreakoutCfg,
) -> Vec<BreakoutInfo> {
    if h1.is_empty() || levels.is_empty() {
        return Vec::new();
    }

    let end_ts = end_ts.unwrap_or_else(|| h1.max_ts().unwrap_or(start_ts) + 1);
    let window: Vec<(usize, &Candle)> = h1
        .iter()
        .enumerate()
        .filter(|(_, c)| c.ts >= start_ts && c.ts < end_ts)
        .collect();
    if window.is_empty() {
        return Vec::new();
    }

    let vol_ma = volume_ma(&h1.volumes(), cfg.volume_ma_length);

    let mut results: Vec<BreakoutInfo> = Vec::new();
    for level in levels {
        if let Some(side) = allowed_side {
            if level.side != side {
                continue;
            }
        }
        if let Some(info) = find_breakout_for_level(&window, level, &vol_ma, cfg) {
            results.push(info);
        }
    }

    results.sort_by(|a, b| (a.ts, a.level_age).cmp(&(b.ts, b.level_age)));
    results
}
