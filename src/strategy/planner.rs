use crate::config::PlannerCfg;
use crate::types::{BreakoutInfo, PlannedTrade, Side, TradeMeta};

/// Turn one breakout event into entry/stop/target prices.
///
/// Returns None when no plan with strictly positive, finite risk exists.
pub fn plan_trade(
    breakout: &BreakoutInfo,
    tick_size: f64,
    cfg: &PlannerCfg,
) -> Option<PlannedTrade> {
    let mut entry = match cfg.entry_mode.as_str() {
        "level_offset" => {
            let offset = cfg.entry_underfill_pct.max(0.0);
            match breakout.side {
                Side::Long => breakout.level * (1.0 + offset),
                Side::Short => breakout.level * (1.0 - offset),
            }
        }
        // next_open; falls back to the breakout candle's own close when the
        // breakout is the last candle in the window.
        _ => breakout.next_open.unwrap_or(breakout.candle_close),
    };

    let mut tick = tick_size;
    if tick <= 0.0 {
        tick = breakout.level * 0.0001;
        if tick <= 0.0 {
            tick = 0.01;
        }
    }

    let sl = match cfg.stop_mode.as_str() {
        "level" | "level_pct" => {
            let pct = cfg.stop_level_pct.max(0.0);
            match breakout.side {
                Side::Long => breakout.level * (1.0 - pct),
                Side::Short => breakout.level * (1.0 + pct),
            }
        }
        _ => {
            let ticks = cfg.stop_wick_ticks as f64;
            match breakout.side {
                Side::Long => breakout.wick_price - ticks * tick,
                Side::Short => breakout.wick_price + ticks * tick,
            }
        }
    };

    // Safety correction: a next_open entry can land on the wrong side of
    // the stop. First clamp the entry back to the level, then as a last
    // resort push it one tick past the stop.
    match breakout.side {
        Side::Long if entry <= sl => {
            entry = entry.max(breakout.level);
            if entry <= sl {
                entry = sl + tick;
            }
        }
        Side::Short if entry >= sl => {
            entry = entry.min(breakout.level);
            if entry >= sl {
                entry = sl - tick;
            }
        }
        _ => {}
    }

    let risk = match breakout.side {
        Side::Long => entry - sl,
        Side::Short => sl - entry,
    };
    if risk <= 0.0 || !risk.is_finite() {
        return None;
    }

    let rr = cfg.risk_reward.max(0.1);
    let tp = match breakout.side {
        Side::Long => entry + rr * risk,
        Side::Short => entry - rr * risk,
    };

    let volume_ratio = if breakout.volume_ma > 0.0 {
        Some(breakout.volume / breakout.volume_ma)
    } else {
        None
    };

    Some(PlannedTrade {
        side: breakout.side,
        entry,
        sl,
        tp,
        reason: "ok",
        meta: TradeMeta {
            level: breakout.level,
            level_source: breakout.level_source.clone(),
            break_pct: breakout.break_pct,
            close_back_pct: breakout.close_back_pct,
            volume_ratio,
            candle_ts: breakout.ts,
        },
    })
}
