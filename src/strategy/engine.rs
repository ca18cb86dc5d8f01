use crate::config::AppCfg;
use crate::types::{BreakoutInfo, LevelCandidate, PlannedTrade, Series, Side, Trend};

use super::breakouts::find_false_breakouts_for_day;
use super::levels::collect_level_candidates;
use super::planner::plan_trade;
use super::trend::{detect_trend, determine_trade_side};

/// Candle bundle the strategy operates on for one symbol.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub d1: Series,
    pub h4: Series,
    pub h1: Series,
}

/// Facade bundling the four pipeline stages. Stateless; both the live
/// runner and the replay harness drive it so their signal logic cannot
/// diverge.
#[derive(Debug, Clone)]
pub struct FalseBreakoutStrategy {
    cfg: AppCfg,
}

impl FalseBreakoutStrategy {
    pub fn new(cfg: AppCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &AppCfg {
        &self.cfg
    }

    pub fn detect_trend(&self, ctx: &StrategyContext) -> Trend {
        detect_trend(&ctx.d1, &ctx.h4, &self.cfg.trend)
    }

    pub fn determine_side(&self, trend: &Trend) -> Option<Side> {
        determine_trade_side(trend, self.cfg.trend.strict)
    }

    pub fn collect_levels(&self, ctx: &StrategyContext, day_idx: usize) -> Vec<LevelCandidate> {
        collect_level_candidates(&ctx.d1, day_idx, self.cfg.breakout.level_lookback_days)
    }

    pub fn find_breakouts(
        &self,
        ctx: &StrategyContext,
        levels: &[LevelCandidate],
        start_ts: i64,
        end_ts: Option<i64>,
        allowed_side: Option<Side>,
    ) -> Vec<BreakoutInfo> {
        find_false_breakouts_for_day(
            &ctx.h1,
            levels,
            start_ts,
            end_ts,
            allowed_side,
            &self.cfg.breakout,
        )
    }

    pub fn plan_trade(&self, breakout: &BreakoutInfo, tick_size: f64) -> Option<PlannedTrade> {
        plan_trade(breakout, tick_size, &self.cfg.planner)
    }
}
