pub mod breakouts;
pub mod engine;
pub mod levels;
pub mod planner;
pub mod trend;

pub use breakouts::find_false_breakouts_for_day;
pub use engine::{FalseBreakoutStrategy, StrategyContext};
pub use levels::collect_level_candidates;
pub use planner::plan_trade;
pub use trend::{detect_trend, determine_trade_side};
