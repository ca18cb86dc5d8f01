// Library crate re-exporting all modules needed by the binaries and
// integration tests.

pub mod backtest;
pub mod binance;
pub mod config;
pub mod exchange;
pub mod indicators;
pub mod marketdata;
pub mod reporting;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod strategy;
pub mod symbols;
pub mod test_utils;
pub mod types;

pub use config::AppCfg;
pub use runner::{RunnerOutcome, SignalRunner};
pub use state::{PersistentState, StateStore};
pub use types::{Candle, Series, Side};
