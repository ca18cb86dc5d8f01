// Collaborator seams for the decision pipeline: instrument precision,
// exchange access and notification. The runner only sees these traits.

use crate::types::Side;
use anyhow::Result;
use async_trait::async_trait;
use log::info;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Per-instrument price/quantity grid.
pub trait InstrumentPrecision: Send + Sync {
    fn tick_size(&self, symbol: &str) -> f64;
    fn round_price(&self, symbol: &str, value: f64) -> f64;
    fn round_qty(&self, symbol: &str, value: f64) -> f64;
}

#[derive(Debug, Clone)]
pub struct BracketOptions {
    pub post_only: bool,
    pub tif: String,
}

impl Default for BracketOptions {
    fn default() -> Self {
        Self {
            post_only: true,
            tif: "GTC".to_string(),
        }
    }
}

/// Order and account access. `place_bracket_order` submits an entry order
/// paired with reduce-only stop-loss and take-profit exits and returns the
/// entry order id.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn open_position_count(&self) -> Result<usize>;
    async fn fetch_available_balance(&self) -> Result<f64>;
    async fn place_bracket_order(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        entry: f64,
        sl: f64,
        tp: f64,
        opts: &BracketOptions,
    ) -> Result<String>;
}

pub trait Notifier: Send + Sync {
    fn send_text(&self, text: &str);
}

impl<T: InstrumentPrecision + ?Sized> InstrumentPrecision for std::sync::Arc<T> {
    fn tick_size(&self, symbol: &str) -> f64 {
        (**self).tick_size(symbol)
    }

    fn round_price(&self, symbol: &str, value: f64) -> f64 {
        (**self).round_price(symbol, value)
    }

    fn round_qty(&self, symbol: &str, value: f64) -> f64 {
        (**self).round_qty(symbol, value)
    }
}

#[async_trait]
impl<T: ExchangeGateway + ?Sized> ExchangeGateway for std::sync::Arc<T> {
    async fn open_position_count(&self) -> Result<usize> {
        (**self).open_position_count().await
    }

    async fn fetch_available_balance(&self) -> Result<f64> {
        (**self).fetch_available_balance().await
    }

    async fn place_bracket_order(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        entry: f64,
        sl: f64,
        tp: f64,
        opts: &BracketOptions,
    ) -> Result<String> {
        (**self)
            .place_bracket_order(symbol, side, qty, entry, sl, tp, opts)
            .await
    }
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn send_text(&self, text: &str) {
        (**self).send_text(text)
    }
}

/// Notifier that writes decisions to the log; the default sink when no
/// external channel is wired up.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_text(&self, text: &str) {
        info!("NOTIFY: {text}");
    }
}

/// Floor `value` to a multiple of `step`. Exact decimal arithmetic so
/// 0.1-style steps do not accumulate binary noise.
pub fn quantize_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 || !value.is_finite() {
        return value;
    }
    let (value_d, step_d) = match (Decimal::from_f64(value), Decimal::from_f64(step)) {
        (Some(v), Some(s)) if !s.is_zero() => (v, s),
        _ => return value,
    };
    let floored = (value_d / step_d).floor() * step_d;
    floored.to_f64().unwrap_or(value)
}

/// Position size from risk budget: `balance * risk_pct / |entry - sl|`,
/// floored to the instrument quantity step. Zero when the inputs leave no
/// valid size.
pub fn calc_qty_from_risk(
    balance: f64,
    entry: f64,
    sl: f64,
    risk_pct: f64,
    qty_step: f64,
) -> f64 {
    let risk_budget = (balance * risk_pct).max(0.0);
    let distance = (entry - sl).abs();
    if risk_budget <= 0.0 || distance <= 0.0 {
        return 0.0;
    }
    quantize_step(risk_budget / distance, qty_step).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_floors_to_step() {
        assert_eq!(quantize_step(1.2345, 0.01), 1.23);
        assert_eq!(quantize_step(0.399999, 0.1), 0.3);
        assert_eq!(quantize_step(5.0, 0.0), 5.0);
    }

    #[test]
    fn qty_from_risk_basic() {
        // 1000 * 1% = 10 risk budget over a 2.0 stop distance -> 5.
        assert_eq!(calc_qty_from_risk(1000.0, 102.0, 100.0, 0.01, 0.001), 5.0);
    }

    #[test]
    fn qty_zero_when_no_budget_or_distance() {
        assert_eq!(calc_qty_from_risk(0.0, 102.0, 100.0, 0.01, 0.001), 0.0);
        assert_eq!(calc_qty_from_risk(1000.0, 100.0, 100.0, 0.01, 0.001), 0.0);
    }
}
