// Shared fixtures and mock collaborators for unit and integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::exchange::{BracketOptions, ExchangeGateway, InstrumentPrecision, Notifier};
use crate::marketdata::KlineSource;
use crate::types::{Candle, Series, Side};

pub const DAY_MS: i64 = 86_400_000;
pub const HOUR_MS: i64 = 3_600_000;

pub fn candle(ts: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle {
        ts,
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Flat-bodied candle at `price`, mostly used to pad series.
pub fn flat_candle(ts: i64, price: f64, volume: f64) -> Candle {
    candle(ts, price, price, price, price, volume)
}

/// Series of flat candles with the given closes, spaced one hour apart.
pub fn series_from_closes(closes: &[f64]) -> Series {
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| flat_candle(i as i64 * HOUR_MS, c, 1.0))
        .collect();
    Series::from_raw(candles)
}

/// Daily series from (high, low) pairs; opens and closes sit mid-range.
pub fn daily_series(extremes: &[(f64, f64)]) -> Series {
    let candles = extremes
        .iter()
        .enumerate()
        .map(|(i, &(high, low))| {
            let mid = (high + low) / 2.0;
            candle(i as i64 * DAY_MS, mid, high, low, mid, 1.0)
        })
        .collect();
    Series::from_raw(candles)
}

// ----------------------------------------------------------------------------
// Mock collaborators
// ----------------------------------------------------------------------------

/// Kline source serving canned series keyed by timeframe, with optional
/// scripted failures for the retry tests.
#[derive(Default)]
pub struct MockKlineSource {
    series: Mutex<HashMap<String, Vec<Candle>>>,
    fail_next: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl MockKlineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_series(&self, timeframe: &str, candles: Vec<Candle>) {
        if let Ok(mut map) = self.series.lock() {
            map.insert(timeframe.to_string(), candles);
        }
    }

    /// Queue error messages returned (in order) before any data is served.
    pub fn fail_with(&self, messages: &[&str]) {
        if let Ok(mut queue) = self.fail_next.lock() {
            queue.extend(messages.iter().map(|m| m.to_string()));
        }
    }
}

#[async_trait]
impl KlineSource for MockKlineSource {
    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        _limit: u32,
        _since: Option<i64>,
    ) -> Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queue) = self.fail_next.lock() {
            if !queue.is_empty() {
                return Err(anyhow!(queue.remove(0)));
            }
        }
        let map = self
            .series
            .lock()
            .map_err(|_| anyhow!("mock lock poisoned"))?;
        map.get(timeframe)
            .cloned()
            .ok_or_else(|| anyhow!("no mock data for {symbol} {timeframe}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOrder {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub post_only: bool,
}

/// Gateway recording every bracket submission; balance, open-position
/// count and order failure are all scriptable.
pub struct MockGateway {
    pub balance: Mutex<Result<f64, String>>,
    pub open_positions: AtomicUsize,
    pub fail_positions: Mutex<Option<String>>,
    pub fail_order: Mutex<Option<String>>,
    pub orders: Mutex<Vec<RecordedOrder>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            balance: Mutex::new(Ok(1_000.0)),
            open_positions: AtomicUsize::new(0),
            fail_positions: Mutex::new(None),
            fail_order: Mutex::new(None),
            orders: Mutex::new(Vec::new()),
        }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, balance: f64) {
        if let Ok(mut slot) = self.balance.lock() {
            *slot = Ok(balance);
        }
    }

    pub fn fail_balance(&self, message: &str) {
        if let Ok(mut slot) = self.balance.lock() {
            *slot = Err(message.to_string());
        }
    }

    pub fn fail_position_count(&self, message: &str) {
        if let Ok(mut slot) = self.fail_positions.lock() {
            *slot = Some(message.to_string());
        }
    }

    pub fn fail_next_order(&self, message: &str) {
        if let Ok(mut slot) = self.fail_order.lock() {
            *slot = Some(message.to_string());
        }
    }

    pub fn recorded_orders(&self) -> Vec<RecordedOrder> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn open_position_count(&self) -> Result<usize> {
        if let Ok(mut slot) = self.fail_positions.lock() {
            if let Some(message) = slot.take() {
                return Err(anyhow!(message));
            }
        }
        Ok(self.open_positions.load(Ordering::SeqCst))
    }

    async fn fetch_available_balance(&self) -> Result<f64> {
        match self.balance.lock() {
            Ok(slot) => slot.clone().map_err(|m| anyhow!(m)),
            Err(_) => Err(anyhow!("mock lock poisoned")),
        }
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
        if let Ok(mut slot) = self.fail_order.lock() {
            if let Some(message) = slot.take() {
                return Err(anyhow!(message));
            }
        }
        if let Ok(mut orders) = self.orders.lock() {
            orders.push(RecordedOrder {
                symbol: symbol.to_string(),
                side,
                qty,
                entry,
                sl,
                tp,
                post_only: opts.post_only,
            });
        }
        Ok("mock-order-1".to_string())
    }
}

/// Precision grid with one tick/step for every symbol.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrecision {
    pub tick: f64,
    pub qty_step: f64,
}

impl Default for FixedPrecision {
    fn default() -> Self {
        Self {
            tick: 0.01,
            qty_step: 0.001,
        }
    }
}

impl InstrumentPrecision for FixedPrecision {
    fn tick_size(&self, _symbol: &str) -> f64 {
        self.tick
    }

    fn round_price(&self, _symbol: &str, value: f64) -> f64 {
        crate::exchange::quantize_step(value, self.tick)
    }

    fn round_qty(&self, _symbol: &str, value: f64) -> f64 {
        crate::exchange::quantize_step(value, self.qty_step)
    }
}

/// Notifier collecting every message for assertions.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collected(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl Notifier for CollectingNotifier {
    fn send_text(&self, text: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text.to_string());
        }
    }
}
