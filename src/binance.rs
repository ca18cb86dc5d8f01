// Binance USD-M futures REST client implementing the collaborator traits.
// Public endpoints (klines, exchangeInfo) are unsigned; account and order
// endpoints are HMAC-signed.

use crate::config::BinanceCfg;
use crate::exchange::{BracketOptions, ExchangeGateway, InstrumentPrecision};
use crate::marketdata::KlineSource;
use crate::types::{Candle, Side};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy)]
pub struct SymbolFilters {
    pub tick_size: f64,
    pub step_size: f64,
    pub min_qty: f64,
}

impl Default for SymbolFilters {
    fn default() -> Self {
        Self {
            tick_size: 0.01,
            step_size: 0.001,
            min_qty: 0.001,
        }
    }
}

pub struct BinanceClient {
    http: reqwest::Client,
    cfg: BinanceCfg,
    filters: RwLock<HashMap<String, SymbolFilters>>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    symbol: String,
    filters: Vec<ExchangeFilter>,
}

#[derive(Debug, Deserialize)]
struct ExchangeFilter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(flatten)]
    data: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FuturesBalance {
    asset: String,
    #[serde(rename = "availableBalance")]
    available_balance: String,
}

#[derive(Debug, Deserialize)]
struct PositionRisk {
    #[serde(rename = "positionAmt")]
    position_amount: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: i64,
}

impl BinanceClient {
    pub fn new(cfg: BinanceCfg) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            cfg,
            filters: RwLock::new(HashMap::new()),
        })
    }

    /// Fetch exchangeInfo once and cache the price/qty filters for the
    /// given symbols. Call before trading so the sync precision lookups
    /// never hit the network.
    pub async fn warm_filters(&self, symbols: &[String]) -> Result<()> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.cfg.futures_base);
        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<ExchangeInfoResponse>()
            .await
            .context("failed to parse exchange info response")?;

        let mut cache = self
            .filters
            .write()
            .map_err(|_| anyhow!("filters cache poisoned"))?;
        for info in response.symbols {
            if !symbols.is_empty() && !symbols.iter().any(|s| s == &info.symbol) {
                continue;
            }
            let mut filters = SymbolFilters::default();
            for filter in &info.filters {
                match filter.filter_type.as_str() {
                    "PRICE_FILTER" => {
                        if let Some(ts) = filter.data.get("tickSize").and_then(Value::as_str) {
                            filters.tick_size = ts.parse().unwrap_or(filters.tick_size);
                        }
                    }
                    "LOT_SIZE" => {
                        if let Some(ss) = filter.data.get("stepSize").and_then(Value::as_str) {
                            filters.step_size = ss.parse().unwrap_or(filters.step_size);
                        }
                        if let Some(mq) = filter.data.get("minQty").and_then(Value::as_str) {
                            filters.min_qty = mq.parse().unwrap_or(filters.min_qty);
                        }
                    }
                    _ => {}
                }
            }
            cache.insert(info.symbol, filters);
        }
        log::info!("BINANCE: cached filters for {} symbols", cache.len());
        Ok(())
    }

    fn filters_for(&self, symbol: &str) -> SymbolFilters {
        self.filters
            .read()
            .ok()
            .and_then(|cache| cache.get(symbol).copied())
            .unwrap_or_default()
    }

    fn ensure_credentials(&self) -> Result<()> {
        if self.cfg.api_key.is_empty() || self.cfg.secret_key.is_empty() {
            Err(anyhow!("Binance API key/secret required"))
        } else {
            Ok(())
        }
    }

    fn sign_params(&self, mut params: Vec<(String, String)>) -> Result<String> {
        params.push(("timestamp".into(), Utc::now().timestamp_millis().to_string()));
        if self.cfg.recv_window_ms > 0 {
            params.push(("recvWindow".into(), self.cfg.recv_window_ms.to_string()));
        }
        let query = serde_urlencoded::to_string(&params)?;
        let mut mac = HmacSha256::new_from_slice(self.cfg.secret_key.as_bytes())
            .map_err(|err| anyhow!("failed to init signer: {err}"))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{query}&signature={signature}"))
    }

    async fn signed_get(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<reqwest::Response> {
        self.ensure_credentials()?;
        let query = self.sign_params(params)?;
        let url = format!("{}{}?{}", self.cfg.futures_base, path, query);
        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.cfg.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    async fn signed_post(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<reqwest::Response> {
        self.ensure_credentials()?;
        let body = self.sign_params(params)?;
        let url = format!("{}{}", self.cfg.futures_base, path);
        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.cfg.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    async fn submit_order(&self, params: Vec<(String, String)>) -> Result<i64> {
        let order = self
            .signed_post("/fapi/v1/order", params)
            .await?
            .json::<OrderResponse>()
            .await
            .context("failed to parse order response")?;
        Ok(order.order_id)
    }
}

/// Decimal places implied by a step value, for request formatting.
fn step_decimals(step: f64) -> usize {
    if step <= 0.0 {
        return 8;
    }
    let step_str = format!("{:.10}", step);
    step_str
        .find('.')
        .map(|dot| step_str[dot + 1..].trim_end_matches('0').len())
        .unwrap_or(0)
        .min(8)
}

fn format_to_step(value: f64, step: f64) -> String {
    format!("{:.1$}", value, step_decimals(step))
}

#[async_trait]
impl KlineSource for BinanceClient {
    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
        since: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/fapi/v1/klines", self.cfg.futures_base);
        let mut query: Vec<(String, String)> = vec![
            ("symbol".into(), symbol.to_string()),
            ("interval".into(), timeframe.to_string()),
            ("limit".into(), limit.to_string()),
        ];
        if let Some(since) = since {
            query.push(("startTime".into(), since.to_string()));
        }

        let rows = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Vec<Value>>>()
            .await
            .context("failed to parse klines response")?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() < 6 {
                continue;
            }
            let ts = row[0].as_i64().unwrap_or(0);
            let field = |idx: usize| -> f64 {
                row[idx]
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            };
            candles.push(Candle {
                ts,
                open: field(1),
                high: field(2),
                low: field(3),
                close: field(4),
                volume: field(5),
            });
        }
        Ok(candles)
    }
}

impl InstrumentPrecision for BinanceClient {
    fn tick_size(&self, symbol: &str) -> f64 {
        self.filters_for(symbol).tick_size
    }

    fn round_price(&self, symbol: &str, value: f64) -> f64 {
        crate::exchange::quantize_step(value, self.filters_for(symbol).tick_size)
    }

    fn round_qty(&self, symbol: &str, value: f64) -> f64 {
        crate::exchange::quantize_step(value, self.filters_for(symbol).step_size)
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn open_position_count(&self) -> Result<usize> {
        let positions = self
            .signed_get("/fapi/v2/positionRisk", Vec::new())
            .await?
            .json::<Vec<PositionRisk>>()
            .await
            .context("failed to parse position risk response")?;
        Ok(positions
            .iter()
            .filter(|p| {
                p.position_amount
                    .parse::<f64>()
                    .map(|amt| amt.abs() > 0.0)
                    .unwrap_or(false)
            })
            .count())
    }

    async fn fetch_available_balance(&self) -> Result<f64> {
        let balances = self
            .signed_get("/fapi/v2/balance", Vec::new())
            .await?
            .json::<Vec<FuturesBalance>>()
            .await
            .context("failed to parse balance response")?;
        let usdt = balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case("USDT"))
            .ok_or_else(|| anyhow!("USDT balance not found"))?;
        usdt.available_balance
            .parse::<f64>()
            .context("failed to parse USDT available balance")
    }

    /// Entry limit order plus reduce-only stop-loss and take-profit exits.
    /// The exits close the whole position; their trigger prices are the
    /// planned stop and target.
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
        if qty <= 0.0 {
            return Err(anyhow!("order quantity must be positive"));
        }
        let filters = self.filters_for(symbol);
        let qty_str = format_to_step(qty, filters.step_size);
        let entry_str = format_to_step(entry, filters.tick_size);
        let sl_str = format_to_step(sl, filters.tick_size);
        let tp_str = format_to_step(tp, filters.tick_size);

        let tif = if opts.post_only { "GTX" } else { opts.tif.as_str() };
        let entry_params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), side.to_binance_str().to_string()),
            ("type".to_string(), "LIMIT".to_string()),
            ("quantity".to_string(), qty_str),
            ("price".to_string(), entry_str),
            ("timeInForce".to_string(), tif.to_string()),
        ];
        let entry_id = self.submit_order(entry_params).await?;

        let exit_side = side.opposite().to_binance_str().to_string();
        let sl_params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), exit_side.clone()),
            ("type".to_string(), "STOP_MARKET".to_string()),
            ("stopPrice".to_string(), sl_str),
            ("closePosition".to_string(), "true".to_string()),
        ];
        let tp_params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), exit_side),
            ("type".to_string(), "TAKE_PROFIT_MARKET".to_string()),
            ("stopPrice".to_string(), tp_str),
            ("closePosition".to_string(), "true".to_string()),
        ];
        self.submit_order(sl_params)
            .await
            .context("entry accepted but stop-loss submission failed")?;
        self.submit_order(tp_params)
            .await
            .context("entry accepted but take-profit submission failed")?;

        log::info!(
            "BINANCE: bracket sent for {symbol} ({}) entry order {entry_id}",
            side.as_str()
        );
        Ok(entry_id.to_string())
    }
}
