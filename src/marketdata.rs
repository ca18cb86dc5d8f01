// Market data retrieval with bounded retry for transient fetch errors.
// Only timeout-class failures are retried; anything else propagates
// immediately and isolates the failure to that symbol's cycle.

use crate::config::AppCfg;
use crate::types::{Candle, Series};
use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

const FETCH_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(700);

/// Raw kline provider seam; implemented by the Binance client and by test
/// doubles.
#[async_trait]
pub trait KlineSource: Send + Sync {
    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
        since: Option<i64>,
    ) -> Result<Vec<Candle>>;
}

#[async_trait]
impl<T: KlineSource + ?Sized> KlineSource for std::sync::Arc<T> {
    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
        since: Option<i64>,
    ) -> Result<Vec<Candle>> {
        (**self).fetch_klines(symbol, timeframe, limit, since).await
    }
}

/// D1/H4/H1 candle bundle for one symbol, refreshed every cycle.
#[derive(Debug, Clone)]
pub struct MarketBundle {
    pub d1: Series,
    pub h4: Series,
    pub h1: Series,
}

/// True for the transient error class worth retrying: request timeouts,
/// or provider messages that spell one out.
pub fn is_timeout_error(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(req_err) = cause.downcast_ref::<reqwest::Error>() {
            if req_err.is_timeout() {
                return true;
            }
        }
        let msg = cause.to_string().to_ascii_lowercase();
        if msg.contains("timeout") || msg.contains("timed out") {
            return true;
        }
    }
    false
}

pub struct MarketDataService<S: KlineSource> {
    source: S,
}

impl<S: KlineSource> MarketDataService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch one series, retrying timeout-class errors with linearly
    /// increasing backoff. Bounded at `FETCH_ATTEMPTS`.
    pub async fn fetch_series(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
        since: Option<i64>,
    ) -> Result<Series> {
        let mut last_err = None;
        for attempt in 0..FETCH_ATTEMPTS {
            match self
                .source
                .fetch_klines(symbol, timeframe, limit, since)
                .await
            {
                Ok(candles) => return Ok(Series::from_raw(candles)),
                Err(err) => {
                    let retryable = is_timeout_error(&err) && attempt + 1 < FETCH_ATTEMPTS;
                    if retryable {
                        let delay = BACKOFF_BASE * (attempt + 1);
                        warn!(
                            "MARKETDATA: {symbol} {timeframe} fetch timed out (attempt {}), retrying in {:?}",
                            attempt + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("{symbol} {timeframe} fetch retries exhausted")))
    }

    /// Fetch the full D1/H4/H1 bundle for one symbol.
    pub async fn fetch_bundle(&self, symbol: &str, cfg: &AppCfg) -> Result<MarketBundle> {
        let h1 = self
            .fetch_series(symbol, &cfg.tf_h1, cfg.h1_limit, None)
            .await?;
        let d1 = self
            .fetch_series(symbol, &cfg.tf_d1, cfg.d1_limit, None)
            .await?;
        let h4 = self
            .fetch_series(symbol, &cfg.tf_h4, cfg.h4_limit, None)
            .await?;
        Ok(MarketBundle { d1, h4, h1 })
    }
}
