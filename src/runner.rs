// SignalRunner: the per-symbol decision state machine.
//
// Per cycle a symbol moves through NoCandidate -> Candidate ->
// {Suppressed(dup|cooldown), Decided(dry-run|skip:<reason>|executed)}.
// The runner is the only stateful, side-effecting stage: it owns the
// persistent state record and commits the event id *before* touching the
// exchange, so a crash or order error never replays the same breakout.

use crate::config::AppCfg;
use crate::exchange::{
    calc_qty_from_risk, BracketOptions, ExchangeGateway, InstrumentPrecision, Notifier,
};
use crate::marketdata::{KlineSource, MarketDataService};
use crate::reporting::{format_signal_message, make_event_id};
use crate::state::StateStore;
use crate::strategy::{FalseBreakoutStrategy, StrategyContext};
use crate::types::{BreakoutInfo, PlannedTrade};
use anyhow::Result;
use chrono::Utc;
use log::{info, warn};

/// A planned trade plus the breakout that produced it, before the dedup
/// and cooldown gates.
#[derive(Debug, Clone)]
pub struct SignalCandidate {
    pub symbol: String,
    pub breakout: BreakoutInfo,
    pub trade: PlannedTrade,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    /// Same computed event id as the previous decision for this symbol.
    Duplicate,
    /// Cooldown window since the last notification has not elapsed.
    Cooldown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecision {
    pub symbol: String,
    pub message: String,
    pub executed: bool,
    pub skip_reason: Option<String>,
}

/// Outcome of one symbol's cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerOutcome {
    /// No trend side, no breakout, or no valid plan.
    NoCandidate,
    /// A candidate existed but produced no output at all.
    Suppressed(SuppressReason),
    Decided(SignalDecision),
}

pub struct SignalRunner<S, G, P, N>
where
    S: KlineSource,
    G: ExchangeGateway,
    P: InstrumentPrecision,
    N: Notifier,
{
    cfg: AppCfg,
    strategy: FalseBreakoutStrategy,
    market_data: MarketDataService<S>,
    gateway: G,
    precision: P,
    notifier: N,
    state_store: StateStore,
}

impl<S, G, P, N> SignalRunner<S, G, P, N>
where
    S: KlineSource,
    G: ExchangeGateway,
    P: InstrumentPrecision,
    N: Notifier,
{
    pub fn new(
        cfg: AppCfg,
        market_data: MarketDataService<S>,
        gateway: G,
        precision: P,
        notifier: N,
        state_store: StateStore,
    ) -> Self {
        let strategy = FalseBreakoutStrategy::new(cfg.clone());
        Self {
            cfg,
            strategy,
            market_data,
            gateway,
            precision,
            notifier,
            state_store,
        }
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }

    fn cooldown_passed(&self, last_notified_ms: Option<i64>, now_ms: i64) -> bool {
        let hours = self.cfg.runner.cooldown_hours;
        if hours <= 0.0 {
            return true;
        }
        match last_notified_ms {
            Some(last) => (now_ms - last) as f64 >= hours * 3_600_000.0,
            None => true,
        }
    }

    /// Steps 1-6: bundle fetch, trend, levels, breakout scan, plan, and
    /// instrument-precision rounding. Pure with respect to persistent
    /// state.
    pub async fn analyze_symbol(&self, symbol: &str) -> Result<Option<SignalCandidate>> {
        let bundle = self.market_data.fetch_bundle(symbol, &self.cfg).await?;

        if bundle.d1.len() < 2 {
            return Ok(None);
        }
        let day_idx = bundle.d1.len() - 1;
        let day_start_ts = match bundle.d1.get(day_idx) {
            Some(c) => c.ts,
            None => return Ok(None),
        };
        // The live cycle scans the still-open day, so there is no next
        // daily candle and the window runs to the end of the H1 series.
        let end_ts = None;

        let ctx = StrategyContext {
            d1: bundle.d1.head(day_idx + 1),
            h4: bundle.h4,
            h1: bundle.h1,
        };

        let trend = self.strategy.detect_trend(&ctx);
        let side = match self.strategy.determine_side(&trend) {
            Some(side) => side,
            None => return Ok(None),
        };

        let levels = self.strategy.collect_levels(&ctx, day_idx);
        let breakouts = self
            .strategy
            .find_breakouts(&ctx, &levels, day_start_ts, end_ts, Some(side));
        let breakout = match breakouts.into_iter().next() {
            Some(b) => b,
            None => return Ok(None),
        };

        let tick = self.precision.tick_size(symbol);
        let mut trade = match self.strategy.plan_trade(&breakout, tick) {
            Some(t) => t,
            None => return Ok(None),
        };
        trade.entry = self.precision.round_price(symbol, trade.entry);
        trade.sl = self.precision.round_price(symbol, trade.sl);
        trade.tp = self.precision.round_price(symbol, trade.tp);

        Ok(Some(SignalCandidate {
            symbol: symbol.to_string(),
            breakout,
            trade,
        }))
    }

    /// Steps 7-13: dedup, cooldown, commit-before-act, then the execution
    /// path (dry-run / position cap / balance / sizing / bracket order).
    pub async fn process_signal(&self, candidate: &SignalCandidate) -> Result<RunnerOutcome> {
        let symbol = candidate.symbol.as_str();
        let event_id = make_event_id(symbol, &candidate.breakout);
        let now_ms = Utc::now().timestamp_millis();

        let state = self.state_store.load();
        if self.cfg.runner.dedup_by_breakout
            && state.last_events.get(symbol) == Some(&event_id)
        {
            return Ok(RunnerOutcome::Suppressed(SuppressReason::Duplicate));
        }
        if !self.cooldown_passed(state.last_notified_at.get(symbol).copied(), now_ms) {
            return Ok(RunnerOutcome::Suppressed(SuppressReason::Cooldown));
        }

        // Commit before act: persist the event id and notification time
        // ahead of any exchange call. Duplicate-order risk outweighs
        // missed-signal risk, so there is no rollback when execution
        // fails below.
        self.state_store.update(|state| {
            state.track_symbol(symbol);
            state.last_events.insert(symbol.to_string(), event_id.clone());
            state.last_notified_at.insert(symbol.to_string(), now_ms);
        })?;

        let message = format_signal_message(symbol, &candidate.trade, &candidate.breakout);

        if self.cfg.runner.dry_run {
            let text = format!("{message}  [DRY_RUN]");
            self.notifier.send_text(&text);
            return Ok(RunnerOutcome::Decided(SignalDecision {
                symbol: symbol.to_string(),
                message: text,
                executed: false,
                skip_reason: None,
            }));
        }

        // An unverifiable position cap must not pass: a failed query aborts
        // this symbol's cycle (the event id stays committed).
        let max_positions = self.cfg.runner.max_open_positions as usize;
        if max_positions > 0 {
            let open = self.gateway.open_position_count().await?;
            if open >= max_positions {
                let reason = format!("positions>={max_positions}");
                let text = format!("{message}  [SKIP: {reason}]");
                self.notifier.send_text(&text);
                return Ok(RunnerOutcome::Decided(SignalDecision {
                    symbol: symbol.to_string(),
                    message: text,
                    executed: false,
                    skip_reason: Some(reason),
                }));
            }
        }

        let balance = match self.gateway.fetch_available_balance().await {
            Ok(balance) => balance,
            Err(err) => {
                let text = format!("{message}  [BALANCE ERROR: {err}]");
                self.notifier.send_text(&text);
                return Ok(RunnerOutcome::Decided(SignalDecision {
                    symbol: symbol.to_string(),
                    message: text,
                    executed: false,
                    skip_reason: Some("balance".to_string()),
                }));
            }
        };

        let raw_qty = calc_qty_from_risk(
            balance,
            candidate.trade.entry,
            candidate.trade.sl,
            self.cfg.runner.risk_pct,
            0.0,
        );
        let qty = self.precision.round_qty(symbol, raw_qty);
        if qty <= 0.0 {
            let text = format!("{message}  [SKIP: qty<=0]");
            self.notifier.send_text(&text);
            return Ok(RunnerOutcome::Decided(SignalDecision {
                symbol: symbol.to_string(),
                message: text,
                executed: false,
                skip_reason: Some("qty".to_string()),
            }));
        }

        let opts = BracketOptions {
            post_only: self.cfg.exec.post_only,
            tif: self.cfg.exec.tif.clone(),
        };
        match self
            .gateway
            .place_bracket_order(
                symbol,
                candidate.trade.side,
                qty,
                candidate.trade.entry,
                candidate.trade.sl,
                candidate.trade.tp,
                &opts,
            )
            .await
        {
            Ok(order_id) => {
                info!("RUNNER: order sent for {symbol}: {order_id}");
                let text = format!("{message}  [ORDER SENT qty={qty}]");
                self.notifier.send_text(&text);
                Ok(RunnerOutcome::Decided(SignalDecision {
                    symbol: symbol.to_string(),
                    message: text,
                    executed: true,
                    skip_reason: None,
                }))
            }
            Err(err) => {
                // The event id stays committed; this breakout will not be
                // retried on the next cycle.
                warn!("RUNNER: order submission failed for {symbol}: {err:?}");
                let text = format!("{message}  [ORDER ERROR: {err}]");
                self.notifier.send_text(&text);
                Ok(RunnerOutcome::Decided(SignalDecision {
                    symbol: symbol.to_string(),
                    message: text,
                    executed: false,
                    skip_reason: Some("order".to_string()),
                }))
            }
        }
    }

    /// Full cycle for one symbol.
    pub async fn check_symbol(&self, symbol: &str) -> Result<RunnerOutcome> {
        match self.analyze_symbol(symbol).await? {
            Some(candidate) => self.process_signal(&candidate).await,
            None => Ok(RunnerOutcome::NoCandidate),
        }
    }

    /// One scheduler tick: symbols strictly sequential, per-symbol failures
    /// logged and isolated so the rest of the universe still processes.
    pub async fn run_cycle(&self, symbols: &[String]) {
        for symbol in symbols {
            match self.check_symbol(symbol).await {
                Ok(RunnerOutcome::Decided(decision)) => {
                    info!(
                        "RUNNER: {symbol} decided (executed={}, skip={:?})",
                        decision.executed, decision.skip_reason
                    );
                }
                Ok(RunnerOutcome::Suppressed(reason)) => {
                    info!("RUNNER: {symbol} suppressed ({reason:?})");
                }
                Ok(RunnerOutcome::NoCandidate) => {}
                Err(err) => {
                    warn!("RUNNER: {symbol} cycle failed: {err:?}");
                }
            }
        }
    }
}
