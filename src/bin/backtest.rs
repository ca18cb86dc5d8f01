// Offline replay over public Binance klines. Prints the per-signal table
// and summary counters for the configured symbol.

use anyhow::Result;
use log::info;

use fakeout_bot::backtest::run_replay;
use fakeout_bot::binance::BinanceClient;
use fakeout_bot::config::load_config;
use fakeout_bot::marketdata::MarketDataService;
use fakeout_bot::strategy::FalseBreakoutStrategy;
use fakeout_bot::symbols::resolve_universe;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = load_config()?;
    let symbols = resolve_universe(&cfg);

    let client = BinanceClient::new(cfg.binance.clone())?;
    let market_data = MarketDataService::new(client);
    let strategy = FalseBreakoutStrategy::new(cfg.clone());

    for symbol in &symbols {
        info!("BACKTEST: fetching {symbol} klines");
        let bundle = market_data.fetch_bundle(symbol, &cfg).await?;
        let result = run_replay(&bundle.d1, &bundle.h4, &bundle.h1, &strategy);

        println!("\n=== {symbol} ===");
        if result.rows.is_empty() {
            println!("no signals");
        } else {
            println!("{}", result.render_rows());
        }
        println!(
            "signals={} filled={} tp={} sl={} nofill={} pnl={:+.1}R",
            result.signals, result.filled, result.tp, result.sl, result.nofill, result.pnl_r
        );
    }

    Ok(())
}
