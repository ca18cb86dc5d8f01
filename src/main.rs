use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::info;

use fakeout_bot::binance::BinanceClient;
use fakeout_bot::config::load_config;
use fakeout_bot::exchange::LogNotifier;
use fakeout_bot::marketdata::MarketDataService;
use fakeout_bot::scheduler::{run_every, StopSignal};
use fakeout_bot::state::StateStore;
use fakeout_bot::symbols::resolve_universe;
use fakeout_bot::SignalRunner;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = load_config()?;
    let symbols = resolve_universe(&cfg);
    info!(
        "MAIN: starting (dry_run={}, every={}s, symbols={symbols:?})",
        cfg.runner.dry_run, cfg.run_every_sec
    );

    let client = Arc::new(BinanceClient::new(cfg.binance.clone())?);
    if let Err(err) = client.warm_filters(&symbols).await {
        log::warn!("MAIN: filter warmup failed, using default precision: {err:?}");
    }

    let state_store = StateStore::new(&cfg.state_path);
    let runner = Arc::new(SignalRunner::new(
        cfg.clone(),
        MarketDataService::new(client.clone()),
        client.clone(),
        client,
        LogNotifier,
        state_store,
    ));

    let stop = StopSignal::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("MAIN: shutdown requested");
            ctrl_c_stop.stop();
        }
    });

    let every = Duration::from_secs(cfg.run_every_sec);
    run_every(every, stop, move || {
        let runner = runner.clone();
        let symbols = symbols.clone();
        async move {
            runner.run_cycle(&symbols).await;
            Ok(())
        }
    })
    .await;

    info!("MAIN: stopped");
    Ok(())
}
