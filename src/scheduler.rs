// Fixed-interval cycle loop. Job errors are logged and the loop keeps
// ticking; the stop flag is only observed between cycles so a running
// cycle always completes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use tokio::time::{interval, MissedTickBehavior};

/// Shared stop flag for the scheduler loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `job` every `every` until `stop` is raised. The first tick fires
/// immediately; missed ticks are skipped rather than bursted.
pub async fn run_every<F, Fut>(every: Duration, stop: StopSignal, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if stop.is_stopped() {
            info!("SCHEDULER: stop requested, exiting loop");
            return;
        }
        if let Err(err) = job().await {
            warn!("SCHEDULER: cycle failed: {err:?}");
        }
        if stop.is_stopped() {
            info!("SCHEDULER: stop requested, exiting loop");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn loop_survives_job_errors_and_stops_cleanly() {
        let stop = StopSignal::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let job_counter = counter.clone();
        let job_stop = stop.clone();

        run_every(Duration::from_millis(1), stop.clone(), move || {
            let counter = job_counter.clone();
            let stop = job_stop.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 3 {
                    stop.stop();
                }
                anyhow::bail!("cycle error")
            }
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(stop.is_stopped());
    }
}
