// Bounded retry in the market data service: timeout-class errors retry
// with backoff, anything else propagates after a single attempt.
// Paused runtime time so the backoff sleeps elapse instantly.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use fakeout_bot::marketdata::MarketDataService;
use fakeout_bot::test_utils::{flat_candle, MockKlineSource};

fn service_with_failures(messages: &[&str]) -> (MarketDataService<Arc<MockKlineSource>>, Arc<MockKlineSource>) {
    let source = Arc::new(MockKlineSource::new());
    source.set_series("1h", vec![flat_candle(0, 100.0, 1.0)]);
    source.fail_with(messages);
    (MarketDataService::new(source.clone()), source)
}

#[tokio::test(start_paused = true)]
async fn timeout_is_retried_and_recovers() {
    let (service, source) = service_with_failures(&["request timed out"]);

    let series = service
        .fetch_series("ETHUSDT", "1h", 10, None)
        .await
        .unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn non_timeout_error_propagates_after_one_attempt() {
    let (service, source) = service_with_failures(&["unknown symbol"]);

    let err = service
        .fetch_series("ETHUSDT", "1h", 10, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown symbol"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_retries_are_bounded_at_three_attempts() {
    let (service, source) = service_with_failures(&[
        "connect timeout",
        "connect timeout",
        "connect timeout",
    ]);

    let err = service
        .fetch_series("ETHUSDT", "1h", 10, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timeout"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}
