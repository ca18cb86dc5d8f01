// End-to-end properties of the signal pipeline stages: level collection,
// false-breakout filtering, trade planning and determinism.

use fakeout_bot::config::{AppCfg, BreakoutCfg, PlannerCfg};
use fakeout_bot::strategy::{
    collect_level_candidates, find_false_breakouts_for_day, plan_trade, FalseBreakoutStrategy,
    StrategyContext,
};
use fakeout_bot::test_utils::{candle, daily_series, flat_candle, series_from_closes, DAY_MS, HOUR_MS};
use fakeout_bot::types::{BreakoutInfo, LevelCandidate, Series, Side};

fn breakout_cfg() -> BreakoutCfg {
    BreakoutCfg {
        volume_ma_length: 3,
        ..BreakoutCfg::default()
    }
}

fn long_level(value: f64, age: usize) -> LevelCandidate {
    LevelCandidate {
        value,
        side: Side::Long,
        ts: 0,
        label: format!("low@age{age}"),
        age,
    }
}

/// Warmup volume 10 so the MA at the probe candle is well defined.
fn window_with(probe: fakeout_bot::types::Candle) -> Series {
    let base = probe.ts - 3 * HOUR_MS;
    Series::from_raw(vec![
        flat_candle(base, 100.5, 10.0),
        flat_candle(base + HOUR_MS, 100.5, 10.0),
        flat_candle(base + 2 * HOUR_MS, 100.5, 10.0),
        probe,
    ])
}

#[test]
fn level_collection_counts_and_ages() {
    let extremes: Vec<(f64, f64)> = (0..12)
        .map(|i| (110.0 + i as f64, 90.0 + i as f64))
        .collect();
    let d1 = daily_series(&extremes);

    let levels = collect_level_candidates(&d1, 11, 10);
    assert_eq!(levels.len(), 20);

    // Nearest day first, two candidates per day, ages 1..=10.
    let ages: Vec<usize> = levels.iter().map(|l| l.age).collect();
    let expected: Vec<usize> = (1..=10).flat_map(|a| [a, a]).collect();
    assert_eq!(ages, expected);

    assert!(levels[0].label.starts_with("prev_high@"));
    assert!(levels[1].label.starts_with("prev_low@"));
    assert_eq!(levels[0].side, Side::Short);
    assert_eq!(levels[1].side, Side::Long);
    assert_eq!(levels[0].value, 120.0);
    assert_eq!(levels[1].value, 100.0);

    // A shallow history yields two candidates per available prior day.
    assert_eq!(collect_level_candidates(&d1, 3, 10).len(), 6);
    assert!(collect_level_candidates(&d1, 0, 10).is_empty());
    assert!(collect_level_candidates(&d1, 12, 10).is_empty());
}

#[test]
fn worked_example_is_accepted() {
    // Level 100 long, wick to 99.5 (0.5% penetration), close 100.05 (0.05%
    // close-back), volume at half the moving average.
    let h1 = window_with(candle(3 * HOUR_MS, 100.2, 100.4, 99.5, 100.05, 5.0));
    let levels = [long_level(100.0, 1)];

    let events =
        find_false_breakouts_for_day(&h1, &levels, 3 * HOUR_MS, None, Some(Side::Long), &breakout_cfg());
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.side, Side::Long);
    assert!((event.break_pct - 0.005).abs() < 1e-9);
    assert!((event.close_back_pct - 0.0005).abs() < 1e-9);
    assert_eq!(event.wick_price, 99.5);
    assert_eq!(event.next_open, None);
}

#[test]
fn filters_reject_out_of_band_candles() {
    let cfg = breakout_cfg();
    let levels = [long_level(100.0, 1)];
    let scan = |probe| {
        find_false_breakouts_for_day(
            &window_with(probe),
            &levels,
            3 * HOUR_MS,
            None,
            Some(Side::Long),
            &cfg,
        )
    };

    // Penetration above the 0.7% cap.
    assert!(scan(candle(3 * HOUR_MS, 100.2, 100.4, 99.2, 100.05, 5.0)).is_empty());
    // Penetration below the 0.1% floor.
    assert!(scan(candle(3 * HOUR_MS, 100.2, 100.4, 99.95, 100.05, 5.0)).is_empty());
    // Closed back outside the level.
    assert!(scan(candle(3 * HOUR_MS, 100.2, 100.4, 99.5, 99.9, 5.0)).is_empty());
    // Close-back distance above the 0.3% cap.
    assert!(scan(candle(3 * HOUR_MS, 100.2, 100.6, 99.5, 100.4, 5.0)).is_empty());
    // Climax volume above 0.8x the moving average.
    assert!(scan(candle(3 * HOUR_MS, 100.2, 100.4, 99.5, 100.05, 30.0)).is_empty());
    // Wrong side for the allowed direction.
    let short_only = find_false_breakouts_for_day(
        &window_with(candle(3 * HOUR_MS, 100.2, 100.4, 99.5, 100.05, 5.0)),
        &levels,
        3 * HOUR_MS,
        None,
        Some(Side::Short),
        &cfg,
    );
    assert!(short_only.is_empty());
}

#[test]
fn one_event_per_level_and_stable_ordering() {
    // Two qualifying candles for the same level: only the first is reported.
    let base = 3 * HOUR_MS;
    let h1 = Series::from_raw(vec![
        flat_candle(0, 100.5, 10.0),
        flat_candle(HOUR_MS, 100.5, 10.0),
        flat_candle(2 * HOUR_MS, 100.5, 10.0),
        candle(base, 100.2, 100.4, 99.5, 100.05, 5.0),
        candle(base + HOUR_MS, 100.1, 100.3, 99.6, 100.1, 5.0),
    ]);
    let levels = [long_level(100.0, 1)];
    let events =
        find_false_breakouts_for_day(&h1, &levels, base, None, Some(Side::Long), &breakout_cfg());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].ts, base);

    // Two levels triggered by the same candle sort youngest age first.
    let levels = [long_level(99.8, 2), long_level(100.0, 1)];
    let events =
        find_false_breakouts_for_day(&h1, &levels, base, None, Some(Side::Long), &breakout_cfg());
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].level_age, 1);
    assert_eq!(events[1].level_age, 2);
    assert_eq!(events[0].ts, events[1].ts);
}

fn sample_breakout() -> BreakoutInfo {
    BreakoutInfo {
        side: Side::Long,
        level: 100.0,
        level_source: "prev_low@1970-01-01".to_string(),
        level_age: 1,
        idx: 3,
        ts: 3 * HOUR_MS,
        next_open: Some(100.0),
        break_pct: 0.005,
        close_back_pct: 0.0005,
        candle_open: 100.2,
        candle_high: 100.4,
        candle_low: 99.5,
        candle_close: 100.05,
        volume: 5.0,
        volume_ma: 10.0,
        wick_price: 99.5,
    }
}

#[test]
fn planner_worked_example_rr3() {
    // Entry 100, stop at 1% below the level (99): target is 3R away at 103.
    let cfg = PlannerCfg {
        stop_mode: "level_pct".to_string(),
        stop_level_pct: 0.01,
        risk_reward: 3.0,
        ..PlannerCfg::default()
    };
    let trade = plan_trade(&sample_breakout(), 0.01, &cfg).unwrap();
    assert_eq!(trade.side, Side::Long);
    assert!((trade.entry - 100.0).abs() < 1e-9);
    assert!((trade.sl - 99.0).abs() < 1e-9);
    assert!((trade.tp - 103.0).abs() < 1e-9);
    assert!(trade.risk_amount() > 0.0);
    assert_eq!(trade.meta.volume_ratio, Some(0.5));
}

#[test]
fn planner_clamps_entry_on_wrong_side_of_stop() {
    // next_open below the level-based stop: the entry is clamped back to
    // the level and the plan keeps strictly positive risk.
    let mut breakout = sample_breakout();
    breakout.next_open = Some(98.0);
    let cfg = PlannerCfg {
        stop_mode: "level_pct".to_string(),
        stop_level_pct: 0.01,
        ..PlannerCfg::default()
    };
    let trade = plan_trade(&breakout, 0.01, &cfg).unwrap();
    assert!((trade.entry - 100.0).abs() < 1e-9);
    assert!(trade.entry > trade.sl);
    assert!(trade.risk_amount() > 0.0);
}

#[test]
fn pipeline_is_deterministic() {
    let mut cfg = AppCfg::default();
    cfg.breakout.volume_ma_length = 3;
    let strategy = FalseBreakoutStrategy::new(cfg);

    let d1 = daily_series(&[(105.0, 100.0), (103.0, 99.4), (102.0, 99.5)]);
    let h4 = series_from_closes(&(0..12).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
    let day2 = 2 * DAY_MS;
    let h1 = Series::from_raw(vec![
        flat_candle(day2 - 3 * HOUR_MS, 100.5, 10.0),
        flat_candle(day2 - 2 * HOUR_MS, 100.5, 10.0),
        flat_candle(day2 - HOUR_MS, 100.5, 10.0),
        candle(day2, 100.2, 100.4, 99.5, 100.05, 5.0),
        candle(day2 + HOUR_MS, 100.1, 100.3, 100.05, 100.2, 10.0),
    ]);
    let ctx = StrategyContext { d1, h4, h1 };

    let run = || {
        let trend = strategy.detect_trend(&ctx);
        let side = strategy.determine_side(&trend)?;
        let levels = strategy.collect_levels(&ctx, 2);
        let breakout = strategy
            .find_breakouts(&ctx, &levels, day2, None, Some(side))
            .into_iter()
            .next()?;
        strategy.plan_trade(&breakout, 0.01)
    };

    let first = run().expect("pipeline yields a plan");
    let second = run().expect("pipeline yields a plan");
    assert_eq!(first, second);
    assert_eq!(first.side, Side::Long);
    assert!(first.entry > first.sl);
    assert!(first.tp > first.entry);
}
