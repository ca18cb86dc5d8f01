use crate::config::TrendCfg;
use crate::indicators::sma;
use crate::types::{Series, Side, Trend, TrendDirection};

/// SMA value at the last bar, or the last close itself while the window is
/// not yet filled. The substitution makes the bias comparison trivially Up
/// on short history; kept as an explicit branch so tests can target it.
fn sma_or_last_close(closes: &[f64], length: usize) -> f64 {
    let last_close = *closes.last().unwrap_or(&0.0);
    sma(closes, length)
        .last()
        .copied()
        .flatten()
        .unwrap_or(last_close)
}

/// Classify the directional bias on the daily and 4-hour timeframes.
pub fn detect_trend(d1: &Series, h4: &Series, cfg: &TrendCfg) -> Trend {
    let d1_closes = d1.closes();
    let last_close = *d1_closes.last().unwrap_or(&0.0);
    let last_sma = sma_or_last_close(&d1_closes, cfg.d1_sma);
    let d1_bias = if last_close >= last_sma {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };

    let h4_closes = h4.closes();
    let last_fast = sma_or_last_close(&h4_closes, cfg.h4_fast);
    let last_slow = sma_or_last_close(&h4_closes, cfg.h4_slow);
    let h4_bias = if last_fast >= last_slow {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };

    Trend {
        d1: d1_bias,
        h4: h4_bias,
    }
}

/// Turn a trend classification into a tradeable side.
///
/// Agreement wins outright. On disagreement, strict mode yields no side;
/// otherwise the daily bias alone decides.
pub fn determine_trade_side(trend: &Trend, strict: bool) -> Option<Side> {
    match (trend.d1, trend.h4) {
        (TrendDirection::Up, TrendDirection::Up) => Some(Side::Long),
        (TrendDirection::Down, TrendDirection::Down) => Some(Side::Short),
        (d1, _) if !strict => Some(match d1 {
            TrendDirection::Up => Side::Long,
            TrendDirection::Down => Side::Short,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::series_from_closes;

    fn cfg(d1_sma: usize, h4_fast: usize, h4_slow: usize) -> TrendCfg {
        TrendCfg {
            d1_sma,
            h4_fast,
            h4_slow,
            strict: false,
        }
    }

    #[test]
    fn rising_closes_classify_up_up() {
        let d1 = series_from_closes(&(1..=30).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let h4 = series_from_closes(&(1..=30).map(|i| 50.0 + i as f64).collect::<Vec<_>>());
        let trend = detect_trend(&d1, &h4, &cfg(10, 3, 8));
        assert_eq!(trend.d1, TrendDirection::Up);
        assert_eq!(trend.h4, TrendDirection::Up);
        assert_eq!(determine_trade_side(&trend, false), Some(Side::Long));
    }

    #[test]
    fn falling_closes_classify_down_down() {
        let d1 = series_from_closes(&(1..=30).map(|i| 200.0 - i as f64).collect::<Vec<_>>());
        let h4 = series_from_closes(&(1..=30).map(|i| 100.0 - i as f64).collect::<Vec<_>>());
        let trend = detect_trend(&d1, &h4, &cfg(10, 3, 8));
        assert_eq!(trend.d1, TrendDirection::Down);
        assert_eq!(trend.h4, TrendDirection::Down);
        assert_eq!(determine_trade_side(&trend, false), Some(Side::Short));
    }

    #[test]
    fn short_history_substitutes_last_close_and_degenerates_up() {
        // Two bars against a 200-bar window: the SMA is undefined, so the
        // last close substitutes and the comparison is trivially Up even
        // though prices are falling.
        let d1 = series_from_closes(&[100.0, 90.0]);
        let h4 = series_from_closes(&[100.0, 90.0]);
        let trend = detect_trend(&d1, &h4, &cfg(200, 50, 200));
        assert_eq!(trend.d1, TrendDirection::Up);
        assert_eq!(trend.h4, TrendDirection::Up);
    }

    #[test]
    fn disagreement_strict_yields_none_loose_follows_d1() {
        let trend = Trend {
            d1: TrendDirection::Up,
            h4: TrendDirection::Down,
        };
        assert_eq!(determine_trade_side(&trend, true), None);
        assert_eq!(determine_trade_side(&trend, false), Some(Side::Long));

        let trend = Trend {
            d1: TrendDirection::Down,
            h4: TrendDirection::Up,
        };
        assert_eq!(determine_trade_side(&trend, true), None);
        assert_eq!(determine_trade_side(&trend, false), Some(Side::Short));
    }
}
