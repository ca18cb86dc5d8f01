// Decision message rendering and deterministic event ids.

use crate::types::{BreakoutInfo, PlannedTrade};
use chrono::{TimeZone, Utc};

/// Deterministic id of a breakout event: symbol, breakout day (UTC), side,
/// level rounded to 4 decimals and level label. Two cycles seeing the same
/// breakout compute the same id, which drives the dedup suppression.
pub fn make_event_id(symbol: &str, breakout: &BreakoutInfo) -> String {
    let day = Utc
        .timestamp_millis_opt(breakout.ts)
        .single()
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|| breakout.ts.to_string());
    let level = (breakout.level * 10_000.0).round() / 10_000.0;
    format!(
        "{symbol}|{day}|{}|{level}|{}",
        breakout.side.as_str(),
        breakout.level_source
    )
}

/// Human-readable one-line decision message.
pub fn format_signal_message(symbol: &str, trade: &PlannedTrade, breakout: &BreakoutInfo) -> String {
    let vol_text = trade
        .meta
        .volume_ratio
        .map(|r| format!("{r:.2}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "[{symbol}] {} @ {:.4} SL={:.4} TP={:.4} break={:.2}% close={:.2}% vol={vol_text} level={}",
        trade.side.as_str().to_uppercase(),
        trade.entry,
        trade.sl,
        trade.tp,
        trade.meta.break_pct * 100.0,
        trade.meta.close_back_pct * 100.0,
        breakout.level_source
    )
}

/// Plain-text table for the replay report. Numeric cells are right-aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx < widths.len() {
                widths[idx] = widths[idx].max(cell.len());
            }
        }
    }

    let is_number = |cell: &str| {
        cell.trim_end_matches('%')
            .trim_start_matches('+')
            .parse::<f64>()
            .is_ok()
    };
    let fmt_row = |cells: &[String]| {
        cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let width = widths.get(idx).copied().unwrap_or(cell.len());
                if is_number(cell) {
                    format!("{cell:>width$}")
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let separator = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join("-+-");

    let mut lines = vec![fmt_row(&header_cells), separator];
    lines.extend(rows.iter().map(|row| fmt_row(row)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn breakout() -> BreakoutInfo {
        BreakoutInfo {
            side: Side::Long,
            level: 100.12341,
            level_source: "prev_low@2026-08-20".to_string(),
            level_age: 1,
            idx: 3,
            ts: 1_755_750_600_000, // 2025-08-21 04:30 UTC
            next_open: Some(100.4),
            break_pct: 0.005,
            close_back_pct: 0.0005,
            candle_open: 100.2,
            candle_high: 100.5,
            candle_low: 99.6,
            candle_close: 100.18,
            volume: 10.0,
            volume_ma: 20.0,
            wick_price: 99.6,
        }
    }

    #[test]
    fn event_id_is_deterministic_and_rounded() {
        let b = breakout();
        let id1 = make_event_id("ETHUSDT", &b);
        let id2 = make_event_id("ETHUSDT", &b);
        assert_eq!(id1, id2);
        assert!(id1.starts_with("ETHUSDT|"));
        assert!(id1.contains("|long|100.1234|prev_low@2026-08-20"), "{id1}");
    }

    #[test]
    fn event_id_distinguishes_levels() {
        let b = breakout();
        let mut other = breakout();
        other.level_source = "low@2026-08-14".to_string();
        assert_ne!(make_event_id("ETHUSDT", &b), make_event_id("ETHUSDT", &other));
    }
}
