use crate::types::{LevelCandidate, Series, Side};
use chrono::{TimeZone, Utc};

fn day_of(ts: i64) -> String {
    Utc.timestamp_millis_opt(ts)
        .single()
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Collect breakout level candidates from the daily extremes strictly
/// before `day_idx`, nearest day first.
///
/// Each prior day contributes two candidates: its high (triggers a short on
/// a false breakout above) and its low (triggers a long). Ages run from 1
/// (previous day) up to `lookback`. Overlapping price values are kept;
/// downstream scoring treats every level independently.
pub fn collect_level_candidates(
    d1: &Series,
    day_idx: usize,
    lookback: usize,
) -> Vec<LevelCandidate> {
    if day_idx == 0 || day_idx >= d1.len() {
        return Vec::new();
    }

    let start = day_idx.saturating_sub(lookback);
    let mut levels = Vec::with_capacity(2 * (day_idx - start));

    for i in (start..day_idx).rev() {
        let row = match d1.get(i) {
            Some(c) => c,
            None => continue,
        };
        let age = day_idx - i;
        let (label_high, label_low) = if age == 1 {
            ("prev_high", "prev_low")
        } else {
            ("high", "low")
        };
        let day = day_of(row.ts);
        levels.push(LevelCandidate {
            value: row.high,
            side: Side::Short,
            ts: row.ts,
            label: format!("{label_high}@{day}"),
            age,
        });
        levels.push(LevelCandidate {
            value: row.low,
            side: Side::Long,
            ts: row.ts,
            label: format!("{label_low}@{day}"),
            age,
        });
    }

    levels
}
