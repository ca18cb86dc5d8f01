// Trading universe resolution.

use crate::config::AppCfg;
use log::warn;

/// Uppercase, trim and dedupe a raw symbol list while keeping order.
/// When `allowed` is non-empty, symbols outside it are dropped with a
/// warning instead of failing the whole universe.
pub fn sanitize_symbols(raw: &[String], allowed: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for entry in raw {
        let symbol = entry.trim().to_uppercase();
        if symbol.is_empty() || !seen.insert(symbol.clone()) {
            continue;
        }
        if !allowed.is_empty() && !allowed.iter().any(|a| a == &symbol) {
            warn!("SYMBOLS: {symbol} not in allowed list, dropped");
            continue;
        }
        out.push(symbol);
    }
    out
}

/// Resolve the symbols a cycle iterates over: the configured universe when
/// present, otherwise the single fallback symbol.
pub fn resolve_universe(cfg: &AppCfg) -> Vec<String> {
    let universe = sanitize_symbols(&cfg.symbols, &[]);
    if !universe.is_empty() {
        return universe;
    }
    vec![cfg.symbol.trim().to_uppercase()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_uppercases_and_dedupes() {
        let raw = vec![
            " ethusdt ".to_string(),
            "BTCUSDT".to_string(),
            "ETHUSDT".to_string(),
            "".to_string(),
        ];
        assert_eq!(sanitize_symbols(&raw, &[]), vec!["ETHUSDT", "BTCUSDT"]);
    }

    #[test]
    fn sanitize_filters_against_allowed_list() {
        let raw = vec!["ETHUSDT".to_string(), "DOGEUSDT".to_string()];
        let allowed = vec!["ETHUSDT".to_string(), "BTCUSDT".to_string()];
        assert_eq!(sanitize_symbols(&raw, &allowed), vec!["ETHUSDT"]);
    }

    #[test]
    fn universe_falls_back_to_single_symbol() {
        let mut cfg = AppCfg::default();
        cfg.symbol = "solusdt".to_string();
        cfg.symbols.clear();
        assert_eq!(resolve_universe(&cfg), vec!["SOLUSDT"]);

        cfg.symbols = vec!["btcusdt".to_string(), "ethusdt".to_string()];
        assert_eq!(resolve_universe(&cfg), vec!["BTCUSDT", "ETHUSDT"]);
    }
}
