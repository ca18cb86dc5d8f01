// Configuration structures and loading logic.
//
// The configuration is an immutable value built once at startup: serde
// defaults, then an optional YAML file, then environment overrides. It is
// passed by reference into each component; nothing mutates it afterwards.

use anyhow::{anyhow, Result};
use serde::Deserialize;

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct TrendCfg {
    /// Daily SMA window for the D1 bias.
    #[serde(default = "default_d1_sma")]
    pub d1_sma: usize,
    /// Fast SMA window for the H4 bias.
    #[serde(default = "default_h4_fast")]
    pub h4_fast: usize,
    /// Slow SMA window for the H4 bias.
    #[serde(default = "default_h4_slow")]
    pub h4_slow: usize,
    /// When true, both biases must agree or no side is produced.
    /// When false, a disagreement falls back to the D1 bias alone.
    #[serde(default = "default_strict_trend")]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BreakoutCfg {
    /// Minimum wick penetration past the level, as a fraction of the level.
    #[serde(default = "default_penetration_min_pct")]
    pub penetration_min_pct: f64,
    /// Maximum wick penetration past the level.
    #[serde(default = "default_penetration_max_pct")]
    pub penetration_max_pct: f64,
    /// Maximum close-back distance on the safe side of the level.
    #[serde(default = "default_close_back_max_pct")]
    pub close_back_max_pct: f64,
    /// Window of the volume moving average used as the climax filter.
    #[serde(default = "default_volume_ma_length")]
    pub volume_ma_length: usize,
    /// Candles with volume above this multiple of the MA are rejected.
    #[serde(default = "default_volume_max_ratio")]
    pub volume_max_ratio: f64,
    /// How many prior days contribute high/low level candidates.
    #[serde(default = "default_level_lookback_days")]
    pub level_lookback_days: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerCfg {
    /// "next_open" | "level_offset"
    #[serde(default = "default_entry_mode")]
    pub entry_mode: String,
    /// Entry offset for level_offset mode, fraction of the level.
    #[serde(default = "default_entry_underfill_pct")]
    pub entry_underfill_pct: f64,
    /// "wick" | "level" | "level_pct"
    #[serde(default = "default_stop_mode")]
    pub stop_mode: String,
    /// Ticks placed beyond the breakout wick in wick mode.
    #[serde(default = "default_stop_wick_ticks")]
    pub stop_wick_ticks: u32,
    /// Stop distance from the level in level/level_pct mode.
    #[serde(default = "default_stop_level_pct")]
    pub stop_level_pct: f64,
    /// Target distance in risk multiples; floored at 0.1 when applied.
    #[serde(default = "default_risk_reward")]
    pub risk_reward: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerCfg {
    /// Suppress repeats of an identical computed breakout event id.
    #[serde(default = "default_dedup_by_breakout")]
    pub dedup_by_breakout: bool,
    /// Minimum hours between decisions for the same symbol; 0 disables.
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: f64,
    /// Render decisions without touching balance, positions or orders.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// Fraction of the available balance risked per trade.
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,
    /// Open-position cap before new entries are skipped; 0 = uncapped.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecCfg {
    /// Submit the entry as a post-only (GTX) limit order.
    #[serde(default = "default_post_only")]
    pub post_only: bool,
    #[serde(default = "default_tif")]
    pub tif: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BinanceCfg {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_futures_base")]
    pub futures_base: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppCfg {
    /// Fallback instrument when no universe is configured.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_tf_d1")]
    pub tf_d1: String,
    #[serde(default = "default_tf_h4")]
    pub tf_h4: String,
    #[serde(default = "default_tf_h1")]
    pub tf_h1: String,
    #[serde(default = "default_d1_limit")]
    pub d1_limit: u32,
    #[serde(default = "default_h4_limit")]
    pub h4_limit: u32,
    #[serde(default = "default_h1_limit")]
    pub h1_limit: u32,
    #[serde(default = "default_run_every_sec")]
    pub run_every_sec: u64,
    #[serde(default = "default_state_path")]
    pub state_path: String,
    #[serde(default)]
    pub trend: TrendCfg,
    #[serde(default)]
    pub breakout: BreakoutCfg,
    #[serde(default)]
    pub planner: PlannerCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub exec: ExecCfg,
    #[serde(default)]
    pub binance: BinanceCfg,
}

impl Default for TrendCfg {
    fn default() -> Self {
        Self {
            d1_sma: default_d1_sma(),
            h4_fast: default_h4_fast(),
            h4_slow: default_h4_slow(),
            strict: default_strict_trend(),
        }
    }
}

impl Default for BreakoutCfg {
    fn default() -> Self {
        Self {
            penetration_min_pct: default_penetration_min_pct(),
            penetration_max_pct: default_penetration_max_pct(),
            close_back_max_pct: default_close_back_max_pct(),
            volume_ma_length: default_volume_ma_length(),
            volume_max_ratio: default_volume_max_ratio(),
            level_lookback_days: default_level_lookback_days(),
        }
    }
}

impl Default for PlannerCfg {
    fn default() -> Self {
        Self {
            entry_mode: default_entry_mode(),
            entry_underfill_pct: default_entry_underfill_pct(),
            stop_mode: default_stop_mode(),
            stop_wick_ticks: default_stop_wick_ticks(),
            stop_level_pct: default_stop_level_pct(),
            risk_reward: default_risk_reward(),
        }
    }
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            dedup_by_breakout: default_dedup_by_breakout(),
            cooldown_hours: default_cooldown_hours(),
            dry_run: default_dry_run(),
            risk_pct: default_risk_pct(),
            max_open_positions: default_max_open_positions(),
        }
    }
}

impl Default for ExecCfg {
    fn default() -> Self {
        Self {
            post_only: default_post_only(),
            tif: default_tif(),
        }
    }
}

impl Default for BinanceCfg {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            futures_base: default_futures_base(),
            recv_window_ms: default_recv_window(),
        }
    }
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            symbols: Vec::new(),
            tf_d1: default_tf_d1(),
            tf_h4: default_tf_h4(),
            tf_h1: default_tf_h1(),
            d1_limit: default_d1_limit(),
            h4_limit: default_h4_limit(),
            h1_limit: default_h1_limit(),
            run_every_sec: default_run_every_sec(),
            state_path: default_state_path(),
            trend: TrendCfg::default(),
            breakout: BreakoutCfg::default(),
            planner: PlannerCfg::default(),
            runner: RunnerCfg::default(),
            exec: ExecCfg::default(),
            binance: BinanceCfg::default(),
        }
    }
}

// ============================================================================
// Default Value Functions
// ============================================================================

fn default_symbol() -> String {
    "ETHUSDT".to_string()
}

fn default_tf_d1() -> String {
    "1d".to_string()
}

fn default_tf_h4() -> String {
    "4h".to_string()
}

fn default_tf_h1() -> String {
    "1h".to_string()
}

fn default_d1_limit() -> u32 {
    200
}

fn default_h4_limit() -> u32 {
    400
}

fn default_h1_limit() -> u32 {
    300
}

fn default_run_every_sec() -> u64 {
    60
}

fn default_state_path() -> String {
    "logs/state.json".to_string()
}

fn default_d1_sma() -> usize {
    200
}

fn default_h4_fast() -> usize {
    50
}

fn default_h4_slow() -> usize {
    200
}

fn default_strict_trend() -> bool {
    false
}

fn default_penetration_min_pct() -> f64 {
    0.001 // 0.1% of the level
}

fn default_penetration_max_pct() -> f64 {
    0.007 // 0.7% of the level
}

fn default_close_back_max_pct() -> f64 {
    0.003 // 0.3% of the level
}

fn default_volume_ma_length() -> usize {
    20
}

fn default_volume_max_ratio() -> f64 {
    0.8 // reject climax candles above 0.8x the volume MA
}

fn default_level_lookback_days() -> usize {
    10
}

fn default_entry_mode() -> String {
    "next_open".to_string()
}

fn default_entry_underfill_pct() -> f64 {
    0.001
}

fn default_stop_mode() -> String {
    "wick".to_string()
}

fn default_stop_wick_ticks() -> u32 {
    3
}

fn default_stop_level_pct() -> f64 {
    0.005
}

fn default_risk_reward() -> f64 {
    3.0
}

fn default_dedup_by_breakout() -> bool {
    true
}

fn default_cooldown_hours() -> f64 {
    8.0
}

fn default_dry_run() -> bool {
    true
}

fn default_risk_pct() -> f64 {
    0.01 // 1% of available balance per trade
}

fn default_max_open_positions() -> u32 {
    3
}

fn default_post_only() -> bool {
    true
}

fn default_tif() -> String {
    "GTC".to_string()
}

fn default_futures_base() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_recv_window() -> u64 {
    5_000
}

// ============================================================================
// Tolerant Environment Parsing
// ============================================================================

/// Strip inline comments, trailing junk tokens and decimal commas from a
/// raw environment value. Returns None for an effectively empty value.
fn clean_env(raw: &str) -> Option<String> {
    let s = raw.split('#').next().unwrap_or("").trim();
    let s = s.split_whitespace().next().unwrap_or("");
    let s = s.replace(',', ".");
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parse a float, keeping `current` if the value is missing or malformed.
fn override_f64(raw: Option<String>, current: f64) -> f64 {
    raw.as_deref()
        .and_then(|v| clean_env(v))
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(current)
}

fn override_usize(raw: Option<String>, current: usize) -> usize {
    raw.as_deref()
        .and_then(|v| clean_env(v))
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as usize)
        .unwrap_or(current)
}

fn override_u32(raw: Option<String>, current: u32) -> u32 {
    raw.as_deref()
        .and_then(|v| clean_env(v))
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u32)
        .unwrap_or(current)
}

fn override_u64(raw: Option<String>, current: u64) -> u64 {
    raw.as_deref()
        .and_then(|v| clean_env(v))
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .unwrap_or(current)
}

fn override_bool(raw: Option<String>, current: bool) -> bool {
    let cleaned = match raw.as_deref().and_then(clean_env) {
        Some(v) => v.to_ascii_lowercase(),
        None => return current,
    };
    match cleaned.as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => true,
        "0" | "false" | "f" | "no" | "n" | "off" => false,
        other => other
            .parse::<f64>()
            .map(|v| v != 0.0)
            .unwrap_or(current),
    }
}

fn override_string(raw: Option<String>, current: String) -> String {
    raw.as_deref().and_then(clean_env).unwrap_or(current)
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Apply environment variable overrides on top of file/default values.
/// Malformed numeric values fall back to the value already in place
/// instead of failing startup.
pub fn apply_env_overrides(cfg: &mut AppCfg) {
    cfg.symbol = override_string(env("SYMBOL"), std::mem::take(&mut cfg.symbol));
    cfg.tf_d1 = override_string(env("TF_D1"), std::mem::take(&mut cfg.tf_d1));
    cfg.tf_h4 = override_string(env("TF_H4"), std::mem::take(&mut cfg.tf_h4));
    cfg.tf_h1 = override_string(env("TF_H1"), std::mem::take(&mut cfg.tf_h1));
    cfg.run_every_sec = override_u64(env("RUN_EVERY_SEC"), cfg.run_every_sec);
    cfg.state_path = override_string(env("STATE_PATH"), std::mem::take(&mut cfg.state_path));

    if let Some(raw) = env("UNIVERSE_SYMBOLS") {
        let list: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !list.is_empty() {
            cfg.symbols = list;
        }
    }

    cfg.trend.d1_sma = override_usize(env("D1_SMA"), cfg.trend.d1_sma);
    cfg.trend.h4_fast = override_usize(env("H4_FAST"), cfg.trend.h4_fast);
    cfg.trend.h4_slow = override_usize(env("H4_SLOW"), cfg.trend.h4_slow);
    cfg.trend.strict = override_bool(env("STRICT_TREND"), cfg.trend.strict);

    cfg.breakout.penetration_min_pct =
        override_f64(env("PENETRATION_MIN_PCT"), cfg.breakout.penetration_min_pct);
    cfg.breakout.penetration_max_pct =
        override_f64(env("PENETRATION_MAX_PCT"), cfg.breakout.penetration_max_pct);
    cfg.breakout.close_back_max_pct =
        override_f64(env("CLOSE_BACK_MAX_PCT"), cfg.breakout.close_back_max_pct);
    cfg.breakout.volume_ma_length =
        override_usize(env("VOLUME_MA_LENGTH"), cfg.breakout.volume_ma_length);
    cfg.breakout.volume_max_ratio =
        override_f64(env("VOLUME_MAX_RATIO"), cfg.breakout.volume_max_ratio);
    cfg.breakout.level_lookback_days =
        override_usize(env("LEVEL_LOOKBACK_DAYS"), cfg.breakout.level_lookback_days);

    cfg.planner.entry_mode =
        override_string(env("ENTRY_MODE"), std::mem::take(&mut cfg.planner.entry_mode));
    cfg.planner.entry_underfill_pct =
        override_f64(env("ENTRY_UNDERFILL_PCT"), cfg.planner.entry_underfill_pct);
    cfg.planner.stop_mode =
        override_string(env("STOP_MODE"), std::mem::take(&mut cfg.planner.stop_mode));
    cfg.planner.stop_wick_ticks =
        override_u32(env("STOP_WICK_TICKS"), cfg.planner.stop_wick_ticks);
    cfg.planner.stop_level_pct =
        override_f64(env("STOP_LEVEL_PCT"), cfg.planner.stop_level_pct);
    cfg.planner.risk_reward = override_f64(env("RR"), cfg.planner.risk_reward);

    cfg.runner.dedup_by_breakout =
        override_bool(env("DEDUP_BY_BREAKOUT"), cfg.runner.dedup_by_breakout);
    cfg.runner.cooldown_hours = override_f64(env("COOLDOWN_HOURS"), cfg.runner.cooldown_hours);
    cfg.runner.dry_run = override_bool(env("DRY_RUN"), cfg.runner.dry_run);
    cfg.runner.risk_pct = override_f64(env("RISK_PCT"), cfg.runner.risk_pct);
    cfg.runner.max_open_positions =
        override_u32(env("MAX_OPEN_POSITIONS"), cfg.runner.max_open_positions);

    cfg.exec.post_only = override_bool(env("POST_ONLY"), cfg.exec.post_only);
    cfg.exec.tif = override_string(env("TIME_IN_FORCE"), std::mem::take(&mut cfg.exec.tif));

    cfg.binance.api_key =
        override_string(env("BINANCE_API_KEY"), std::mem::take(&mut cfg.binance.api_key));
    cfg.binance.secret_key = override_string(
        env("BINANCE_SECRET_KEY"),
        std::mem::take(&mut cfg.binance.secret_key),
    );
    cfg.binance.futures_base = override_string(
        env("FUTURES_BASE"),
        std::mem::take(&mut cfg.binance.futures_base),
    );
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load application configuration.
///
/// Order: serde defaults, then the YAML file (`--config <path>` argument,
/// default `./config.yaml`; a missing file is fine), then environment
/// overrides, then validation. Validation failures are fatal at startup.
pub fn load_config() -> Result<AppCfg> {
    let args: Vec<String> = std::env::args().collect();
    let path = args
        .windows(2)
        .find_map(|w| {
            if w[0] == "--config" {
                Some(w[1].clone())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "./config.yaml".to_string());

    let mut cfg: AppCfg = match std::fs::read_to_string(&path) {
        Ok(content) => serde_yaml::from_str(&content)?,
        Err(_) => AppCfg::default(),
    };

    apply_env_overrides(&mut cfg);
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Validate configuration values. Only startup-fatal conditions live here;
/// anything recoverable already fell back to a default during parsing.
pub fn validate_config(cfg: &AppCfg) -> Result<()> {
    if cfg.trend.d1_sma == 0 || cfg.trend.h4_fast == 0 || cfg.trend.h4_slow == 0 {
        return Err(anyhow!("trend SMA windows must be positive"));
    }
    if cfg.breakout.penetration_min_pct < 0.0 || cfg.breakout.penetration_max_pct < 0.0 {
        return Err(anyhow!("penetration thresholds must be non-negative"));
    }
    if cfg.breakout.penetration_min_pct > cfg.breakout.penetration_max_pct {
        return Err(anyhow!(
            "penetration_min_pct ({}) exceeds penetration_max_pct ({})",
            cfg.breakout.penetration_min_pct,
            cfg.breakout.penetration_max_pct
        ));
    }
    if cfg.breakout.volume_ma_length == 0 {
        return Err(anyhow!("volume_ma_length must be positive"));
    }
    if cfg.breakout.level_lookback_days == 0 {
        return Err(anyhow!("level_lookback_days must be positive"));
    }
    if !(0.0..=1.0).contains(&cfg.runner.risk_pct) {
        return Err(anyhow!("risk_pct must be within [0, 1]"));
    }
    if cfg.run_every_sec == 0 {
        return Err(anyhow!("run_every_sec must be positive"));
    }

    match cfg.planner.entry_mode.as_str() {
        "next_open" | "level_offset" => {}
        other => return Err(anyhow!("unknown entry_mode '{}'", other)),
    }
    match cfg.planner.stop_mode.as_str() {
        "wick" | "level" | "level_pct" => {}
        other => return Err(anyhow!("unknown stop_mode '{}'", other)),
    }

    // Live trading needs credentials; dry-run only reads public endpoints.
    if !cfg.runner.dry_run
        && (cfg.binance.api_key.trim().is_empty() || cfg.binance.secret_key.trim().is_empty())
    {
        return Err(anyhow!(
            "BINANCE_API_KEY/BINANCE_SECRET_KEY are required when dry_run is disabled"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_env_strips_comments_and_junk() {
        assert_eq!(clean_env("0.10 # comment").as_deref(), Some("0.10"));
        assert_eq!(clean_env("0.10 .").as_deref(), Some("0.10"));
        assert_eq!(clean_env("0,5").as_deref(), Some("0.5"));
        assert_eq!(clean_env("   ").as_deref(), None);
        assert_eq!(clean_env("# only comment"), None);
    }

    #[test]
    fn malformed_numeric_override_keeps_current_value() {
        assert_eq!(override_f64(Some("garbage".into()), 0.007), 0.007);
        assert_eq!(override_f64(Some("0.01".into()), 0.007), 0.01);
        assert_eq!(override_f64(None, 0.007), 0.007);
        assert_eq!(override_usize(Some("200.0".into()), 50), 200);
    }

    #[test]
    fn bool_override_accepts_common_spellings() {
        assert!(override_bool(Some("yes".into()), false));
        assert!(override_bool(Some("On".into()), false));
        assert!(!override_bool(Some("0".into()), true));
        assert!(override_bool(Some("weird".into()), true));
        assert!(override_bool(Some("2".into()), false));
    }

    #[test]
    fn defaults_pass_validation() {
        validate_config(&AppCfg::default()).unwrap();
    }

    #[test]
    fn inverted_penetration_bounds_rejected() {
        let mut cfg = AppCfg::default();
        cfg.breakout.penetration_min_pct = 0.01;
        cfg.breakout.penetration_max_pct = 0.001;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn live_mode_requires_credentials() {
        let mut cfg = AppCfg::default();
        cfg.runner.dry_run = false;
        assert!(validate_config(&cfg).is_err());
        cfg.binance.api_key = "key".into();
        cfg.binance.secret_key = "secret".into();
        validate_config(&cfg).unwrap();
    }
}
