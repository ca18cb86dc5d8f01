// Persistent bot state: one JSON record per deployment, loaded, mutated and
// saved as a unit per decision. Single writer process; no cross-process
// locking.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistentState {
    #[serde(default)]
    pub armed: bool,
    #[serde(default)]
    pub consec_losses: i64,
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Last processed breakout event id per symbol.
    #[serde(default)]
    pub last_events: HashMap<String, String>,
    /// Last notification time per symbol, epoch ms.
    #[serde(default)]
    pub last_notified_at: HashMap<String, i64>,
    /// Fields written by other/newer deployments round-trip verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersistentState {
    pub fn track_symbol(&mut self, symbol: &str) {
        if !self.symbols.iter().any(|s| s == symbol) {
            self.symbols.push(symbol.to_string());
        }
    }
}

/// JSON-file backed store. A missing or unreadable file loads as the
/// default state; saves go through a temp file and rename so a crash never
/// leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> PersistentState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return PersistentState::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    "STATE: corrupt state file {} ({err}), starting fresh",
                    self.path.display()
                );
                PersistentState::default()
            }
        }
    }

    pub fn save(&self, state: &PersistentState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating state dir {}", parent.display()))?;
            }
        }
        let payload = serde_json::to_string(state).context("serializing state")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)
            .with_context(|| format!("writing state to {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing state file {}", self.path.display()))?;
        Ok(())
    }

    /// Load, mutate, save as one unit.
    pub fn update<F>(&self, mutate: F) -> Result<PersistentState>
    where
        F: FnOnce(&mut PersistentState),
    {
        let mut state = self.load();
        mutate(&mut state);
        self.save(&state)?;
        Ok(state)
    }
}
