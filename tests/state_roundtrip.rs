// Persistent state file behavior: tolerant loading, atomic saves and
// forward-compatible round-tripping of unknown fields.

use fakeout_bot::state::{PersistentState, StateStore};
use tempfile::tempdir;

#[test]
fn missing_file_loads_default() {
    let dir = tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    assert_eq!(store.load(), PersistentState::default());
}

#[test]
fn corrupt_file_loads_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json").unwrap();
    let store = StateStore::new(&path);
    assert_eq!(store.load(), PersistentState::default());
}

#[test]
fn save_creates_parent_dirs_and_leaves_no_temp_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("logs").join("state.json");
    let store = StateStore::new(&path);

    store
        .update(|state| {
            state.armed = true;
            state.track_symbol("ETHUSDT");
        })
        .unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = store.load();
    assert!(loaded.armed);
    assert_eq!(loaded.symbols, vec!["ETHUSDT"]);
}

#[test]
fn unknown_fields_survive_a_write_cycle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"armed":true,"consec_losses":2,"future_flag":{"nested":[1,2,3]}}"#,
    )
    .unwrap();

    let store = StateStore::new(&path);
    let loaded = store.load();
    assert!(loaded.armed);
    assert_eq!(loaded.consec_losses, 2);
    assert!(loaded.extra.contains_key("future_flag"));

    store
        .update(|state| {
            state
                .last_events
                .insert("ETHUSDT".to_string(), "event-1".to_string());
        })
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("future_flag"));
    assert!(raw.contains("event-1"));

    let reloaded = store.load();
    assert!(reloaded.extra.contains_key("future_flag"));
    assert_eq!(
        reloaded.last_events.get("ETHUSDT").map(String::as_str),
        Some("event-1")
    );
}

#[test]
fn track_symbol_is_idempotent() {
    let mut state = PersistentState::default();
    state.track_symbol("ETHUSDT");
    state.track_symbol("ETHUSDT");
    state.track_symbol("BTCUSDT");
    assert_eq!(state.symbols, vec!["ETHUSDT", "BTCUSDT"]);
}
