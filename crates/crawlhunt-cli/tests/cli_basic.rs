//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. Each run gets
//! its own HOME so the user's config is never touched.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "crawlhunt-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env_remove("CRAWLHUNT_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_distance() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["distance", "25.0", "-80.0", "25.0005", "-80.0"]);
    assert_eq!(code, 0, "distance failed");
    let meters: f64 = stdout.trim().parse().unwrap();
    assert!((meters - 55.6).abs() < 1.0);
}

#[test]
fn test_distance_rejects_invalid_coordinate() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["distance", "95.0", "0", "0", "0"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("invalid coordinate"));
}

#[test]
fn test_config_set_get() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "geofence.max_regions"]);
    assert_eq!(code, 0, "config get failed");
    assert_eq!(stdout.trim(), "20");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "geofence.max_regions", "10"]);
    assert_eq!(code, 0, "config set failed");

    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "geofence.max_regions"]);
    assert_eq!(stdout.trim(), "10");
    assert!(home.path().join(".config/crawlhunt/config.toml").exists());
}

#[test]
fn test_config_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "no.such.key"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_config_list_json() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0, "config list failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["challenge"]["expiry_minutes"], 60);
}

#[test]
fn test_config_keys_lists_dotted_values() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "keys"]);
    assert_eq!(code, 0, "config keys failed");
    assert!(stdout.lines().any(|line| line == "geofence.max_regions = 20"));
    assert!(stdout.lines().any(|line| line == "challenge.expiry_minutes = 60"));
    assert!(stdout.lines().all(|line| line.contains(" = ")));
}

#[test]
fn test_config_reset_requires_confirmation() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "geofence.max_regions", "7"]);
    assert_eq!(code, 0, "config set failed");

    let (_, stderr, code) = run_cli(home.path(), &["config", "reset"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("geofence.max_regions"));
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "geofence.max_regions"]);
    assert_eq!(stdout.trim(), "7");

    let (stdout, _, code) = run_cli(home.path(), &["config", "reset", "--yes"]);
    assert_eq!(code, 0, "config reset failed");
    assert!(stdout.contains("reset 1 key(s)"));
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "geofence.max_regions"]);
    assert_eq!(stdout.trim(), "20");
}

#[test]
fn test_simulate_script() {
    let home = tempfile::tempdir().unwrap();
    let script = home.path().join("session.json");
    std::fs::write(
        &script,
        r#"[
            {"type": "authorization_changed", "status": "authorized_when_in_use"},
            {"type": "start_location_updates"},
            {"type": "location_updated", "sample": {
                "coordinate": {"latitude": 25.123, "longitude": -80.456},
                "horizontal_accuracy": 5.0,
                "timestamp": "2026-03-01T21:00:00Z"}},
            {"type": "monitor_region", "identifier": "bar-1",
             "latitude": 25.123, "longitude": -80.456, "radius": 50.0},
            {"type": "region_entered", "identifier": "bar-1"},
            {"type": "save_for_sync", "kind": "visit", "entity_id": "visit-1"},
            {"type": "try_sync"}
        ]"#,
    )
    .unwrap();

    let (stdout, _, code) = run_cli(
        home.path(),
        &["simulate", script.to_str().unwrap(), "--online"],
    );
    assert_eq!(code, 0, "simulate failed");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["geofence"]["entered_region_identifiers"][0], "bar-1");
    assert_eq!(report["location"]["is_updating"], true);
    assert_eq!(report["sync"]["pending_sync_count"], 0);
    assert_eq!(report["outcomes"][0]["outcome"], "synced");
}
