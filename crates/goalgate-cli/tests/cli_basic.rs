//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the dev data
//! directory and verify exit codes and output shapes.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "goalgate-cli", "--"])
        .args(args)
        .env("GOALGATE_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_goal_list() {
    let (stdout, _, code) = run_cli(&["goal", "list"]);
    assert_eq!(code, 0, "goal list failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("goal list not JSON");
    assert!(parsed.get("goals").is_some());
}

#[test]
fn test_goal_add_then_list() {
    let (_, _, code) = run_cli(&["goal", "add", "--weekday", "3", "steps", "10000"]);
    assert_eq!(code, 0, "goal add failed");

    let (stdout, _, code) = run_cli(&["goal", "list", "--weekday", "3"]);
    assert_eq!(code, 0, "goal list failed");
    assert!(stdout.contains("steps"));
}

#[test]
fn test_goal_add_invalid_weekday() {
    let (_, _, code) = run_cli(&["goal", "add", "--weekday", "9", "steps", "10000"]);
    assert!(code != 0, "weekday 9 unexpectedly accepted");
}

#[test]
fn test_status() {
    let (stdout, _, code) = run_cli(&["status", "--steps", "500"]);
    assert_eq!(code, 0, "status failed");
    assert!(stdout.contains("gate:") || stdout.contains("authorization"));
}

#[test]
fn test_status_json() {
    let (stdout, _, code) = run_cli(&["status", "--json"]);
    assert_eq!(code, 0, "status --json failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("status not JSON");
    assert!(parsed.get("should_block").is_some());
}

#[test]
fn test_selection_show() {
    let (stdout, _, code) = run_cli(&["selection", "show"]);
    assert_eq!(code, 0, "selection show failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("selection not JSON");
    assert!(parsed.get("app_ids").is_some());
}

#[test]
fn test_pending_list() {
    let (stdout, _, code) = run_cli(&["pending", "list"]);
    assert_eq!(code, 0, "pending list failed");
    assert!(!stdout.is_empty());
}

#[test]
fn test_config_show() {
    let (stdout, _, code) = run_cli(&["config", "show"]);
    assert_eq!(code, 0, "config show failed");
    assert!(stdout.contains("timeout_secs"));
}

#[test]
fn test_config_set_unknown_key() {
    let (_, _, code) = run_cli(&["config", "set", "no.such.key", "1"]);
    assert!(code != 0, "unknown config key unexpectedly accepted");
}
