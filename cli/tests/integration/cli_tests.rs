//! Binary-level tests: argument parsing, version and failure reporting.

#![allow(clippy::expect_used, deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

fn dispatch() -> Command {
    let mut cmd = Command::cargo_bin("dispatch").expect("binary");
    cmd.env_remove("DISPATCH_MANAGER_URL").env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_commands() {
    dispatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("proxy"))
        .stdout(predicate::str::contains("manager"))
        .stdout(predicate::str::contains("agents"))
        .stdout(predicate::str::contains("memory"));
}

#[test]
fn test_no_arguments_prints_help() {
    dispatch()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_version_human() {
    dispatch()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("dispatch "));
}

#[test]
fn test_version_json() {
    let output = dispatch()
        .args(["version", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_agents_add_rejects_invalid_name_before_prompting() {
    dispatch()
        .args(["agents", "add", "Not Valid", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid agent name"));
}

#[test]
fn test_unreachable_manager_is_reported() {
    dispatch()
        .args(["--manager-url", "http://127.0.0.1:9", "agents", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Management API unreachable"));
}

#[test]
fn test_unreachable_manager_json_error() {
    let output = dispatch()
        .args(["--manager-url", "http://127.0.0.1:9", "--json", "memory"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "command_failed");
}

#[test]
fn test_proxy_without_cookie_secret_fails() {
    dispatch()
        .arg("proxy")
        .env_remove("DISPATCH_PROXY_COOKIE_SECRET")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DISPATCH_PROXY_"));
}

#[test]
fn test_proxy_with_short_cookie_secret_fails() {
    dispatch()
        .arg("proxy")
        .env("DISPATCH_PROXY_COOKIE_SECRET", "short")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cookie_secret"));
}
