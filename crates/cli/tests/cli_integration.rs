//! CLI integration tests for the `item` and `test` subcommands.
//!
//! Uses `assert_cmd` to spawn the `respro` binary and verify
//! exit codes, stdout content, and stderr content.
//!
//! All tests set `current_dir` to the workspace root so that relative
//! paths to test fixtures resolve correctly.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `respro` binary, rooted at workspace.
fn respro() -> Command {
    let mut cmd = cargo_bin_cmd!("respro");
    cmd.current_dir(workspace_root());
    cmd
}

const FIXTURES: &str = "crates/cli/tests/fixtures";

fn fixture(name: &str) -> String {
    format!("{}/{}", FIXTURES, name)
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.output().expect("run respro");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("stdout is JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    respro()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Response, outcome and template processing"));
}

#[test]
fn version_exits_0() {
    respro()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("respro"));
}

#[test]
fn item_help_mentions_responses() {
    respro()
        .args(["item", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--responses"));
}

// ──────────────────────────────────────────────
// 2. Item subcommand
// ──────────────────────────────────────────────

#[test]
fn item_correct_response_scores_1() {
    respro()
        .args([
            "item",
            fixture("choice_item.json").as_str(),
            "--responses",
            fixture("choice_correct.responses.json").as_str(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("SCORE = 1.0"))
        .stdout(predicate::str::contains("Signal: continue"));
}

#[test]
fn item_without_responses_keeps_default_score() {
    let json = stdout_json(respro().args(["item", fixture("choice_item.json").as_str(), "--output", "json"]));
    assert_eq!(json["item"], "choice");
    assert_eq!(json["variables"]["outcomes"]["SCORE"], serde_json::json!(0.0));
    assert_eq!(json["variables"]["responses"]["RESPONSE"], serde_json::Value::Null);
    assert_eq!(json["template"], serde_json::Value::Null);
}

#[test]
fn item_wrong_response_type_exits_1() {
    respro()
        .args([
            "item",
            fixture("choice_item.json").as_str(),
            "--responses",
            fixture("choice_wrong_type.responses.json").as_str(),
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn item_nonexistent_file_exits_1() {
    respro()
        .args(["item", "nonexistent_item_xyz.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error reading item"));
}

#[test]
fn item_unknown_field_exits_1() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.json");
    fs::write(&path, r#"{"responseProcesing": []}"#).unwrap();

    respro()
        .args(["item", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error parsing item"));
}

#[test]
fn json_errors_are_json_objects() {
    let out = respro()
        .args(["item", "nonexistent_item_xyz.json", "--output", "json"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let err: serde_json::Value = serde_json::from_slice(&out.stderr).expect("stderr is JSON");
    assert!(err["error"].as_str().unwrap().contains("nonexistent_item_xyz.json"));
}

#[test]
fn quiet_suppresses_output() {
    respro()
        .args(["item", fixture("choice_item.json").as_str(), "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 3. Template processing
// ──────────────────────────────────────────────

#[test]
fn templated_item_satisfies_constraint() {
    let json = stdout_json(respro().args([
        "item",
        fixture("templated_item.json").as_str(),
        "--seed",
        "11",
        "--output",
        "json",
    ]));
    assert_eq!(json["template"]["satisfied"], true);
    let a = &json["variables"]["templates"]["A"];
    let b = &json["variables"]["templates"]["B"];
    assert!(a.is_i64() && b.is_i64());
    assert_ne!(a, b);
}

#[test]
fn same_seed_same_variant() {
    let run = || {
        stdout_json(respro().args([
            "item",
            fixture("templated_item.json").as_str(),
            "--seed",
            "2024",
            "--output",
            "json",
        ]))
    };
    assert_eq!(run()["variables"], run()["variables"]);
}

#[test]
fn config_file_supplies_seed() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("respro.toml");
    fs::write(&config, "[random]\nseed = 2024\n").unwrap();

    let from_config = stdout_json(respro().args([
        "item",
        fixture("templated_item.json").as_str(),
        "--config",
        config.to_str().unwrap(),
        "--output",
        "json",
    ]));
    let from_flag = stdout_json(respro().args([
        "item",
        fixture("templated_item.json").as_str(),
        "--seed",
        "2024",
        "--output",
        "json",
    ]));
    assert_eq!(from_config["variables"], from_flag["variables"]);
}

#[test]
fn config_unknown_key_exits_1() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("respro.toml");
    fs::write(&config, "[template]\nmax_attempt = 5\n").unwrap();

    respro()
        .args(["item", fixture("choice_item.json").as_str(), "--config", config.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error parsing config"));
}

// ──────────────────────────────────────────────
// 4. Test subcommand
// ──────────────────────────────────────────────

#[test]
fn test_aggregates_session() {
    respro()
        .args([
            "test",
            fixture("summary_test.json").as_str(),
            "--session",
            fixture("session.json").as_str(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("CORRECT = 1"))
        .stdout(predicate::str::contains("TOTAL = 1.5"));
}

#[test]
fn test_json_output() {
    let json = stdout_json(respro().args([
        "test",
        fixture("summary_test.json").as_str(),
        "--session",
        fixture("session.json").as_str(),
        "--output",
        "json",
    ]));
    assert_eq!(json["test"], "summary");
    assert_eq!(json["signal"], "continue");
    assert_eq!(json["outcomes"]["CORRECT"], 1);
    assert_eq!(json["outcomes"]["TOTAL"], 1.5);
    assert_eq!(json["diagnostics"], serde_json::json!([]));
}

#[test]
fn test_requires_session() {
    respro()
        .args(["test", fixture("summary_test.json").as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--session"));
}
