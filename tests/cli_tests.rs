//! Integration tests for the pipegraph CLI
//!
//! These tests run the actual binary and verify its output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const NEWSROOM: &str = r#"
domain: newsroom
concept:
  Draft: "A first draft"
  Headline:
    description: "A punchy headline"
    refines: Text
pipe:
  publish:
    type: PipeSequence
    inputs: { brief: Text }
    output: Headline
    steps:
      - pipe: draft
        result: draft
      - pipe: headline
        result: headline
  headline:
    type: PipeLLM
    inputs: { draft: Draft }
    output: Headline
    prompt_template: "Headline for $draft"
  draft:
    type: PipeLLM
    inputs: { brief: Text }
    output: Draft
    prompt_template: "Draft from $brief"
"#;

/// Binary isolated from the user's config file and environment
fn pipegraph_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pipegraph").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("PIPEGRAPH_RUN_MODE")
        .env_remove("PIPEGRAPH_MAX_BATCH_CONCURRENCY")
        .arg("--config")
        .arg(temp_dir.path().join("absent.toml"));
    cmd
}

fn write_bundle(temp_dir: &TempDir, yaml: &str) -> PathBuf {
    let path = temp_dir.path().join("bundle.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_help_flag() {
    let temp_dir = TempDir::new().unwrap();
    pipegraph_cmd(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("declarative pipeline runtime"))
        .stdout(predicate::str::contains("dry-run"));
}

#[test]
fn test_check_prints_dependency_order() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = write_bundle(&temp_dir, NEWSROOM);

    pipegraph_cmd(&temp_dir)
        .arg("check")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 pipes loaded"))
        .stdout(predicate::str::is_match(r"1\. publish\s+2\. draft").unwrap())
        .stdout(predicate::str::contains("3 pipes validated"));
}

#[test]
fn test_check_reports_cycles() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = write_bundle(
        &temp_dir,
        r#"
domain: loops
pipe:
  ping:
    type: PipeSequence
    output: Text
    steps: [{ pipe: pong }]
  pong:
    type: PipeSequence
    output: Text
    steps: [{ pipe: ping }]
"#,
    );

    pipegraph_cmd(&temp_dir)
        .arg("check")
        .arg(&bundle)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("ping → pong → ping"));
}

#[test]
fn test_check_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    pipegraph_cmd(&temp_dir)
        .args(["check", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_dry_run_with_input() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = write_bundle(&temp_dir, NEWSROOM);

    pipegraph_cmd(&temp_dir)
        .arg("dry-run")
        .arg(&bundle)
        .args(["publish", "--input", "brief=quarterly results"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed (dry run)"))
        .stdout(predicate::str::contains("quarterly results"))
        .stdout(predicate::str::contains("[newsroom.Headline]"))
        .stdout(predicate::str::contains("mocked input").not());
}

#[test]
fn test_dry_run_mocks_missing_inputs() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = write_bundle(&temp_dir, NEWSROOM);

    pipegraph_cmd(&temp_dir)
        .arg("dry-run")
        .arg(&bundle)
        .args(["publish", "--events"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mocked input brief"))
        .stdout(predicate::str::contains("\"type\": \"pipeline_completed\""));
}

#[test]
fn test_dry_run_unknown_pipe() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = write_bundle(&temp_dir, NEWSROOM);

    pipegraph_cmd(&temp_dir)
        .arg("dry-run")
        .arg(&bundle)
        .arg("retract")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[PIPE-020]"));
}

#[test]
fn test_malformed_input_flag() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = write_bundle(&temp_dir, NEWSROOM);

    pipegraph_cmd(&temp_dir)
        .arg("dry-run")
        .arg(&bundle)
        .args(["publish", "--input", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected name=text"));
}
