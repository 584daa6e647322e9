// ABOUTME: Integration tests for the verdigris CLI commands.
// ABOUTME: Runs init, validate, simulate, and history against temporary directories.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn verdigris_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("verdigris"))
}

fn initialized_dir() -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().unwrap();
    verdigris_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--group", "book-service", "--repository", "books/api"])
        .assert()
        .success();
    temp_dir
}

fn simulate(dir: &Path) -> Command {
    let mut cmd = verdigris_cmd();
    cmd.current_dir(dir).arg("simulate");
    cmd
}

#[test]
fn help_shows_commands() {
    verdigris_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = initialized_dir();
    let config_path = temp_dir.path().join("verdigris.yml");

    assert!(config_path.exists(), "verdigris.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("group: book-service"));
    assert!(content.contains("repository: books/api"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("verdigris.yml");
    fs::write(&config_path, "existing: config").unwrap();

    verdigris_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let content = fs::read_to_string(&config_path).unwrap();
    assert_eq!(content, "existing: config");
}

#[test]
fn validate_accepts_the_generated_config() {
    let temp_dir = initialized_dir();

    verdigris_cmd()
        .current_dir(temp_dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn validate_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    verdigris_cmd()
        .current_dir(temp_dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn simulate_records_a_successful_deployment() {
    let temp_dir = initialized_dir();

    simulate(temp_dir.path())
        .args(["v2", "--record-file", ".verdigris/history.jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded"))
        .stdout(predicate::str::contains("production -> green"));

    verdigris_cmd()
        .current_dir(temp_dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("books/api:v2"))
        .stdout(predicate::str::contains("succeeded"));
}

#[test]
fn history_is_empty_before_any_deployment() {
    let temp_dir = initialized_dir();

    verdigris_cmd()
        .current_dir(temp_dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No deployments recorded"));
}

#[test]
fn failing_probes_roll_back() {
    let temp_dir = initialized_dir();

    simulate(temp_dir.path())
        .args(["--probes", "pass,fail"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("production -> blue"))
        .stderr(predicate::str::contains("rolled_back"));
}

#[test]
fn missing_image_fails_the_deployment() {
    let temp_dir = initialized_dir();

    simulate(temp_dir.path())
        .arg("--missing-image")
        .assert()
        .failure()
        .stderr(predicate::str::contains("finished as"));
}

#[test]
fn unknown_probe_step_is_rejected() {
    let temp_dir = initialized_dir();

    simulate(temp_dir.path())
        .args(["--probes", "flaky"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown probe outcome"));
}

#[test]
fn json_output_emits_the_record() {
    let temp_dir = initialized_dir();

    simulate(temp_dir.path())
        .args(["--json", "v3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\":\"succeeded\""));
}
