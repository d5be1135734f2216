//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run with HOME pointed at a temp
//! directory, so config, database and pending queue start empty.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "pomosync-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env_remove("POMOSYNC_ENV")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn status_json(home: &Path) -> serde_json::Value {
    let (stdout, _, code) = run_cli(home, &["timer", "status"]);
    assert_eq!(code, 0, "timer status failed");
    serde_json::from_str(&stdout).expect("status is JSON")
}

#[test]
fn test_status_starts_idle() {
    let home = TempDir::new().unwrap();
    let status = status_json(home.path());
    assert_eq!(status["phase"], "idle");
    assert_eq!(status["currentSession"], "work");
    assert_eq!(status["remaining"], "25:00");
}

#[test]
fn test_work_start_without_task_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["timer", "start"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error: a work session needs --task or --standalone"));
    assert_eq!(status_json(home.path())["phase"], "idle");
}

#[test]
fn test_start_pause_resume_survive_invocations() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(home.path(), &["timer", "start", "--task", "t1", "--project", "p1"]);
    assert_eq!(code, 0);

    let status = status_json(home.path());
    assert_eq!(status["phase"], "running");
    assert_eq!(status["activeTaskId"], "t1");

    let (_, _, code) = run_cli(home.path(), &["timer", "pause"]);
    assert_eq!(code, 0);
    assert_eq!(status_json(home.path())["phase"], "paused");

    let (_, _, code) = run_cli(home.path(), &["timer", "resume"]);
    assert_eq!(code, 0);
    assert_eq!(status_json(home.path())["phase"], "running");
}

#[test]
fn test_skip_does_not_count() {
    let home = TempDir::new().unwrap();
    run_cli(home.path(), &["timer", "start", "--standalone"]);
    let (stdout, _, code) = run_cli(home.path(), &["timer", "skip"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("\"interrupted\": true"));

    let status = status_json(home.path());
    assert_eq!(status["pomodoroCount"], 0);
    assert_eq!(status["currentSession"], "shortBreak");
}

#[test]
fn test_conflict_for_other_project() {
    let home = TempDir::new().unwrap();
    run_cli(home.path(), &["timer", "start", "--task", "t1", "--project", "p1"]);

    let (stdout, _, code) = run_cli(home.path(), &["timer", "conflict", "--project", "p1"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("no conflict"));

    let (stdout, _, code) = run_cli(home.path(), &["timer", "conflict", "--project", "p2"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("differentProject"));

    let (_, _, code) = run_cli(home.path(), &["timer", "conflict", "--project", "p2", "--stop", "--yes"]);
    assert_eq!(code, 0);
    assert_eq!(status_json(home.path())["phase"], "idle");
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "schedule.work_duration", "50"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "schedule.work_duration"]);
    assert_eq!(stdout.trim(), "50");
    assert_eq!(status_json(home.path())["remaining"], "50:00");
}

#[test]
fn test_config_rejects_zero_interval() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["config", "set", "schedule.pomodoros_before_long_break", "0"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_pending_list_starts_empty() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["pending", "list"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "[]");
}
