//! Corruption recovery tests for the lift binary.
//!
//! These tests verify the CLI can handle:
//! - Unparsable session slots
//! - Slots with individually malformed fields
//! - Malformed rest timers
//! - Damaged workout logs and config files

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn lift(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("lift").expect("Failed to find lift binary");
    cmd.env("XDG_CONFIG_HOME", dir.join("config"))
        .arg("--data-dir")
        .arg(dir.join("data"));
    cmd
}

fn slot_path(dir: &Path) -> PathBuf {
    dir.join("data/session/active_workout.json")
}

fn write_slot(dir: &Path, contents: &str) {
    let path = slot_path(dir);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).expect("Failed to write slot");
}

fn stored_session(started_at_ms: i64) -> Value {
    json!({
        "isActive": true,
        "startedAt": started_at_ms,
        "durationOffset": 0,
        "workout": [
            {"id": "squat", "name": "Squat", "usesCustomRest": false, "customRestSeconds": null,
             "sets": [{"id": "s1", "type": "N", "kg": "100", "reps": "5", "done": true,
                       "prev_kg": 95, "prev_reps": 5}]},
            {"id": "row", "name": "Row", "sets": []}
        ],
        "routineInfo": {"id": 4, "name": "Pull Day"},
        "globalRestSeconds": 120,
        "restTimers": {"squat": {"startedAt": started_at_ms, "duration": 120}}
    })
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn status_json(dir: &Path) -> Value {
    let output = lift(dir)
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_unparsable_slot_is_cleared() {
    let temp_dir = setup_test_dir();
    write_slot(temp_dir.path(), "{ invalid json }}}}");

    lift(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active workout."));

    assert!(!slot_path(temp_dir.path()).exists());
}

#[test]
fn test_truncated_slot_is_cleared() {
    let temp_dir = setup_test_dir();
    let full = stored_session(now_ms()).to_string();
    write_slot(temp_dir.path(), &full[..full.len() / 2]);

    lift(temp_dir.path()).arg("status").assert().success();
    assert!(!slot_path(temp_dir.path()).exists());
}

#[test]
fn test_single_bad_field_keeps_workout() {
    let temp_dir = setup_test_dir();
    let mut stored = stored_session(now_ms());
    stored["globalRestSeconds"] = json!("ninety");
    write_slot(temp_dir.path(), &stored.to_string());

    let session = &status_json(temp_dir.path())["session"];
    assert_eq!(session["isActive"], true);
    assert_eq!(session["globalRestSeconds"], 90);
    assert_eq!(session["routineInfo"]["name"], "Pull Day");
    assert_eq!(session["workout"][0]["sets"][0]["kg"], "100");
    // An exercise whose sets were all removed stays empty
    assert!(session["workout"][1]["sets"].as_array().unwrap().is_empty());
}

#[test]
fn test_exercise_without_sets_field_gets_default_set() {
    let temp_dir = setup_test_dir();
    let mut stored = stored_session(now_ms());
    stored["workout"][1].as_object_mut().unwrap().remove("sets");
    write_slot(temp_dir.path(), &stored.to_string());

    let session = &status_json(temp_dir.path())["session"];
    assert_eq!(session["workout"][1]["sets"].as_array().unwrap().len(), 1);
    assert_eq!(session["workout"][1]["sets"][0]["type"], "N");
}

#[test]
fn test_malformed_rest_timer_is_repaired() {
    let temp_dir = setup_test_dir();
    let mut stored = stored_session(now_ms());
    stored["restTimers"]["squat"]["duration"] = json!("long");
    stored["restTimers"]["row"] = json!({"startedAt": "soon", "duration": 45});
    stored["restTimers"]["deleted"] = json!({"startedAt": now_ms(), "duration": 30});
    write_slot(temp_dir.path(), &stored.to_string());

    let timers = status_json(temp_dir.path())["session"]["restTimers"].clone();
    assert_eq!(timers["squat"]["duration"], 0);
    assert_eq!(timers["row"]["duration"], 45);
    assert!(timers["row"]["startedAt"].is_i64());
    assert!(timers.get("deleted").is_none());
}

#[test]
fn test_edits_continue_after_repair() {
    let temp_dir = setup_test_dir();
    let mut stored = stored_session(now_ms() - 60_000);
    stored["durationOffset"] = json!(-30);
    write_slot(temp_dir.path(), &stored.to_string());

    lift(temp_dir.path()).args(["add-set", "squat"]).assert().success();

    let status = status_json(temp_dir.path());
    assert_eq!(status["session"]["durationOffset"], 0);
    assert!(status["elapsedSeconds"].as_u64().unwrap() >= 60);
    let sets = status["session"]["workout"][0]["sets"].as_array().unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[1]["done"], false);
    assert_eq!(sets[1]["kg"], "100");
}

#[test]
fn test_corrupted_log_does_not_block_finish() {
    let temp_dir = setup_test_dir();
    write_slot(temp_dir.path(), &stored_session(now_ms()).to_string());

    let log_path = temp_dir.path().join("data/workouts.jsonl");
    let mut file = fs::File::create(&log_path).unwrap();
    writeln!(file, "{{ partial record").unwrap();

    lift(temp_dir.path())
        .arg("finish")
        .assert()
        .success()
        .stdout(predicate::str::contains("Workout logged"));

    let log = fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(serde_json::from_str::<Value>(log.lines().last().unwrap()).is_ok());
}

#[test]
fn test_invalid_config_is_reported() {
    let temp_dir = setup_test_dir();
    let config = temp_dir.path().join("broken.toml");
    fs::write(&config, "[session\ndefault_rest_seconds = ").unwrap();

    lift(temp_dir.path())
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .failure();
}
