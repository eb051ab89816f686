//! End-to-end tests for the `opwatch` binary.
//!
//! Status commands are small `sh` scripts, so these run on Unix only.
#![cfg(unix)]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn opwatch(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("opwatch").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("OPWATCH_CONFIG")
        .env("OPWATCH_LOG", "warn")
        .env("OPWATCH_LOG_COLORS", "false");
    cmd
}

/// A status script that prints the next line of `states` on each run and
/// keeps printing the last one.
fn script(dir: &TempDir, states: &[&str]) -> String {
    let list = dir.path().join("states");
    fs::write(&list, states.join("\n") + "\n").unwrap();
    let counter = dir.path().join("calls");
    let path = dir.path().join("status.sh");
    fs::write(
        &path,
        format!(
            "#!/bin/sh\n\
             n=$(cat '{counter}' 2>/dev/null || echo 0)\n\
             n=$((n + 1))\n\
             echo $n > '{counter}'\n\
             total=$(wc -l < '{list}')\n\
             [ $n -gt $total ] && n=$total\n\
             sed -n \"${{n}}p\" '{list}'\n",
            counter = counter.display(),
            list = list.display(),
        ),
    )
    .unwrap();
    path.display().to_string()
}

#[test]
fn presets_lists_every_table() {
    let dir = TempDir::new().unwrap();
    opwatch(&dir)
        .arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("infra-manager (deployment)"))
        .stdout(predicate::str::contains("vertex-pipeline (pipeline job)"))
        .stdout(predicate::str::contains("argo-sync (sync)"))
        .stdout(predicate::str::contains("ACTIVE"));
}

#[test]
fn succeeds_once_the_state_settles() {
    let dir = TempDir::new().unwrap();
    let status = script(&dir, &["CREATING", "CREATING", "ACTIVE"]);

    opwatch(&dir)
        .args(["wait", "--in-progress", "CREATING", "--succeeded", "ACTIVE"])
        .args(["--failed", "FAILED", "--interval", "10ms", "--timeout", "10s"])
        .args(["--", "sh", &status])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("succeeded in state ACTIVE"));

    assert_eq!(fs::read_to_string(dir.path().join("calls")).unwrap().trim(), "3");
}

#[test]
fn terminal_failure_exits_one() {
    let dir = TempDir::new().unwrap();
    let status = script(&dir, &["UPDATING", "FAILED"]);

    opwatch(&dir)
        .args(["wait", "--in-progress", "UPDATING", "--succeeded", "ACTIVE"])
        .args(["--failed", "FAILED", "--interval", "10ms"])
        .args(["--", "sh", &status])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed in state FAILED"));
}

#[test]
fn timeout_exits_one() {
    let dir = TempDir::new().unwrap();
    let status = script(&dir, &["CREATING"]);

    opwatch(&dir)
        .args(["wait", "--in-progress", "CREATING", "--succeeded", "ACTIVE"])
        .args(["--interval", "50ms", "--timeout", "300ms"])
        .args(["--", "sh", &status])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("timed out after"))
        .stdout(predicate::str::contains("in state CREATING"));
}

#[test]
fn unknown_state_exits_two() {
    let dir = TempDir::new().unwrap();

    opwatch(&dir)
        .args(["wait", "--preset", "infra-manager"])
        .args(["--", "echo", r#"{"state": "RECONCILING"}"#])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("unknown deployment state RECONCILING"));
}

#[test]
fn preset_reads_state_through_json_pointer() {
    let dir = TempDir::new().unwrap();

    opwatch(&dir)
        .args(["wait", "--preset", "argo-sync", "--interval", "10ms"])
        .args([
            "--",
            "echo",
            r#"{"status": {"operationState": {"phase": "Succeeded"}}}"#,
        ])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("succeeded in state Succeeded"));
}

#[test]
fn failing_status_command_exits_two() {
    let dir = TempDir::new().unwrap();

    opwatch(&dir)
        .args(["wait", "--succeeded", "ACTIVE", "--"])
        .args(["sh", "-c", "echo 'permission denied' >&2; exit 1"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("permission denied"));
}

#[test]
fn config_file_supplies_table_and_cadence() {
    let dir = TempDir::new().unwrap();
    let status = script(&dir, &["Progressing", "Healthy"]);
    fs::write(
        dir.path().join("opwatch.toml"),
        r#"
            interval = "10ms"
            timeout = "10s"

            [states]
            in_progress = ["Progressing"]
            succeeded = ["Healthy"]
            failed = ["Degraded"]
        "#,
    )
    .unwrap();

    opwatch(&dir)
        .args(["wait", "--", "sh", &status])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("succeeded in state Healthy"));
}

#[test]
fn environment_overrides_config_file() {
    let dir = TempDir::new().unwrap();
    let status = script(&dir, &["Progressing"]);
    fs::write(
        dir.path().join("opwatch.toml"),
        r#"
            interval = "10ms"
            timeout = "1h"

            [states]
            in_progress = ["Progressing"]
            succeeded = ["Healthy"]
        "#,
    )
    .unwrap();

    opwatch(&dir)
        .env("OPWATCH_TIMEOUT", "200ms")
        .args(["wait", "--", "sh", &status])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("timed out"));
}

#[test]
fn missing_state_table_exits_two() {
    let dir = TempDir::new().unwrap();

    opwatch(&dir)
        .args(["wait", "--", "echo", "ACTIVE"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no state table"));
}

#[test]
fn unknown_preset_exits_two() {
    let dir = TempDir::new().unwrap();

    opwatch(&dir)
        .args(["wait", "--preset", "gke", "--", "echo", "ACTIVE"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown preset"));
}

#[test]
fn huge_timeout_is_accepted() {
    let dir = TempDir::new().unwrap();

    opwatch(&dir)
        .args(["wait", "--succeeded", "ACTIVE", "--timeout", "500000000000years"])
        .args(["--", "echo", "ACTIVE"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("succeeded in state ACTIVE"));
}

#[test]
fn preset_and_state_lists_conflict() {
    let dir = TempDir::new().unwrap();

    opwatch(&dir)
        .args(["wait", "--preset", "infra-manager", "--succeeded", "ACTIVE"])
        .args(["--", "echo", "ACTIVE"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}
