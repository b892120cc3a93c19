//! End-to-end tests of the `valve` binary against the simulated actuator
//! and a file-backed store in a temp directory. Runs without a config file,
//! which yields the built-in single-valve setup with a store in the cwd.

use assert_cmd::Command;
use predicates::prelude::*;

fn valve_cmd(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("valve").expect("binary");
    cmd.current_dir(dir);
    cmd
}

#[test]
fn status_on_a_fresh_store_reports_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    valve_cmd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("state: 0"))
        .stdout(predicate::str::contains("limits: 0..180 deg"))
        .stdout(predicate::str::contains("travel times: 0.0 s"));
}

#[test]
fn set_limits_normalizes_and_persists_across_invocations() {
    let dir = tempfile::tempdir().expect("tempdir");
    valve_cmd(dir.path())
        .args(["set-limits", "200", "-10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("limits: -10..200 deg"));

    // A fresh process reads the limits back from the store file.
    valve_cmd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("limits: -10..200 deg"));
}

#[test]
fn move_reaches_the_target_with_configured_travel_times() {
    let dir = tempfile::tempdir().expect("tempdir");
    valve_cmd(dir.path())
        .args(["set-travel-times", "600", "600"])
        .assert()
        .success();

    valve_cmd(dir.path())
        .args(["move", "90"])
        .assert()
        .success()
        .stdout(predicate::str::contains("position: 90 deg"));

    valve_cmd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("position: 90 deg"));
}

#[test]
fn factory_reset_demands_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    valve_cmd(dir.path())
        .args(["set-position", "60"])
        .assert()
        .success();

    valve_cmd(dir.path())
        .arg("factory-reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("restart the controller"));

    valve_cmd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("position: 0 deg"));
}

#[test]
fn unconfigured_wire_target_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    valve_cmd(dir.path())
        .args(["--valve", "2", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no valve configured at target 2"));
}
