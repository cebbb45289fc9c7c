use assert_cmd::Command;
use predicates::prelude::*;

use crate::common::*;

fn projdeck() -> Command {
    Command::cargo_bin("projdeck").unwrap()
}

#[test]
fn validate_accepts_good_config() {
    let project = TestProject::new(&deck_config("echo hi", free_port(), 2, &[("proj-a", "a")]));

    projdeck()
        .args(["-f", project.config_path.to_str().unwrap(), "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid (1 projects"));
}

#[test]
fn validate_rejects_overlapping_ranges() {
    let project = TestProject::new(
        r#"
[spawn]
command = "node server.js"

[ports]
backend_start = 4000
frontend_start = 4010
max_instances = 20
"#,
    );

    projdeck()
        .args(["-f", project.config_path.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("overlap"));
}

#[test]
fn missing_config_file_is_reported() {
    projdeck()
        .args(["-f", "/nonexistent/projdeck.toml", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn init_writes_starter_config() {
    let dir = tempfile::TempDir::new().unwrap();

    projdeck()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created projdeck.toml"));
    assert!(dir.path().join("projdeck.toml").is_file());

    projdeck()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    // The starter config is found by walking up from a subdirectory.
    let nested = dir.path().join("nested/deeper");
    std::fs::create_dir_all(&nested).unwrap();
    projdeck()
        .current_dir(&nested)
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn projects_lists_configured_projects() {
    let project = TestProject::new(&deck_config(
        "echo hi",
        free_port(),
        2,
        &[("proj-a", "a"), ("website", "sites/web")],
    ));

    projdeck()
        .args(["-f", project.config_path.to_str().unwrap(), "projects"])
        .assert()
        .success()
        .stdout(predicate::str::contains("proj-a"))
        .stdout(predicate::str::contains("website"));
}

#[test]
fn open_unknown_project_suggests_close_match() {
    let project = TestProject::new(&deck_config("echo hi", free_port(), 2, &[("website", "web")]));

    projdeck()
        .args(["-f", project.config_path.to_str().unwrap(), "open", "websit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean `website`?"));
}

#[test]
fn open_reports_early_exit_with_output() {
    let project = TestProject::new(&deck_config(
        "echo boom >&2; exit 3",
        free_port(),
        1,
        &[("proj-a", "a")],
    ));
    project.project_dir("a");

    projdeck()
        .args(["-f", project.config_path.to_str().unwrap(), "open", "proj-a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exited before becoming ready (exit code 3)"))
        .stderr(predicate::str::contains("[stderr] boom"));
}
