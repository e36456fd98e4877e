mod common;

use predicates::prelude::*;
use tempfile::TempDir;

use braid_session::db;

use common::braid_cmd;

#[test]
fn init_creates_store_and_config() {
    let project = TempDir::new().unwrap();

    braid_cmd(project.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized braid project"));

    assert!(project.path().join(".braid").join("braid.db").exists());
    assert!(project.path().join(".braid").join("config.toml").exists());
}

#[test]
fn work_start_persists_work_and_create_task() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();

    braid_cmd(project.path())
        .args([
            "work", "start", "--branch", "feature/x", "--id", "w-x", "--issue", "bd-9",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created work w-x"))
        .stdout(predicate::str::contains("Scheduled w-x.1"));

    let conn = db::open_or_create(&project.path().join(".braid").join("braid.db")).unwrap();
    let work = db::works::get(&conn, "w-x").unwrap().unwrap();
    assert_eq!(work.branch, "feature/x");
    assert_eq!(work.status, "idle");
    assert_eq!(work.root_issue.as_deref(), Some("bd-9"));

    let tasks = db::tasks::list_by_work(&conn, "w-x").unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, "create_worktree");
    assert_eq!(tasks[0].status, "pending");

    // The root issue is assigned to the work.
    let assignment = db::assignments::get(&conn, "bd-9").unwrap().unwrap();
    assert_eq!(assignment.work_id, "w-x");
}

#[test]
fn work_start_rejects_duplicate_id() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();

    braid_cmd(project.path())
        .args(["work", "start", "--branch", "feature/x", "--id", "w-x"])
        .assert()
        .success();

    braid_cmd(project.path())
        .args(["work", "start", "--branch", "feature/y", "--id", "w-x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn schedule_commands_append_tasks_in_order() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();
    braid_cmd(project.path())
        .args(["work", "start", "--branch", "feature/x", "--id", "w-x"])
        .assert()
        .success();

    braid_cmd(project.path())
        .args(["schedule", "review", "--work", "w-x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled w-x.2 (review)"));

    braid_cmd(project.path())
        .args([
            "schedule", "implement", "--work", "w-x", "--beads", "bd-1,bd-2", "--budget", "5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled w-x.3 (implement)"));

    let conn = db::open_or_create(&project.path().join(".braid").join("braid.db")).unwrap();
    let pinned = db::assignments::list_by_task(&conn, "w-x.3").unwrap();
    assert_eq!(pinned.len(), 2);
}

#[test]
fn schedule_against_missing_work_fails() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();

    braid_cmd(project.path())
        .args(["schedule", "review", "--work", "w-none"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn status_json_reports_work_and_tasks() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();
    braid_cmd(project.path())
        .args(["work", "start", "--branch", "feature/x", "--id", "w-x"])
        .assert()
        .success();

    let output = braid_cmd(project.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let works = parsed.as_array().unwrap();
    assert_eq!(works.len(), 1);
    assert_eq!(works[0]["work"]["id"], "w-x");
    assert_eq!(works[0]["derived_state"], "idle");
    assert_eq!(works[0]["tasks"][0]["task_type"], "create_worktree");
}

#[test]
fn reset_missing_task_fails() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();

    braid_cmd(project.path())
        .args(["reset", "--task", "w-x.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn daemon_status_reports_not_running() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();

    braid_cmd(project.path())
        .args(["daemon", "status"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("not running"));
}
