#![cfg(unix)]

mod common;

use predicates::prelude::*;
use tempfile::TempDir;

use common::{braid_cmd, write_script};

const OPEN_EPIC_BD: &str = r#"#!/bin/sh
case "$1" in
  list)
    cat <<'EOF'
[
  {"id": "epic", "title": "Login epic", "priority": 0, "status": "open"},
  {"id": "task-2", "title": "Sessions", "priority": 2, "status": "open",
   "dependencies": [{"depends_on": "epic", "kind": "parent-child"}]},
  {"id": "task-1", "title": "Password form", "priority": 1, "status": "open",
   "dependencies": [{"depends_on": "epic", "kind": "parent-child"}]}
]
EOF
    ;;
  show)
    echo "not found" >&2
    exit 1
    ;;
esac
"#;

const CLOSED_PARENT_BD: &str = r#"#!/bin/sh
case "$1" in
  list)
    cat <<'EOF'
[
  {"id": "task-1", "title": "Password form", "priority": 1, "status": "open",
   "dependencies": [{"depends_on": "old-epic", "kind": "parent-child"}]},
  {"id": "task-2", "title": "Sessions", "priority": 2, "status": "open",
   "dependencies": [{"depends_on": "old-epic", "kind": "parent-child"}]}
]
EOF
    ;;
  show)
    cat <<'EOF'
{"id": "old-epic", "title": "Login epic", "priority": 0, "status": "closed"}
EOF
    ;;
esac
"#;

#[test]
fn tree_renders_open_epic_with_children_in_priority_order() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();
    let bd = write_script(project.path(), "bd", OPEN_EPIC_BD);

    let output = braid_cmd(project.path())
        .arg("tree")
        .env("BRAID_BD_BIN", &bd)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("epic"));
    assert!(lines[1].starts_with("├── task-1"));
    assert!(lines[2].starts_with("└── task-2"));
}

#[test]
fn tree_resolves_closed_parent_as_placeholder() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();
    let bd = write_script(project.path(), "bd", CLOSED_PARENT_BD);

    braid_cmd(project.path())
        .arg("tree")
        .env("BRAID_BD_BIN", &bd)
        .assert()
        .success()
        .stdout(predicate::str::contains("old-epic  Login epic [closed] (closed parent)"))
        .stdout(predicate::str::contains("├── task-1"))
        .stdout(predicate::str::contains("└── task-2"));
}

#[test]
fn tree_json_reports_depths() {
    let project = TempDir::new().unwrap();
    braid_cmd(project.path()).arg("init").assert().success();
    let bd = write_script(project.path(), "bd", OPEN_EPIC_BD);

    let output = braid_cmd(project.path())
        .args(["tree", "--json"])
        .env("BRAID_BD_BIN", &bd)
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["bead"]["id"], "epic");
    assert_eq!(rows[0]["depth"], 0);
    assert_eq!(rows[1]["depth"], 1);
    assert_eq!(rows[2]["depth"], 1);
}
