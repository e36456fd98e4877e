use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::OptionalExt;

/// One isolated unit of effort: a branch, a worktree, and the tasks and beads
/// scheduled against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Work {
    pub id: String,
    pub branch: String,
    pub base_branch: String,
    pub worktree_path: Option<String>,
    pub root_issue: Option<String>,
    pub auto: bool,
    pub status: String,
    pub pr_url: Option<String>,
    pub pr_head_sha: Option<String>,
    pub ci_status: String,
    pub approval_status: String,
    pub approvers: Vec<String>,
    pub has_unseen_changes: bool,
    pub mergeable: Option<String>,
    pub last_task_seq: i64,
    pub created_at: String,
}

impl Work {
    /// A fresh idle work with default PR-tracking fields.
    pub fn new(
        id: &str,
        branch: &str,
        base_branch: &str,
        root_issue: Option<&str>,
        auto: bool,
        created_at: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            branch: branch.to_string(),
            base_branch: base_branch.to_string(),
            worktree_path: None,
            root_issue: root_issue.map(str::to_string),
            auto,
            status: "idle".to_string(),
            pr_url: None,
            pr_head_sha: None,
            ci_status: "pending".to_string(),
            approval_status: "pending".to_string(),
            approvers: Vec::new(),
            has_unseen_changes: false,
            mergeable: None,
            last_task_seq: 0,
            created_at: created_at.to_string(),
        }
    }
}

/// PR-tracking fields updated together by a feedback check.
#[derive(Debug, Clone, PartialEq)]
pub struct PrFields {
    pub pr_url: Option<String>,
    pub pr_head_sha: Option<String>,
    pub ci_status: String,
    pub approval_status: String,
    pub approvers: Vec<String>,
    pub mergeable: Option<String>,
}

/// Insert a new work record.
pub fn insert(conn: &Connection, work: &Work) -> rusqlite::Result<()> {
    let approvers = serde_json::to_string(&work.approvers).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO works (id, branch, base_branch, worktree_path, root_issue, auto, status, pr_url, pr_head_sha, ci_status, approval_status, approvers, has_unseen_changes, mergeable, last_task_seq, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            work.id,
            work.branch,
            work.base_branch,
            work.worktree_path,
            work.root_issue,
            work.auto,
            work.status,
            work.pr_url,
            work.pr_head_sha,
            work.ci_status,
            work.approval_status,
            approvers,
            work.has_unseen_changes,
            work.mergeable,
            work.last_task_seq,
            work.created_at,
        ],
    )?;
    Ok(())
}

/// Find a work by id.
pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Work>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM works WHERE id = ?1"),
        params![id],
        row_to_work,
    )
    .optional()
}

/// List all works, most recent first.
pub fn list_all(conn: &Connection) -> rusqlite::Result<Vec<Work>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {COLUMNS} FROM works ORDER BY created_at DESC"))?;
    let rows = stmt.query_map([], row_to_work)?;
    rows.collect()
}

/// Update the status of a work.
pub fn update_status(conn: &Connection, id: &str, status: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE works SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;
    Ok(())
}

/// Set the worktree_path on a work (initially NULL).
pub fn update_worktree_path(conn: &Connection, id: &str, path: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE works SET worktree_path = ?1 WHERE id = ?2",
        params![path, id],
    )?;
    Ok(())
}

/// Clear the worktree_path after a scheduled destroy.
pub fn clear_worktree_path(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE works SET worktree_path = NULL WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Overwrite the PR-tracking fields from a feedback check.
pub fn update_pr_fields(conn: &Connection, id: &str, fields: &PrFields) -> rusqlite::Result<()> {
    let approvers = serde_json::to_string(&fields.approvers).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE works SET pr_url = ?1, pr_head_sha = ?2, ci_status = ?3, approval_status = ?4, approvers = ?5, mergeable = ?6 WHERE id = ?7",
        params![
            fields.pr_url,
            fields.pr_head_sha,
            fields.ci_status,
            fields.approval_status,
            approvers,
            fields.mergeable,
            id,
        ],
    )?;
    Ok(())
}

/// Set or clear the "has unseen PR changes" flag.
pub fn set_unseen_changes(conn: &Connection, id: &str, unseen: bool) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE works SET has_unseen_changes = ?1 WHERE id = ?2",
        params![unseen, id],
    )?;
    Ok(())
}

/// Allocate the next task sequence number for a work.
///
/// Strictly increasing per work and never reused, even after a task reset:
/// the counter lives on the work row, not the task table.
/// Returns `QueryReturnedNoRows` if the work does not exist.
pub fn allocate_task_seq(conn: &Connection, id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "UPDATE works SET last_task_seq = last_task_seq + 1 WHERE id = ?1 RETURNING last_task_seq",
        params![id],
        |row| row.get(0),
    )
}

const COLUMNS: &str = "id, branch, base_branch, worktree_path, root_issue, auto, status, pr_url, pr_head_sha, ci_status, approval_status, approvers, has_unseen_changes, mergeable, last_task_seq, created_at";

fn row_to_work(row: &rusqlite::Row) -> rusqlite::Result<Work> {
    let approvers_json: String = row.get(11)?;
    Ok(Work {
        id: row.get(0)?,
        branch: row.get(1)?,
        base_branch: row.get(2)?,
        worktree_path: row.get(3)?,
        root_issue: row.get(4)?,
        auto: row.get(5)?,
        status: row.get(6)?,
        pr_url: row.get(7)?,
        pr_head_sha: row.get(8)?,
        ci_status: row.get(9)?,
        approval_status: row.get(10)?,
        approvers: serde_json::from_str(&approvers_json).unwrap_or_default(),
        has_unseen_changes: row.get(12)?,
        mergeable: row.get(13)?,
        last_task_seq: row.get(14)?,
        created_at: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn make_test_work(id: &str) -> Work {
        Work::new(
            id,
            "feature/auth",
            "main",
            Some("bd-100"),
            false,
            "2026-03-01T00:00:00Z",
        )
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();
        let work = make_test_work("w-auth");

        insert(&conn, &work).expect("insert should succeed");

        let found = get(&conn, "w-auth").unwrap().unwrap();
        assert_eq!(found.id, "w-auth");
        assert_eq!(found.branch, "feature/auth");
        assert_eq!(found.status, "idle");
        assert_eq!(found.ci_status, "pending");
        assert!(found.worktree_path.is_none());
        assert!(found.approvers.is_empty());
        assert!(!found.has_unseen_changes);

        assert!(get(&conn, "no-such-work").unwrap().is_none());
    }

    #[test]
    fn test_update_status() {
        let conn = test_db();
        insert(&conn, &make_test_work("w-1")).unwrap();

        update_status(&conn, "w-1", "processing").unwrap();

        let found = get(&conn, "w-1").unwrap().unwrap();
        assert_eq!(found.status, "processing");
    }

    #[test]
    fn test_worktree_path_set_and_clear() {
        let conn = test_db();
        insert(&conn, &make_test_work("w-1")).unwrap();

        update_worktree_path(&conn, "w-1", "/repo/.braid/worktrees/w-1").unwrap();
        let found = get(&conn, "w-1").unwrap().unwrap();
        assert_eq!(
            found.worktree_path.as_deref(),
            Some("/repo/.braid/worktrees/w-1")
        );

        clear_worktree_path(&conn, "w-1").unwrap();
        let found = get(&conn, "w-1").unwrap().unwrap();
        assert!(found.worktree_path.is_none());
    }

    #[test]
    fn test_update_pr_fields_round_trips_approvers() {
        let conn = test_db();
        insert(&conn, &make_test_work("w-1")).unwrap();

        let fields = PrFields {
            pr_url: Some("https://github.com/acme/repo/pull/7".to_string()),
            pr_head_sha: Some("abc123".to_string()),
            ci_status: "success".to_string(),
            approval_status: "approved".to_string(),
            approvers: vec!["alice".to_string(), "bob".to_string()],
            mergeable: Some("mergeable".to_string()),
        };
        update_pr_fields(&conn, "w-1", &fields).unwrap();

        let found = get(&conn, "w-1").unwrap().unwrap();
        assert_eq!(found.pr_url.as_deref(), Some("https://github.com/acme/repo/pull/7"));
        assert_eq!(found.ci_status, "success");
        assert_eq!(found.approval_status, "approved");
        assert_eq!(found.approvers, vec!["alice", "bob"]);
        assert_eq!(found.mergeable.as_deref(), Some("mergeable"));
    }

    #[test]
    fn test_set_unseen_changes() {
        let conn = test_db();
        insert(&conn, &make_test_work("w-1")).unwrap();

        set_unseen_changes(&conn, "w-1", true).unwrap();
        assert!(get(&conn, "w-1").unwrap().unwrap().has_unseen_changes);

        set_unseen_changes(&conn, "w-1", false).unwrap();
        assert!(!get(&conn, "w-1").unwrap().unwrap().has_unseen_changes);
    }

    #[test]
    fn test_allocate_task_seq_is_strictly_increasing() {
        let conn = test_db();
        insert(&conn, &make_test_work("w-1")).unwrap();

        assert_eq!(allocate_task_seq(&conn, "w-1").unwrap(), 1);
        assert_eq!(allocate_task_seq(&conn, "w-1").unwrap(), 2);
        assert_eq!(allocate_task_seq(&conn, "w-1").unwrap(), 3);
    }

    #[test]
    fn test_allocate_task_seq_missing_work() {
        let conn = test_db();
        let err = allocate_task_seq(&conn, "nope").unwrap_err();
        assert!(matches!(err, rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_list_all_most_recent_first() {
        let conn = test_db();
        let mut older = make_test_work("w-old");
        older.created_at = "2026-03-01T00:00:00Z".to_string();
        let mut newer = make_test_work("w-new");
        newer.created_at = "2026-03-02T00:00:00Z".to_string();
        insert(&conn, &older).unwrap();
        insert(&conn, &newer).unwrap();

        let all = list_all(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "w-new");
        assert_eq!(all[1].id, "w-old");
    }
}
