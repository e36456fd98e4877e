use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::OptionalExt;
use crate::error::{Result, SessionError};

/// Assignment of an externally-owned bead to a work (and optionally a task).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub bead_id: String,
    pub work_id: String,
    pub task_id: Option<String>,
    pub status: String,
    pub assigned_at: String,
}

/// Assign a bead to a work, optionally pinning it to a task.
///
/// The primary key on bead_id serializes concurrent assignment per bead:
/// a bead already assigned to another work is rejected with a typed error,
/// while re-assigning within the same work just moves the task pin.
pub fn assign(
    conn: &Connection,
    bead_id: &str,
    work_id: &str,
    task_id: Option<&str>,
    now: &str,
) -> Result<()> {
    let existing = get(conn, bead_id)?;
    match existing {
        Some(a) if a.work_id != work_id => Err(SessionError::BeadAlreadyAssigned {
            bead: bead_id.to_string(),
            work: a.work_id,
        }),
        Some(_) => {
            conn.execute(
                "UPDATE bead_assignments SET task_id = ?1 WHERE bead_id = ?2",
                params![task_id, bead_id],
            )?;
            Ok(())
        }
        None => {
            conn.execute(
                "INSERT INTO bead_assignments (bead_id, work_id, task_id, status, assigned_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                params![bead_id, work_id, task_id, now],
            )?;
            Ok(())
        }
    }
}

/// Remove a bead's assignment entirely.
pub fn unassign(conn: &Connection, bead_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM bead_assignments WHERE bead_id = ?1",
        params![bead_id],
    )?;
    Ok(())
}

/// Find the assignment for a bead.
pub fn get(conn: &Connection, bead_id: &str) -> rusqlite::Result<Option<Assignment>> {
    conn.query_row(
        "SELECT bead_id, work_id, task_id, status, assigned_at FROM bead_assignments WHERE bead_id = ?1",
        params![bead_id],
        row_to_assignment,
    )
    .optional()
}

/// List all assignments for a work.
pub fn list_by_work(conn: &Connection, work_id: &str) -> rusqlite::Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT bead_id, work_id, task_id, status, assigned_at FROM bead_assignments WHERE work_id = ?1 ORDER BY assigned_at, bead_id",
    )?;
    let rows = stmt.query_map(params![work_id], row_to_assignment)?;
    rows.collect()
}

/// List assignments pinned to a task.
pub fn list_by_task(conn: &Connection, task_id: &str) -> rusqlite::Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT bead_id, work_id, task_id, status, assigned_at FROM bead_assignments WHERE task_id = ?1 ORDER BY bead_id",
    )?;
    let rows = stmt.query_map(params![task_id], row_to_assignment)?;
    rows.collect()
}

/// Beads assigned to a work but not yet pinned to any task.
pub fn unpinned_by_work(conn: &Connection, work_id: &str) -> rusqlite::Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT bead_id, work_id, task_id, status, assigned_at FROM bead_assignments WHERE work_id = ?1 AND task_id IS NULL ORDER BY assigned_at, bead_id",
    )?;
    let rows = stmt.query_map(params![work_id], row_to_assignment)?;
    rows.collect()
}

/// Update the live status of an assigned bead.
pub fn update_status(conn: &Connection, bead_id: &str, status: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE bead_assignments SET status = ?1 WHERE bead_id = ?2",
        params![status, bead_id],
    )?;
    Ok(())
}

fn row_to_assignment(row: &rusqlite::Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        bead_id: row.get(0)?,
        work_id: row.get(1)?,
        task_id: row.get(2)?,
        status: row.get(3)?,
        assigned_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{tasks, test_db, works};

    fn setup_work(conn: &Connection, id: &str) {
        let work = works::Work::new(id, "feature/x", "main", None, false, "2026-03-01T00:00:00Z");
        works::insert(conn, &work).unwrap();
    }

    fn setup_task(conn: &Connection, work_id: &str, id: &str, seq: i64) {
        let task = tasks::Task {
            id: id.to_string(),
            work_id: work_id.to_string(),
            seq,
            task_type: "implement".to_string(),
            status: "pending".to_string(),
            budget: None,
            params: None,
            error: None,
            created_at: "2026-03-01T00:00:00Z".to_string(),
            updated_at: "2026-03-01T00:00:00Z".to_string(),
        };
        tasks::insert(conn, &task).unwrap();
    }

    #[test]
    fn test_assign_and_get() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        assign(&conn, "bd-1", "w-1", None, "2026-03-01T00:00:00Z").unwrap();

        let a = get(&conn, "bd-1").unwrap().unwrap();
        assert_eq!(a.work_id, "w-1");
        assert!(a.task_id.is_none());
        assert_eq!(a.status, "pending");
    }

    #[test]
    fn test_double_assignment_to_other_work_rejected() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        setup_work(&conn, "w-2");

        assign(&conn, "bd-1", "w-1", None, "2026-03-01T00:00:00Z").unwrap();
        let err = assign(&conn, "bd-1", "w-2", None, "2026-03-01T00:01:00Z").unwrap_err();

        match err {
            SessionError::BeadAlreadyAssigned { bead, work } => {
                assert_eq!(bead, "bd-1");
                assert_eq!(work, "w-1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reassign_within_work_moves_task_pin() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        setup_task(&conn, "w-1", "w-1.3", 3);

        assign(&conn, "bd-1", "w-1", None, "2026-03-01T00:00:00Z").unwrap();
        assign(&conn, "bd-1", "w-1", Some("w-1.3"), "2026-03-01T00:01:00Z").unwrap();

        let a = get(&conn, "bd-1").unwrap().unwrap();
        assert_eq!(a.task_id.as_deref(), Some("w-1.3"));
    }

    #[test]
    fn test_unassign_then_reassign_elsewhere() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        setup_work(&conn, "w-2");

        assign(&conn, "bd-1", "w-1", None, "2026-03-01T00:00:00Z").unwrap();
        unassign(&conn, "bd-1").unwrap();
        assign(&conn, "bd-1", "w-2", None, "2026-03-01T00:02:00Z").unwrap();

        let a = get(&conn, "bd-1").unwrap().unwrap();
        assert_eq!(a.work_id, "w-2");
    }

    #[test]
    fn test_unpinned_by_work() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        setup_task(&conn, "w-1", "w-1.1", 1);

        assign(&conn, "bd-1", "w-1", None, "2026-03-01T00:00:00Z").unwrap();
        assign(&conn, "bd-2", "w-1", Some("w-1.1"), "2026-03-01T00:00:01Z").unwrap();
        assign(&conn, "bd-3", "w-1", None, "2026-03-01T00:00:02Z").unwrap();

        let unpinned = unpinned_by_work(&conn, "w-1").unwrap();
        let ids: Vec<&str> = unpinned.iter().map(|a| a.bead_id.as_str()).collect();
        assert_eq!(ids, vec!["bd-1", "bd-3"]);
    }

    #[test]
    fn test_update_status() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        assign(&conn, "bd-1", "w-1", None, "2026-03-01T00:00:00Z").unwrap();

        update_status(&conn, "bd-1", "completed").unwrap();
        assert_eq!(get(&conn, "bd-1").unwrap().unwrap().status, "completed");
    }
}
