use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::OptionalExt;
use crate::error::{Result, SessionError};
use crate::model::{validate_task_transition, TaskStatus};

/// One scheduled, typed step of work belonging to a Work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub work_id: String,
    pub seq: i64,
    pub task_type: String,
    pub status: String,
    pub budget: Option<i64>,
    pub params: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert a new task record (status starts pending).
pub fn insert(conn: &Connection, task: &Task) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, work_id, seq, task_type, status, budget, params, error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            task.id,
            task.work_id,
            task.seq,
            task.task_type,
            task.status,
            task.budget,
            task.params,
            task.error,
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

/// Find a task by id.
pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
        params![id],
        row_to_task,
    )
    .optional()
}

/// List all tasks for a work in FIFO order.
pub fn list_by_work(conn: &Connection, work_id: &str) -> rusqlite::Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM tasks WHERE work_id = ?1 ORDER BY seq"
    ))?;
    let rows = stmt.query_map(params![work_id], row_to_task)?;
    rows.collect()
}

/// The oldest pending task of the given types across all works, if any.
///
/// Within a work, seq order and creation order coincide (tasks are created in
/// seq order), so ordering by (created_at, seq) preserves per-work FIFO while
/// giving no cross-work guarantee beyond age.
pub fn next_pending(conn: &Connection, types: &[&str]) -> rusqlite::Result<Option<Task>> {
    let placeholders = types
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {COLUMNS} FROM tasks WHERE status = 'pending' AND task_type IN ({placeholders}) ORDER BY created_at, work_id, seq LIMIT 1"
    );
    let sql_params: Vec<&dyn rusqlite::ToSql> =
        types.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
    conn.query_row(&sql, sql_params.as_slice(), row_to_task)
        .optional()
}

/// Works that have pending tasks of the given types.
pub fn works_with_pending(conn: &Connection, types: &[&str]) -> rusqlite::Result<Vec<String>> {
    let placeholders = types
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT DISTINCT work_id FROM tasks WHERE status = 'pending' AND task_type IN ({placeholders}) ORDER BY work_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let sql_params: Vec<&dyn rusqlite::ToSql> =
        types.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(sql_params.as_slice(), |row| row.get(0))?;
    rows.collect()
}

/// List pending tasks of the given types for one work, FIFO.
pub fn pending_by_work_and_types(
    conn: &Connection,
    work_id: &str,
    types: &[&str],
) -> rusqlite::Result<Vec<Task>> {
    let placeholders = types
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {COLUMNS} FROM tasks WHERE work_id = ?1 AND status = 'pending' AND task_type IN ({placeholders}) ORDER BY seq"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut sql_params: Vec<&dyn rusqlite::ToSql> = vec![&work_id];
    for t in types {
        sql_params.push(t);
    }
    let rows = stmt.query_map(sql_params.as_slice(), row_to_task)?;
    rows.collect()
}

/// Atomically claim a pending task for execution.
///
/// Returns true iff this caller won the pending -> processing transition.
/// The conditional UPDATE is the exactly-once discipline: a second claimer
/// matches zero rows.
pub fn claim(conn: &Connection, id: &str, now: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET status = 'processing', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
        params![now, id],
    )?;
    Ok(changed == 1)
}

/// Update a task's status, validating the transition and recording the error
/// message for failures.
pub fn update_status(
    conn: &Connection,
    id: &str,
    to: TaskStatus,
    error: Option<&str>,
    now: &str,
) -> Result<()> {
    let task = get(conn, id)?.ok_or_else(|| SessionError::TaskNotFound(id.to_string()))?;
    let from: TaskStatus = task.status.parse()?;
    validate_task_transition(from, to)?;

    conn.execute(
        "UPDATE tasks SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
        params![to.to_string(), error, now, id],
    )?;
    Ok(())
}

/// Reset a task back to pending so it can be re-executed.
///
/// Clears the stored error and resets the task's bead assignments to pending.
/// The work's seq counter is untouched: sequence numbers are never reused.
pub fn reset(conn: &Connection, id: &str, now: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE tasks SET status = 'pending', error = NULL, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    if changed == 0 {
        return Err(SessionError::TaskNotFound(id.to_string()));
    }
    conn.execute(
        "UPDATE bead_assignments SET status = 'pending' WHERE task_id = ?1",
        params![id],
    )?;
    Ok(())
}

const COLUMNS: &str =
    "id, work_id, seq, task_type, status, budget, params, error, created_at, updated_at";

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        work_id: row.get(1)?,
        seq: row.get(2)?,
        task_type: row.get(3)?,
        status: row.get(4)?,
        budget: row.get(5)?,
        params: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
