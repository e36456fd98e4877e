use rusqlite::{params, Connection};

use crate::db::OptionalExt;

/// The recorded orchestrator process for a work.
///
/// An explicit (pid, started_at) table so restart kills exactly the process
/// the supervisor spawned, never a pattern-matched lookalike.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub work_id: String,
    pub pid: u32,
    pub started_at: String,
}

/// Record (or replace) the orchestrator process for a work.
pub fn record(conn: &Connection, work_id: &str, pid: u32, started_at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO processes (work_id, pid, started_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(work_id) DO UPDATE SET pid = excluded.pid, started_at = excluded.started_at",
        params![work_id, pid, started_at],
    )?;
    Ok(())
}

/// Look up the recorded process for a work.
pub fn get(conn: &Connection, work_id: &str) -> rusqlite::Result<Option<ProcessRecord>> {
    conn.query_row(
        "SELECT work_id, pid, started_at FROM processes WHERE work_id = ?1",
        params![work_id],
        |row| {
            Ok(ProcessRecord {
                work_id: row.get(0)?,
                pid: row.get(1)?,
                started_at: row.get(2)?,
            })
        },
    )
    .optional()
}

/// Drop the process record for a work.
pub fn clear(conn: &Connection, work_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM processes WHERE work_id = ?1", params![work_id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, works};

    fn setup_work(conn: &Connection, id: &str) {
        let work = works::Work::new(id, "feature/x", "main", None, false, "2026-03-01T00:00:00Z");
        works::insert(conn, &work).unwrap();
    }

    #[test]
    fn test_record_and_get() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        record(&conn, "w-1", 4242, "2026-03-01T10:00:00Z").unwrap();

        let rec = get(&conn, "w-1").unwrap().unwrap();
        assert_eq!(rec.pid, 4242);
        assert_eq!(rec.started_at, "2026-03-01T10:00:00Z");
    }

    #[test]
    fn test_record_replaces_previous() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        record(&conn, "w-1", 100, "2026-03-01T10:00:00Z").unwrap();
        record(&conn, "w-1", 200, "2026-03-01T11:00:00Z").unwrap();

        let rec = get(&conn, "w-1").unwrap().unwrap();
        assert_eq!(rec.pid, 200);
    }

    #[test]
    fn test_clear() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        record(&conn, "w-1", 100, "2026-03-01T10:00:00Z").unwrap();

        clear(&conn, "w-1").unwrap();
        assert!(get(&conn, "w-1").unwrap().is_none());
    }
}
