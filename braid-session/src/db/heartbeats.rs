use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::OptionalExt;

/// Record a heartbeat for a work's orchestrator process.
pub fn beat(conn: &Connection, work_id: &str, at: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO heartbeats (work_id, beat_at) VALUES (?1, ?2)
         ON CONFLICT(work_id) DO UPDATE SET beat_at = excluded.beat_at",
        params![work_id, at.to_rfc3339()],
    )?;
    Ok(())
}

/// The last observed heartbeat for a work, if any.
pub fn last(conn: &Connection, work_id: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT beat_at FROM heartbeats WHERE work_id = ?1",
            params![work_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|s| s.parse::<DateTime<Utc>>().ok()))
}

/// Drop the heartbeat row when a work's worktree is destroyed.
pub fn clear(conn: &Connection, work_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM heartbeats WHERE work_id = ?1", params![work_id])?;
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
    fn test_beat_upserts() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        let t1 = "2026-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let t2 = "2026-03-01T10:00:30Z".parse::<DateTime<Utc>>().unwrap();

        beat(&conn, "w-1", t1).unwrap();
        assert_eq!(last(&conn, "w-1").unwrap(), Some(t1));

        beat(&conn, "w-1", t2).unwrap();
        assert_eq!(last(&conn, "w-1").unwrap(), Some(t2));
    }

    #[test]
    fn test_last_none_without_beat() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        assert!(last(&conn, "w-1").unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        beat(&conn, "w-1", Utc::now()).unwrap();

        clear(&conn, "w-1").unwrap();
        assert!(last(&conn, "w-1").unwrap().is_none());
    }
}
