//! Read-only progress snapshots for dashboards and CLI reporting.
//!
//! Everything here consults the store and never mutates it.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{assignments, heartbeats, tasks, works};
use crate::error::{Result, SessionError};
use crate::model::DerivedState;
use crate::scheduler::feedback_task_id;

/// Per-work progress snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct WorkProgress {
    pub work: works::Work,
    pub derived_state: DerivedState,
    pub tasks: Vec<tasks::Task>,
    /// Beads assigned to this work with their live status.
    pub beads: Vec<assignments::Assignment>,
    /// Assigned beads not yet pinned to any task.
    pub unassigned_beads: Vec<String>,
    /// Beads pinned to the feedback task.
    pub feedback_beads: Vec<String>,
}

/// True iff a heartbeat for the work was written within the threshold window.
///
/// The boundary is inclusive: a heartbeat exactly `threshold` old still
/// counts as alive; liveness is lost strictly after it.
pub fn is_alive(
    conn: &Connection,
    work_id: &str,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<bool> {
    match heartbeats::last(conn, work_id)? {
        Some(beat) => Ok(now - beat <= threshold),
        None => Ok(false),
    }
}

/// Derived display state for a work.
///
/// Priority order: a processing task wins, then the stored work status for
/// terminal states, then heartbeat liveness, then idle.
pub fn derived_state(
    conn: &Connection,
    work: &works::Work,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<DerivedState> {
    let work_tasks = tasks::list_by_work(conn, &work.id)?;
    if work_tasks.iter().any(|t| t.status == "processing") {
        return Ok(DerivedState::Running);
    }

    match work.status.as_str() {
        "merged" => return Ok(DerivedState::Merged),
        "completed" => return Ok(DerivedState::Completed),
        "failed" => return Ok(DerivedState::Failed),
        _ => {}
    }

    // Only flag dead when an orchestrator has ever reported in; a work that
    // never started one is just idle.
    if heartbeats::last(conn, &work.id)?.is_some()
        && !is_alive(conn, &work.id, threshold, now)?
    {
        return Ok(DerivedState::Dead);
    }

    Ok(DerivedState::Idle)
}

/// Snapshot one work.
pub fn work_progress(
    conn: &Connection,
    work_id: &str,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<WorkProgress> {
    let work = works::get(conn, work_id)?
        .ok_or_else(|| SessionError::WorkNotFound(work_id.to_string()))?;
    snapshot(conn, work, threshold, now)
}

/// Snapshot every work, most recent first.
pub fn all_progress(
    conn: &Connection,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<WorkProgress>> {
    works::list_all(conn)?
        .into_iter()
        .map(|work| snapshot(conn, work, threshold, now))
        .collect()
}

fn snapshot(
    conn: &Connection,
    work: works::Work,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<WorkProgress> {
    let derived = derived_state(conn, &work, threshold, now)?;
    let work_tasks = tasks::list_by_work(conn, &work.id)?;
    let beads = assignments::list_by_work(conn, &work.id)?;
    let unassigned_beads = beads
        .iter()
        .filter(|a| a.task_id.is_none())
        .map(|a| a.bead_id.clone())
        .collect();
    let feedback_id = feedback_task_id(&work.id);
    let feedback_beads = beads
        .iter()
        .filter(|a| a.task_id.as_deref() == Some(feedback_id.as_str()))
        .map(|a| a.bead_id.clone())
        .collect();

    Ok(WorkProgress {
        work,
        derived_state: derived,
        tasks: work_tasks,
        beads,
        unassigned_beads,
        feedback_beads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::model::TaskStatus;
    use crate::scheduler;

    fn setup_work(conn: &Connection, id: &str) -> works::Work {
        let work = works::Work::new(id, "feature/x", "main", None, false, "2026-03-01T00:00:00Z");
        works::insert(conn, &work).unwrap();
        work
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_is_alive_boundary_is_inclusive() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        heartbeats::beat(&conn, "w-1", at("2026-03-01T10:00:00Z")).unwrap();

        let threshold = Duration::seconds(300);

        // Exactly at the threshold: still alive.
        assert!(is_alive(&conn, "w-1", threshold, at("2026-03-01T10:05:00Z")).unwrap());
        // One second past: dead.
        assert!(!is_alive(&conn, "w-1", threshold, at("2026-03-01T10:05:01Z")).unwrap());
        // Well within: alive.
        assert!(is_alive(&conn, "w-1", threshold, at("2026-03-01T10:01:00Z")).unwrap());
    }

    #[test]
    fn test_is_alive_without_heartbeat() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        assert!(!is_alive(&conn, "w-1", Duration::seconds(300), Utc::now()).unwrap());
    }

    #[test]
    fn test_derived_state_priority() {
        let conn = test_db();
        let mut work = setup_work(&conn, "w-1");
        let threshold = Duration::seconds(300);
        let now = at("2026-03-01T10:10:00Z");

        // No tasks, no heartbeat: idle.
        assert_eq!(
            derived_state(&conn, &work, threshold, now).unwrap(),
            DerivedState::Idle
        );

        // Stale heartbeat: dead.
        heartbeats::beat(&conn, "w-1", at("2026-03-01T10:00:00Z")).unwrap();
        assert_eq!(
            derived_state(&conn, &work, threshold, now).unwrap(),
            DerivedState::Dead
        );

        // Terminal work status beats liveness.
        works::update_status(&conn, "w-1", "merged").unwrap();
        work.status = "merged".to_string();
        assert_eq!(
            derived_state(&conn, &work, threshold, now).unwrap(),
            DerivedState::Merged
        );

        // A processing task beats everything.
        let task = scheduler::schedule_review(&conn, "w-1", now).unwrap();
        tasks::claim(&conn, &task.id, &now.to_rfc3339()).unwrap();
        assert_eq!(
            derived_state(&conn, &work, threshold, now).unwrap(),
            DerivedState::Running
        );
    }

    #[test]
    fn test_work_progress_snapshot() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        let now = at("2026-03-01T10:00:00Z");

        let review = scheduler::schedule_review(&conn, "w-1", now).unwrap();
        scheduler::schedule_feedback_check(&conn, "w-1", now).unwrap();
        assignments::assign(&conn, "bd-1", "w-1", None, &now.to_rfc3339()).unwrap();
        assignments::assign(&conn, "bd-2", "w-1", Some(&review.id), &now.to_rfc3339()).unwrap();
        assignments::assign(&conn, "bd-3", "w-1", Some("w-1.feedback"), &now.to_rfc3339())
            .unwrap();

        let progress = work_progress(&conn, "w-1", Duration::seconds(300), now).unwrap();

        assert_eq!(progress.tasks.len(), 2);
        assert_eq!(progress.beads.len(), 3);
        assert_eq!(progress.unassigned_beads, vec!["bd-1"]);
        assert_eq!(progress.feedback_beads, vec!["bd-3"]);
        assert_eq!(progress.derived_state, DerivedState::Idle);
    }

    #[test]
    fn test_work_progress_missing_work() {
        let conn = test_db();
        let err = work_progress(&conn, "w-x", Duration::seconds(300), Utc::now()).unwrap_err();
        assert!(matches!(err, SessionError::WorkNotFound(_)));
    }

    #[test]
    fn test_failed_task_does_not_mark_running() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        let now = at("2026-03-01T10:00:00Z");

        let task = scheduler::schedule_review(&conn, "w-1", now).unwrap();
        tasks::claim(&conn, &task.id, &now.to_rfc3339()).unwrap();
        tasks::update_status(&conn, &task.id, TaskStatus::Failed, Some("x"), &now.to_rfc3339())
            .unwrap();

        let progress = work_progress(&conn, "w-1", Duration::seconds(300), now).unwrap();
        assert_eq!(progress.derived_state, DerivedState::Idle);
    }
}
