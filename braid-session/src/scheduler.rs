//! Scheduling intents and control-plane bootstrap.
//!
//! Intents persist Task rows; they never execute anything inline. Execution
//! belongs to the braid-daemon dispatch loop, and `ControlPlane::ensure` is
//! the recovery path that guarantees a loop is running to pick them up.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{assignments, heartbeats, processes, tasks, works};
use crate::error::{Result, SessionError};
use crate::model::TaskType;
use crate::tmux::{session_name, SessionDriver};

/// Parameters persisted on a create_worktree task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WorktreeParams {
    NewBranch { base: String },
    Existing,
    PrRef { number: u64 },
}

/// Persist a create_worktree task for a work.
pub fn schedule_create_worktree(
    conn: &Connection,
    work_id: &str,
    params: &WorktreeParams,
    now: DateTime<Utc>,
) -> Result<tasks::Task> {
    let params_json = serde_json::to_string(params)
        .map_err(|e| SessionError::WorktreeError(format!("params encode: {}", e)))?;
    insert_task(conn, work_id, TaskType::CreateWorktree, None, Some(params_json), now)
}

/// Persist a destroy_worktree task for a work.
pub fn schedule_destroy_worktree(
    conn: &Connection,
    work_id: &str,
    now: DateTime<Utc>,
) -> Result<tasks::Task> {
    insert_task(conn, work_id, TaskType::DestroyWorktree, None, None, now)
}

/// Persist a review task for a work.
pub fn schedule_review(conn: &Connection, work_id: &str, now: DateTime<Utc>) -> Result<tasks::Task> {
    insert_task(conn, work_id, TaskType::Review, None, None, now)
}

/// Persist a pr task for a work.
pub fn schedule_pr(conn: &Connection, work_id: &str, now: DateTime<Utc>) -> Result<tasks::Task> {
    insert_task(conn, work_id, TaskType::Pr, None, None, now)
}

/// Persist an estimate task for a work.
pub fn schedule_estimate(
    conn: &Connection,
    work_id: &str,
    budget: Option<i64>,
    now: DateTime<Utc>,
) -> Result<tasks::Task> {
    insert_task(conn, work_id, TaskType::Estimate, budget, None, now)
}

/// Persist an implement task and pin the given beads to it.
pub fn schedule_implement(
    conn: &Connection,
    work_id: &str,
    bead_ids: &[String],
    budget: Option<i64>,
    now: DateTime<Utc>,
) -> Result<tasks::Task> {
    let task = insert_task(conn, work_id, TaskType::Implement, budget, None, now)?;
    for bead in bead_ids {
        assignments::assign(conn, bead, work_id, Some(&task.id), &now.to_rfc3339())?;
    }
    Ok(task)
}

/// Persist (or re-arm) the singleton pr_feedback_check task for a work.
///
/// One feedback row per work: re-scheduling after completion resets the
/// existing row to pending instead of accumulating dead rows.
pub fn schedule_feedback_check(
    conn: &Connection,
    work_id: &str,
    now: DateTime<Utc>,
) -> Result<tasks::Task> {
    let id = feedback_task_id(work_id);
    match tasks::get(conn, &id)? {
        Some(existing) => {
            match existing.status.as_str() {
                // Still queued or running; nothing to do.
                "pending" | "processing" => Ok(existing),
                _ => {
                    tasks::reset(conn, &id, &now.to_rfc3339())?;
                    tasks::get(conn, &id)?
                        .ok_or_else(|| SessionError::TaskNotFound(id.clone()))
                }
            }
        }
        None => {
            let seq = allocate_seq(conn, work_id)?;
            let task = tasks::Task {
                id,
                work_id: work_id.to_string(),
                seq,
                task_type: TaskType::PrFeedbackCheck.to_string(),
                status: "pending".to_string(),
                budget: None,
                params: None,
                error: None,
                created_at: now.to_rfc3339(),
                updated_at: now.to_rfc3339(),
            };
            tasks::insert(conn, &task)?;
            Ok(task)
        }
    }
}

/// The singleton feedback task id for a work.
pub fn feedback_task_id(work_id: &str) -> String {
    format!("{}.feedback", work_id)
}

fn allocate_seq(conn: &Connection, work_id: &str) -> Result<i64> {
    match works::allocate_task_seq(conn, work_id) {
        Ok(seq) => Ok(seq),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(SessionError::WorkNotFound(work_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn insert_task(
    conn: &Connection,
    work_id: &str,
    task_type: TaskType,
    budget: Option<i64>,
    params: Option<String>,
    now: DateTime<Utc>,
) -> Result<tasks::Task> {
    let seq = allocate_seq(conn, work_id)?;
    let task = tasks::Task {
        id: format!("{}.{}", work_id, seq),
        work_id: work_id.to_string(),
        seq,
        task_type: task_type.to_string(),
        status: "pending".to_string(),
        budget,
        params,
        error: None,
        created_at: now.to_rfc3339(),
        updated_at: now.to_rfc3339(),
    };
    tasks::insert(conn, &task)?;
    Ok(task)
}

/// Handle to the per-project control-plane daemon.
///
/// Liveness is a pid file under the project state dir plus a signal-0 probe;
/// stale pid files are cleaned up on read.
pub struct ControlPlane {
    project_root: PathBuf,
    daemon_bin: Option<PathBuf>,
}

impl ControlPlane {
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            daemon_bin: None,
        }
    }

    /// Use an explicit daemon binary instead of resolving one.
    pub fn with_daemon_bin(mut self, bin: PathBuf) -> Self {
        self.daemon_bin = Some(bin);
        self
    }

    /// Path of the daemon pid file for this project.
    pub fn pid_path(&self) -> PathBuf {
        crate::config::state_dir(&self.project_root).join("daemon.pid")
    }

    /// Start the daemon if it is not already running.
    ///
    /// Returns true iff this call spawned one. Idempotent: a second call in
    /// immediate succession reports false.
    pub fn ensure(&self) -> anyhow::Result<bool> {
        if self.running_pid().is_some() {
            return Ok(false);
        }

        let daemon_bin = self.resolve_daemon_bin();
        let mut child = Command::new(&daemon_bin)
            .arg("--project")
            .arg(&self.project_root)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to launch braid-daemon (binary: {}): {}",
                    daemon_bin.display(),
                    e
                )
            })?;

        let pid = child.id();

        // Detect immediate startup failures (e.g. wrong/old daemon binary).
        std::thread::sleep(Duration::from_millis(250));
        if let Some(status) = child.try_wait()? {
            anyhow::bail!(
                "braid-daemon exited immediately (status: {}) using binary '{}'",
                status,
                daemon_bin.display()
            );
        }

        self.write_pid(pid)?;
        Ok(true)
    }

    /// Stop the daemon by sending SIGTERM to the recorded pid.
    pub fn stop(&self) -> anyhow::Result<()> {
        let pid = self
            .running_pid()
            .ok_or_else(|| anyhow::anyhow!("Daemon is not running"))?;

        #[cfg(unix)]
        {
            unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        }

        self.remove_pid()?;
        Ok(())
    }

    /// Check if the daemon is running. Returns the pid if so.
    pub fn status(&self) -> Option<u32> {
        self.running_pid()
    }

    /// Read the pid file and check the process is still alive.
    fn running_pid(&self) -> Option<u32> {
        let path = self.pid_path();
        if !path.exists() {
            return None;
        }

        let mut contents = String::new();
        fs::File::open(&path)
            .ok()?
            .read_to_string(&mut contents)
            .ok()?;

        let pid: u32 = contents.trim().parse().ok()?;

        if is_process_alive(pid) {
            Some(pid)
        } else {
            // Stale pid file - clean up
            let _ = fs::remove_file(&path);
            None
        }
    }

    fn resolve_daemon_bin(&self) -> PathBuf {
        if let Some(path) = &self.daemon_bin {
            return path.clone();
        }

        if let Ok(path) = std::env::var("BRAID_DAEMON_BIN") {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Ok(current_exe) = std::env::current_exe() {
            if let Some(dir) = current_exe.parent() {
                let sibling = dir.join("braid-daemon");
                if sibling.exists() {
                    return sibling;
                }
            }
        }

        PathBuf::from("braid-daemon")
    }

    fn write_pid(&self, pid: u32) -> anyhow::Result<()> {
        let path = self.pid_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&path)?;
        write!(file, "{}", pid)?;
        Ok(())
    }

    fn remove_pid(&self) -> anyhow::Result<()> {
        let path = self.pid_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Kill a work's recorded orchestrator process and clear its liveness rows.
///
/// Kills exactly the pid in the process table (never a pattern match), waits
/// briefly for the OS to reap it, then closes the tmux session and drops the
/// heartbeat so the next ensure sees the orchestrator as gone. Only ever
/// user- or failure-triggered.
pub fn kill_orchestrator(
    conn: &Connection,
    session: &dyn SessionDriver,
    work_id: &str,
) -> Result<()> {
    if let Some(record) = processes::get(conn, work_id)? {
        if is_process_alive(record.pid) {
            #[cfg(unix)]
            {
                unsafe { libc::kill(record.pid as i32, libc::SIGTERM) };
            }
            wait_for_exit(record.pid);
        }
        processes::clear(conn, work_id)?;
    }

    session.terminate(&session_name(work_id))?;
    heartbeats::clear(conn, work_id)?;
    Ok(())
}

/// Give the OS a moment to reap a signalled process.
fn wait_for_exit(pid: u32) {
    for _ in 0..10 {
        if !is_process_alive(pid) {
            return;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

/// Check if a process with the given pid is alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // kill -0 checks if process exists without sending a signal
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn setup_work(conn: &Connection, id: &str) {
        let work = works::Work::new(id, "feature/x", "main", None, false, "2026-03-01T00:00:00Z");
        works::insert(conn, &work).unwrap();
    }

    fn now() -> DateTime<Utc> {
        "2026-03-01T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_schedule_create_worktree_persists_params() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        let params = WorktreeParams::NewBranch {
            base: "main".to_string(),
        };
        let task = schedule_create_worktree(&conn, "w-1", &params, now()).unwrap();

        assert_eq!(task.id, "w-1.1");
        assert_eq!(task.task_type, "create_worktree");
        assert_eq!(task.status, "pending");

        let decoded: WorktreeParams =
            serde_json::from_str(task.params.as_deref().unwrap()).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_schedule_against_missing_work() {
        let conn = test_db();
        let err = schedule_review(&conn, "w-none", now()).unwrap_err();
        assert!(matches!(err, SessionError::WorkNotFound(_)));
    }

    #[test]
    fn test_task_ids_increase_across_intents() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        let t1 = schedule_review(&conn, "w-1", now()).unwrap();
        let t2 = schedule_pr(&conn, "w-1", now()).unwrap();
        let t3 = schedule_destroy_worktree(&conn, "w-1", now()).unwrap();

        assert_eq!(t1.id, "w-1.1");
        assert_eq!(t2.id, "w-1.2");
        assert_eq!(t3.id, "w-1.3");
    }

    #[test]
    fn test_schedule_implement_pins_beads() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        let beads = vec!["bd-1".to_string(), "bd-2".to_string()];
        let task = schedule_implement(&conn, "w-1", &beads, Some(5), now()).unwrap();

        assert_eq!(task.budget, Some(5));
        let pinned = assignments::list_by_task(&conn, &task.id).unwrap();
        let ids: Vec<&str> = pinned.iter().map(|a| a.bead_id.as_str()).collect();
        assert_eq!(ids, vec!["bd-1", "bd-2"]);
    }

    #[test]
    fn test_feedback_check_is_singleton() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        let t1 = schedule_feedback_check(&conn, "w-1", now()).unwrap();
        assert_eq!(t1.id, "w-1.feedback");

        // Re-scheduling while pending changes nothing.
        let t2 = schedule_feedback_check(&conn, "w-1", now()).unwrap();
        assert_eq!(t2.id, t1.id);
        assert_eq!(tasks::list_by_work(&conn, "w-1").unwrap().len(), 1);
    }

    #[test]
    fn test_feedback_check_rearms_after_completion() {
        let conn = test_db();
        setup_work(&conn, "w-1");

        let t1 = schedule_feedback_check(&conn, "w-1", now()).unwrap();
        tasks::claim(&conn, &t1.id, "2026-03-01T10:01:00Z").unwrap();
        tasks::update_status(
            &conn,
            &t1.id,
            crate::model::TaskStatus::Completed,
            None,
            "2026-03-01T10:02:00Z",
        )
        .unwrap();

        let t2 = schedule_feedback_check(&conn, "w-1", now()).unwrap();
        assert_eq!(t2.id, t1.id);
        assert_eq!(t2.status, "pending");
        assert_eq!(tasks::list_by_work(&conn, "w-1").unwrap().len(), 1);
    }

    struct NoopSession;

    impl SessionDriver for NoopSession {
        fn open(&self, _name: &str, _cwd: &Path, _command: &str) -> Result<()> {
            Ok(())
        }
        fn exists(&self, _name: &str) -> bool {
            false
        }
        fn terminate(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn switch_to(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn pane_pid(&self, _name: &str) -> Result<Option<u32>> {
            Ok(None)
        }
    }

    #[test]
    fn test_kill_orchestrator_clears_liveness_rows() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        // A pid that cannot exist, so no signal is actually sent.
        processes::record(&conn, "w-1", 4_000_000, "2026-03-01T09:00:00Z").unwrap();
        heartbeats::beat(&conn, "w-1", now()).unwrap();

        kill_orchestrator(&conn, &NoopSession, "w-1").unwrap();

        assert!(processes::get(&conn, "w-1").unwrap().is_none());
        assert!(heartbeats::last(&conn, "w-1").unwrap().is_none());
    }

    #[test]
    fn test_kill_orchestrator_without_record_is_safe() {
        let conn = test_db();
        setup_work(&conn, "w-1");
        kill_orchestrator(&conn, &NoopSession, "w-1").unwrap();
    }

    #[test]
    fn test_is_process_alive_current() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000));
    }

    #[test]
    fn test_pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let plane = ControlPlane::new(dir.path());

        assert!(plane.status().is_none());

        // Write our own pid: ensure() must then report "already running".
        plane.write_pid(std::process::id()).unwrap();
        assert_eq!(plane.status(), Some(std::process::id()));
        assert!(!plane.ensure().unwrap());

        plane.remove_pid().unwrap();
        assert!(plane.status().is_none());
    }

    #[test]
    fn test_stale_pid_file_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let plane = ControlPlane::new(dir.path());

        plane.write_pid(4_000_000).unwrap();
        assert!(plane.status().is_none());
        assert!(!plane.pid_path().exists());
    }
}
