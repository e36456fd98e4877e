//! Orchestrator supervision: one orchestrator OS process per work, hosted in
//! a tmux session, health-checked via heartbeat staleness.
//!
//! Restart kills the pid recorded in the process table, never a
//! pattern-matched process, and is only ever user- or failure-triggered.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Duration;
use rusqlite::Connection;
use tracing::{info, warn};

use braid_session::clock::Clock;
use braid_session::db::{heartbeats, processes, works};
use braid_session::progress;
use braid_session::scheduler;
use braid_session::tmux::{session_name, SessionDriver};

/// Whether ensure_orchestrator had to do anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyRunning,
    Spawned,
}

pub struct Supervisor {
    session: Box<dyn SessionDriver>,
    clock: Box<dyn Clock>,
    staleness: Duration,
    project_root: PathBuf,
    session_bin: PathBuf,
}

impl Supervisor {
    pub fn new(
        session: Box<dyn SessionDriver>,
        clock: Box<dyn Clock>,
        staleness: Duration,
        project_root: &Path,
    ) -> Self {
        Self {
            session,
            clock,
            staleness,
            project_root: project_root.to_path_buf(),
            session_bin: resolve_session_bin(),
        }
    }

    /// True iff the work's heartbeat is within the staleness window.
    pub fn is_alive(&self, conn: &Connection, work_id: &str) -> Result<bool> {
        Ok(progress::is_alive(conn, work_id, self.staleness, self.clock.now())?)
    }

    /// Spawn the orchestrator for a work unless it is already alive.
    pub fn ensure_orchestrator(&self, conn: &Connection, work_id: &str) -> Result<EnsureOutcome> {
        if self.is_alive(conn, work_id)? {
            return Ok(EnsureOutcome::AlreadyRunning);
        }

        let name = session_name(work_id);
        if self.session.exists(&name) {
            // A session with a stale heartbeat is a wedged orchestrator;
            // replace it.
            warn!(work = %work_id, session = %name, "stale orchestrator session, replacing");
            self.session.terminate(&name)?;
        }

        let cwd = self.spawn_dir(conn, work_id)?;
        let command = format!(
            "{} --project {} orchestrate --work {}",
            self.session_bin.display(),
            self.project_root.display(),
            work_id
        );
        self.session.open(&name, &cwd, &command)?;

        let now = self.clock.now();
        // Seed the heartbeat so back-to-back ensure calls don't respawn
        // before the orchestrator's first beat.
        heartbeats::beat(conn, work_id, now)?;
        if let Some(pid) = self.session.pane_pid(&name)? {
            processes::record(conn, work_id, pid, &now.to_rfc3339())?;
        }

        info!(work = %work_id, session = %name, "orchestrator spawned");
        Ok(EnsureOutcome::Spawned)
    }

    /// Kill the recorded orchestrator process and spawn a fresh one.
    pub fn restart(&self, conn: &Connection, work_id: &str) -> Result<EnsureOutcome> {
        scheduler::kill_orchestrator(conn, self.session.as_ref(), work_id)?;
        self.ensure_orchestrator(conn, work_id)
    }

    /// Where the orchestrator runs: the worktree when it exists, the project
    /// root otherwise.
    fn spawn_dir(&self, conn: &Connection, work_id: &str) -> Result<PathBuf> {
        let work = works::get(conn, work_id)?
            .ok_or_else(|| anyhow::anyhow!("Work '{}' not found", work_id))?;
        Ok(work
            .worktree_path
            .map(PathBuf::from)
            .unwrap_or_else(|| self.project_root.clone()))
    }
}

/// Resolve the braid CLI binary the orchestrator runs as.
fn resolve_session_bin() -> PathBuf {
    if let Ok(path) = std::env::var("BRAID_SESSION_BIN") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let sibling = dir.join("braid");
            if sibling.exists() {
                return sibling;
            }
        }
    }

    PathBuf::from("braid")
}
