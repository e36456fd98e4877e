//! The control-plane dispatch loop.
//!
//! Claims pending infra tasks (worktree create/destroy, feedback checks,
//! estimate grouping) and executes them exactly once; agent tasks are left
//! for the work's orchestrator, which the loop keeps alive. External
//! commands run in spawn_blocking under a bounded timeout and never touch
//! the store, so a timed-out handler cannot half-apply task state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use braid_session::beads::BeadClient;
use braid_session::clock::Clock;
use braid_session::db::{assignments, heartbeats, processes, tasks, works};
use braid_session::error::SessionError;
use braid_session::model::TaskStatus;
use braid_session::scheduler::{self, WorktreeParams};
use braid_session::tmux::{session_name, SessionDriver};
use braid_session::worktree::{WorktreeManager, WorktreeSource};

use crate::feedback::{self, PrStatusSource};
use crate::supervisor::Supervisor;

/// Task types the dispatch loop executes itself.
const INFRA_TYPES: &[&str] = &[
    "create_worktree",
    "destroy_worktree",
    "pr_feedback_check",
    "estimate",
];

/// Task types executed by orchestrators.
const AGENT_TYPES: &[&str] = &["review", "pr", "implement"];

pub struct Dispatcher {
    conn: Connection,
    manager: Arc<WorktreeManager>,
    session: Arc<dyn SessionDriver>,
    pr_source: Arc<dyn PrStatusSource>,
    beads: Arc<dyn BeadClient>,
    supervisor: Supervisor,
    clock: Arc<dyn Clock>,
    repo_root: PathBuf,
    group_size: usize,
    task_timeout: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: Connection,
        manager: Arc<WorktreeManager>,
        session: Arc<dyn SessionDriver>,
        pr_source: Arc<dyn PrStatusSource>,
        beads: Arc<dyn BeadClient>,
        supervisor: Supervisor,
        clock: Arc<dyn Clock>,
        repo_root: PathBuf,
        group_size: usize,
        task_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            manager,
            session,
            pr_source,
            beads,
            supervisor,
            clock,
            repo_root,
            group_size,
            task_timeout,
        }
    }

    /// Drain pending infra tasks, then make sure every work with queued
    /// agent tasks has a live orchestrator. Returns how many tasks ran.
    ///
    /// Cancellation is checked at task boundaries only: the in-flight
    /// external step finishes before the loop stops.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<usize> {
        let mut executed = 0;

        while !cancel.is_cancelled() {
            let Some(task) = tasks::next_pending(&self.conn, INFRA_TYPES)? else {
                break;
            };
            let now = self.clock.now().to_rfc3339();
            if !tasks::claim(&self.conn, &task.id, &now)? {
                // Someone else won the row; look again.
                continue;
            }
            info!(task = %task.id, task_type = %task.task_type, "dispatching");

            let outcome = self.execute(&task).await;
            let now = self.clock.now().to_rfc3339();
            match outcome {
                Ok(()) => {
                    tasks::update_status(&self.conn, &task.id, TaskStatus::Completed, None, &now)?;
                    info!(task = %task.id, "completed");
                }
                Err(msg) => {
                    tasks::update_status(
                        &self.conn,
                        &task.id,
                        TaskStatus::Failed,
                        Some(&msg),
                        &now,
                    )?;
                    // Left failed for an explicit reset; task bodies mutate
                    // external state, so a silent retry risks double effects.
                    error!(task = %task.id, error = %msg, "failed");
                }
            }
            executed += 1;
        }

        if !cancel.is_cancelled() {
            for work_id in tasks::works_with_pending(&self.conn, AGENT_TYPES)? {
                if let Err(e) = self.supervisor.ensure_orchestrator(&self.conn, &work_id) {
                    warn!(work = %work_id, error = %e, "could not ensure orchestrator");
                }
            }
        }

        Ok(executed)
    }

    async fn execute(&self, task: &tasks::Task) -> std::result::Result<(), String> {
        match task.task_type.as_str() {
            "create_worktree" => self.execute_create_worktree(task).await,
            "destroy_worktree" => self.execute_destroy_worktree(task).await,
            "pr_feedback_check" => self.execute_feedback_check(task).await,
            "estimate" => self.execute_estimate(task).await,
            other => Err(format!("unknown task type '{}'", other)),
        }
    }

    async fn execute_create_worktree(&self, task: &tasks::Task) -> std::result::Result<(), String> {
        let work = self.work_of(task)?;
        let params: WorktreeParams = task
            .params
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| format!("invalid create_worktree params: {}", e))?
            .unwrap_or(WorktreeParams::NewBranch {
                base: work.base_branch.clone(),
            });

        let source = match params {
            WorktreeParams::NewBranch { base } => WorktreeSource::NewBranch { base },
            WorktreeParams::Existing => WorktreeSource::ExistingBranch,
            WorktreeParams::PrRef { number } => WorktreeSource::PrRef { number },
        };

        let manager = Arc::clone(&self.manager);
        let work_id = work.id.clone();
        let branch = work.branch.clone();
        let path = self
            .bounded(move || manager.create(&work_id, &branch, &source))
            .await?;

        works::update_worktree_path(&self.conn, &work.id, &path.to_string_lossy())
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn execute_destroy_worktree(&self, task: &tasks::Task) -> std::result::Result<(), String> {
        let work = self.work_of(task)?;

        let session = Arc::clone(&self.session);
        let manager = Arc::clone(&self.manager);
        let name = session_name(&work.id);
        let worktree_path = work.worktree_path.clone().map(PathBuf::from);
        self.bounded(move || {
            session.terminate(&name)?;
            if let Some(path) = worktree_path {
                manager.destroy(&path)?;
            }
            Ok(())
        })
        .await?;

        works::clear_worktree_path(&self.conn, &work.id).map_err(|e| e.to_string())?;
        heartbeats::clear(&self.conn, &work.id).map_err(|e| e.to_string())?;
        processes::clear(&self.conn, &work.id).map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn execute_feedback_check(&self, task: &tasks::Task) -> std::result::Result<(), String> {
        let work = self.work_of(task)?;

        let pr_source = Arc::clone(&self.pr_source);
        let repo = self.repo_root.clone();
        let branch = work.branch.clone();
        let snapshot = self
            .bounded_anyhow(move || pr_source.fetch(&repo, &branch))
            .await?;

        feedback::apply_snapshot(&self.conn, &work, snapshot.as_ref()).map_err(|e| e.to_string())
    }

    /// Group the work's unpinned beads into implement tasks.
    ///
    /// Auto works get chunks of `group_size` in priority order with summed
    /// budgets; everything else gets one implement task per bead.
    async fn execute_estimate(&self, task: &tasks::Task) -> std::result::Result<(), String> {
        let work = self.work_of(task)?;
        let now = self.clock.now();

        let mut unpinned =
            assignments::unpinned_by_work(&self.conn, &work.id).map_err(|e| e.to_string())?;

        // A bare root issue expands to its open dependents first.
        if unpinned.is_empty() {
            if let Some(root) = work.root_issue.clone() {
                let beads = Arc::clone(&self.beads);
                let dependents = self
                    .bounded(move || beads.list_dependents(&root))
                    .await?;
                for bead in dependents {
                    if bead.status == braid_session::beads::BeadStatus::Closed {
                        continue;
                    }
                    match assignments::assign(
                        &self.conn,
                        &bead.id,
                        &work.id,
                        None,
                        &now.to_rfc3339(),
                    ) {
                        Ok(()) => {}
                        Err(SessionError::BeadAlreadyAssigned { bead, work }) => {
                            warn!(bead = %bead, work = %work, "bead already taken, skipping");
                        }
                        Err(e) => return Err(e.to_string()),
                    }
                }
                unpinned = assignments::unpinned_by_work(&self.conn, &work.id)
                    .map_err(|e| e.to_string())?;
            }
        }

        if unpinned.is_empty() {
            return Ok(());
        }

        // Priority and estimate lookups; beads the backend no longer knows
        // keep defaults and sort last by id.
        let ids: Vec<String> = unpinned.iter().map(|a| a.bead_id.clone()).collect();
        let beads = Arc::clone(&self.beads);
        let fetch_ids = ids.clone();
        let details = self
            .bounded(move || {
                let mut out = Vec::new();
                for id in &fetch_ids {
                    if let Some(b) = beads.get_bead(id)? {
                        out.push(b);
                    }
                }
                Ok(out)
            })
            .await?;
        let by_id: HashMap<String, (i64, Option<i64>)> = details
            .into_iter()
            .map(|b| (b.id.clone(), (b.priority, b.estimate)))
            .collect();

        let mut ordered = ids;
        ordered.sort_by(|a, b| {
            let pa = by_id.get(a).map(|d| d.0).unwrap_or(i64::MAX);
            let pb = by_id.get(b).map(|d| d.0).unwrap_or(i64::MAX);
            pa.cmp(&pb).then_with(|| a.cmp(b))
        });

        let chunk_size = if work.auto { self.group_size } else { 1 };
        for chunk in ordered.chunks(chunk_size) {
            let budget = chunk
                .iter()
                .filter_map(|id| by_id.get(id).and_then(|d| d.1))
                .reduce(|a, b| a + b);
            scheduler::schedule_implement(&self.conn, &work.id, chunk, budget, now)
                .map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    fn work_of(&self, task: &tasks::Task) -> std::result::Result<works::Work, String> {
        works::get(&self.conn, &task.work_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("work '{}' not found", task.work_id))
    }

    /// Run a blocking external step under the task timeout.
    async fn bounded<T, F>(&self, f: F) -> std::result::Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce() -> braid_session::error::Result<T> + Send + 'static,
    {
        match tokio::time::timeout(self.task_timeout, tokio::task::spawn_blocking(f)).await {
            Err(_) => Err(format!("timed out after {}s", self.task_timeout.as_secs())),
            Ok(Err(join)) => Err(format!("task body panicked: {}", join)),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(e.to_string()),
        }
    }

    async fn bounded_anyhow<T, F>(&self, f: F) -> std::result::Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        match tokio::time::timeout(self.task_timeout, tokio::task::spawn_blocking(f)).await {
            Err(_) => Err(format!("timed out after {}s", self.task_timeout.as_secs())),
            Ok(Err(join)) => Err(format!("task body panicked: {}", join)),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
        }
    }
}
