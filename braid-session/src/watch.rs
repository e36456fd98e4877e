//! Blocking wait on task completion.
//!
//! Watches the store directory and re-polls on change, with a periodic
//! fallback poll so a missed event cannot hang the wait.

use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{Event, RecursiveMode, Watcher};
use serde::Serialize;

use crate::db;
use crate::error::{Result, SessionError};

/// Result of waiting for a task to finish.
#[derive(Debug, Clone, Serialize)]
pub struct WaitResult {
    pub task_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Block until the task reaches a terminal status (completed or failed).
pub fn wait_for_task(
    db_path: &Path,
    task_id: &str,
    timeout_secs: Option<u64>,
) -> Result<WaitResult> {
    let start = Instant::now();
    let timeout = timeout_secs.map(Duration::from_secs);

    if let Some(result) = check_task(db_path, task_id)? {
        return Ok(result);
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: std::result::Result<Event, _>| {
        if let Ok(_event) = res {
            let _ = tx.send(());
        }
    })
    .map_err(|e| SessionError::Timeout(format!("Failed to create watcher: {}", e)))?;

    // Watch the store's directory: WAL activity shows up as sibling files.
    let watch_dir = db_path
        .parent()
        .ok_or_else(|| SessionError::DirectoryNotFound(db_path.display().to_string()))?;
    watcher
        .watch(watch_dir, RecursiveMode::NonRecursive)
        .map_err(|e| SessionError::Timeout(format!("Failed to watch: {}", e)))?;

    loop {
        if let Some(t) = timeout {
            if start.elapsed() > t {
                return Err(SessionError::Timeout(format!(
                    "task {} after {}s",
                    task_id,
                    t.as_secs()
                )));
            }
        }

        // Event or 1s fallback tick, whichever first.
        let _ = rx.recv_timeout(Duration::from_secs(1));

        if let Some(result) = check_task(db_path, task_id)? {
            return Ok(result);
        }
    }
}

fn check_task(db_path: &Path, task_id: &str) -> Result<Option<WaitResult>> {
    let conn = db::open_or_create(db_path)?;
    let task = match db::tasks::get(&conn, task_id)? {
        Some(t) => t,
        None => return Err(SessionError::TaskNotFound(task_id.to_string())),
    };
    match task.status.as_str() {
        "completed" | "failed" => Ok(Some(WaitResult {
            task_id: task.id,
            status: task.status,
            error: task.error,
        })),
        _ => Ok(None),
    }
}
