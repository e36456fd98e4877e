use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;

use braid_session::config::ProjectConfig;
use braid_session::db::{assignments, heartbeats, tasks, works};
use braid_session::model::TaskStatus;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// The per-work orchestrator loop.
///
/// Runs inside the tmux session the supervisor opens: writes heartbeats,
/// claims this work's agent tasks (review/pr/implement), and runs the
/// configured agent command against the worktree. Without an agent command
/// it only heartbeats; the tasks are then driven from inside the session by
/// hand.
pub fn run(project: &Path, work_id: &str, once: bool) -> anyhow::Result<u8> {
    let (config, conn) = super::open_project(project)?;
    if works::get(&conn, work_id)?.is_none() {
        anyhow::bail!("Work '{}' not found", work_id);
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) {
        heartbeats::beat(&conn, work_id, Utc::now())?;

        let claimed = if config.agent_cmd.is_some() {
            claim_next_agent_task(&conn, work_id)?
        } else {
            None
        };

        match claimed {
            Some(task) => {
                execute_agent_task(&config, &conn, work_id, &task)?;
            }
            None => {
                let work = works::get(&conn, work_id)?
                    .ok_or_else(|| anyhow::anyhow!("Work '{}' disappeared", work_id))?;
                if matches!(work.status.as_str(), "completed" | "failed" | "merged") {
                    break;
                }
                if once {
                    break;
                }
                idle_wait(&running);
                continue;
            }
        }

        if once {
            break;
        }
    }

    Ok(0)
}

/// Sleep through one heartbeat interval, waking early on ctrl-c.
fn idle_wait(running: &AtomicBool) {
    for _ in 0..HEARTBEAT_INTERVAL.as_secs() {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// Claim the oldest pending agent task for this work, FIFO by seq.
fn claim_next_agent_task(
    conn: &Connection,
    work_id: &str,
) -> anyhow::Result<Option<tasks::Task>> {
    let pending =
        tasks::pending_by_work_and_types(conn, work_id, &["review", "pr", "implement"])?;
    for task in pending {
        if tasks::claim(conn, &task.id, &Utc::now().to_rfc3339())? {
            return Ok(Some(task));
        }
    }
    Ok(None)
}

fn execute_agent_task(
    config: &ProjectConfig,
    conn: &Connection,
    work_id: &str,
    task: &tasks::Task,
) -> anyhow::Result<()> {
    works::update_status(conn, work_id, "processing")?;
    set_bead_statuses(conn, &task.id, "processing")?;

    let outcome = run_agent_command(config, conn, work_id, task);
    let now = Utc::now().to_rfc3339();

    match outcome {
        Ok(()) => {
            tasks::update_status(conn, &task.id, TaskStatus::Completed, None, &now)?;
            set_bead_statuses(conn, &task.id, "completed")?;
            works::update_status(conn, work_id, "idle")?;
            println!("{} completed", task.id);
        }
        Err(msg) => {
            tasks::update_status(conn, &task.id, TaskStatus::Failed, Some(&msg), &now)?;
            set_bead_statuses(conn, &task.id, "failed")?;
            works::update_status(conn, work_id, "failed")?;
            println!("{} failed: {}", task.id, msg);
        }
    }
    Ok(())
}

/// Run the configured agent command in the worktree.
///
/// Returns the failure text (captured stderr or exit status) on error; the
/// caller stores it on the task row.
fn run_agent_command(
    config: &ProjectConfig,
    conn: &Connection,
    work_id: &str,
    task: &tasks::Task,
) -> Result<(), String> {
    let template = config
        .agent_cmd
        .as_deref()
        .ok_or_else(|| "no agent_cmd configured".to_string())?;

    let work = works::get(conn, work_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("work '{}' not found", work_id))?;
    let worktree = work
        .worktree_path
        .as_deref()
        .ok_or_else(|| format!("work '{}' has no worktree yet", work_id))?;

    let beads: Vec<String> = assignments::list_by_task(conn, &task.id)
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|a| a.bead_id)
        .collect();

    let cmd = template
        .replace("{task}", &task.id)
        .replace("{type}", &task.task_type)
        .replace("{work}", work_id)
        .replace("{beads}", &beads.join(","));

    let output = Command::new("sh")
        .arg("-c")
        .arg(&cmd)
        .current_dir(worktree)
        .output()
        .map_err(|e| format!("failed to spawn agent command: {}", e))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "agent command exited {}: {}",
            output.status,
            stderr.trim()
        ))
    }
}

fn set_bead_statuses(conn: &Connection, task_id: &str, status: &str) -> anyhow::Result<()> {
    for a in assignments::list_by_task(conn, task_id)? {
        assignments::update_status(conn, &a.bead_id, status)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_session::scheduler;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        braid_session::db::migrations::migrate(&conn).unwrap();
        let work =
            works::Work::new("w-1", "feature/x", "main", None, false, "2026-03-01T00:00:00Z");
        works::insert(&conn, &work).unwrap();
        conn
    }

    #[test]
    fn test_claim_next_agent_task_is_fifo_and_skips_infra() {
        let conn = test_conn();
        let now = Utc::now();
        scheduler::schedule_create_worktree(
            &conn,
            "w-1",
            &braid_session::scheduler::WorktreeParams::Existing,
            now,
        )
        .unwrap();
        scheduler::schedule_review(&conn, "w-1", now).unwrap();
        scheduler::schedule_pr(&conn, "w-1", now).unwrap();

        // The infra task is left alone; the review comes first.
        let first = claim_next_agent_task(&conn, "w-1").unwrap().unwrap();
        assert_eq!(first.task_type, "review");

        let second = claim_next_agent_task(&conn, "w-1").unwrap().unwrap();
        assert_eq!(second.task_type, "pr");

        assert!(claim_next_agent_task(&conn, "w-1").unwrap().is_none());

        let infra = tasks::get(&conn, "w-1.1").unwrap().unwrap();
        assert_eq!(infra.status, "pending");
    }

    #[test]
    fn test_claimed_task_is_processing() {
        let conn = test_conn();
        scheduler::schedule_review(&conn, "w-1", Utc::now()).unwrap();

        let task = claim_next_agent_task(&conn, "w-1").unwrap().unwrap();
        let stored = tasks::get(&conn, &task.id).unwrap().unwrap();
        assert_eq!(stored.status, "processing");
    }
}
