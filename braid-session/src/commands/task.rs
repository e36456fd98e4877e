use std::path::Path;

use chrono::Utc;

use braid_session::db::tasks;

/// Reset a failed (or completed) task back to pending for re-execution.
pub fn reset(project: &Path, task_id: &str) -> anyhow::Result<u8> {
    let (_config, conn) = super::open_project(project)?;

    tasks::reset(&conn, task_id, &Utc::now().to_rfc3339())?;

    println!("Reset {} to pending", task_id);
    Ok(0)
}
