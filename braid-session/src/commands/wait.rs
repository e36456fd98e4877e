use std::path::Path;

use braid_session::watch;

/// Block until a task reaches a terminal status.
pub fn run(project: &Path, task_id: &str, timeout: Option<u64>) -> anyhow::Result<u8> {
    let (config, _conn) = super::open_project(project)?;

    let result = watch::wait_for_task(&config.db_path, task_id, timeout)?;
    println!("{}", serde_json::to_string(&result)?);

    if result.status == "completed" {
        Ok(0)
    } else {
        Ok(1)
    }
}
