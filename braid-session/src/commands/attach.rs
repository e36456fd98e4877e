use std::path::Path;

use braid_session::db::works;
use braid_session::tmux::{session_name, SessionDriver, TmuxDriver};

/// Switch the attached tmux client to a work's orchestrator session.
pub fn run(project: &Path, work_id: &str) -> anyhow::Result<u8> {
    let (_config, conn) = super::open_project(project)?;
    if works::get(&conn, work_id)?.is_none() {
        anyhow::bail!("Work '{}' not found", work_id);
    }

    let driver = TmuxDriver;
    let name = session_name(work_id);
    if !driver.exists(&name) {
        anyhow::bail!("No session '{}'. Is the orchestrator running?", name);
    }
    driver.switch_to(&name)?;
    Ok(0)
}
