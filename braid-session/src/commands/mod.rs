pub mod attach;
pub mod daemon;
pub mod init;
pub mod orchestrate;
pub mod schedule;
pub mod status;
pub mod task;
pub mod tree;
pub mod wait;
pub mod work;

use std::path::Path;

use rusqlite::Connection;

use braid_session::config::ProjectConfig;
use braid_session::db;

/// Load project config and open the store with migrations applied.
pub fn open_project(project: &Path) -> anyhow::Result<(ProjectConfig, Connection)> {
    let config = ProjectConfig::load(project, None)?;
    let conn = db::open_and_migrate(&config.db_path)?;
    Ok((config, conn))
}
