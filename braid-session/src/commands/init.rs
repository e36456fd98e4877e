use std::path::Path;

use braid_session::config::{project_config_path, state_dir};

const DEFAULT_CONFIG: &str = "\
# Braid project configuration.
#
# worktrees_dir = \".braid/worktrees\"
# base_branch = \"main\"
# staleness_threshold_secs = 300
# group_size = 3
# agent_cmd = \"claude -p 'work the {type} task {task} for beads {beads}'\"
";

/// Create the project state dir, store, and a commented config file.
pub fn run(project: &Path) -> anyhow::Result<u8> {
    let dir = state_dir(project);
    std::fs::create_dir_all(&dir)?;

    let (config, _conn) = super::open_project(project)?;

    let config_path = project_config_path(project);
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG)?;
        println!("Wrote {}", config_path.display());
    }

    println!("Initialized braid project at {}", project.display());
    println!("Store: {}", config.db_path.display());
    Ok(0)
}
