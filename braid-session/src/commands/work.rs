use std::path::Path;

use chrono::Utc;

use braid_session::db::{assignments, works};
use braid_session::progress;
use braid_session::scheduler::{self, ControlPlane, WorktreeParams};
use braid_session::tmux::TmuxDriver;

/// Options for creating a new work.
pub struct StartOptions<'a> {
    pub id: Option<&'a str>,
    pub branch: &'a str,
    pub base: Option<&'a str>,
    pub issue: Option<&'a str>,
    pub auto: bool,
    pub from_existing: bool,
    pub pr: Option<u64>,
}

/// Create a work, schedule its worktree, and make sure the control plane is
/// up to execute it.
pub fn start(project: &Path, opts: &StartOptions) -> anyhow::Result<u8> {
    let (config, conn) = super::open_project(project)?;
    let now = Utc::now();

    let work_id = match opts.id {
        Some(id) => id.to_string(),
        None => default_work_id(opts.branch),
    };
    if works::get(&conn, &work_id)?.is_some() {
        anyhow::bail!("Work '{}' already exists", work_id);
    }

    let base = opts.base.unwrap_or(&config.base_branch);
    let work = works::Work::new(
        &work_id,
        opts.branch,
        base,
        opts.issue,
        opts.auto,
        &now.to_rfc3339(),
    );
    works::insert(&conn, &work)?;

    if let Some(root) = opts.issue {
        assignments::assign(&conn, root, &work_id, None, &now.to_rfc3339())?;
    }

    let params = match opts.pr {
        Some(number) => WorktreeParams::PrRef { number },
        None if opts.from_existing => WorktreeParams::Existing,
        None => WorktreeParams::NewBranch {
            base: base.to_string(),
        },
    };
    let task = scheduler::schedule_create_worktree(&conn, &work_id, &params, now)?;

    println!("Created work {} on branch {}", work_id, opts.branch);
    println!("Scheduled {}", task.id);
    ensure_control_plane(project);
    Ok(0)
}

/// Start the dispatch loop if needed. The intent is already durable, so a
/// failure to start is reported, not fatal: the next ensure picks it up.
pub(super) fn ensure_control_plane(project: &Path) {
    match ControlPlane::new(project).ensure() {
        Ok(true) => println!("Control plane started"),
        Ok(false) => {}
        Err(e) => eprintln!("Warning: control plane not running and could not start: {:#}", e),
    }
}

/// Schedule the worktree teardown for a work.
pub fn destroy(project: &Path, work_id: &str) -> anyhow::Result<u8> {
    let (_config, conn) = super::open_project(project)?;
    let now = Utc::now();

    if works::get(&conn, work_id)?.is_none() {
        anyhow::bail!("Work '{}' not found", work_id);
    }

    let task = scheduler::schedule_destroy_worktree(&conn, work_id, now)?;

    println!("Scheduled {}", task.id);
    ensure_control_plane(project);
    Ok(0)
}

/// Kill a work's orchestrator so the control plane respawns it.
pub fn restart(project: &Path, work_id: &str) -> anyhow::Result<u8> {
    let (_config, conn) = super::open_project(project)?;

    if works::get(&conn, work_id)?.is_none() {
        anyhow::bail!("Work '{}' not found", work_id);
    }

    scheduler::kill_orchestrator(&conn, &TmuxDriver, work_id)?;

    println!("Orchestrator for {} stopped; it respawns with its next task", work_id);
    ensure_control_plane(project);
    Ok(0)
}

/// List all works with their derived state.
pub fn list(project: &Path) -> anyhow::Result<u8> {
    let (config, conn) = super::open_project(project)?;
    let threshold = chrono::Duration::seconds(config.staleness_threshold_secs as i64);
    let all = progress::all_progress(&conn, threshold, Utc::now())?;

    if all.is_empty() {
        println!("No works");
        return Ok(0);
    }

    for p in all {
        let done = p.tasks.iter().filter(|t| t.status == "completed").count();
        println!(
            "{}  {}  {}  tasks {}/{}  beads {}",
            p.work.id,
            p.work.branch,
            p.derived_state,
            done,
            p.tasks.len(),
            p.beads.len(),
        );
    }
    Ok(0)
}

/// Default work id: a branch slug plus a short random suffix.
fn default_work_id(branch: &str) -> String {
    let slug: String = branch
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    let suffix = uuid::Uuid::new_v4().to_string();
    format!("w-{}-{}", slug, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_work_id_slugs_branch() {
        let id = default_work_id("feature/Auth Flow");
        assert!(id.starts_with("w-feature-auth-flow-"));
        // slug + 8 hex chars of suffix
        assert_eq!(id.len(), "w-feature-auth-flow-".len() + 8);
    }

    #[test]
    fn test_default_work_ids_are_unique() {
        assert_ne!(default_work_id("main"), default_work_id("main"));
    }
}
