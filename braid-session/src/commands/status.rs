use std::path::Path;

use chrono::Utc;

use braid_session::progress;

/// Print progress for one work or all of them.
pub fn run(project: &Path, work_id: Option<&str>, json: bool) -> anyhow::Result<u8> {
    let (config, conn) = super::open_project(project)?;
    let threshold = chrono::Duration::seconds(config.staleness_threshold_secs as i64);
    let now = Utc::now();

    let snapshots = match work_id {
        Some(id) => vec![progress::work_progress(&conn, id, threshold, now)?],
        None => progress::all_progress(&conn, threshold, now)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(0);
    }

    if snapshots.is_empty() {
        println!("No works");
        return Ok(0);
    }

    for p in snapshots {
        println!("{} [{}] branch {}", p.work.id, p.derived_state, p.work.branch);
        if let Some(url) = &p.work.pr_url {
            let unseen = if p.work.has_unseen_changes { " (unseen changes)" } else { "" };
            println!(
                "  pr {} ci {} approval {}{}",
                url, p.work.ci_status, p.work.approval_status, unseen
            );
        }
        for task in &p.tasks {
            let error = task
                .error
                .as_deref()
                .map(|e| format!(" - {}", e))
                .unwrap_or_default();
            println!("  {} {} [{}]{}", task.id, task.task_type, task.status, error);
        }
        for bead in &p.beads {
            let pin = bead.task_id.as_deref().unwrap_or("unpinned");
            println!("  bead {} [{}] {}", bead.bead_id, bead.status, pin);
        }
    }
    Ok(0)
}
