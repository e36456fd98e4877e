use std::path::Path;

use chrono::Utc;

use braid_session::db::works;
use braid_session::scheduler;

/// Which agent/feedback task to schedule.
pub enum ScheduleKind {
    Review,
    Pr,
    Estimate { budget: Option<i64> },
    Implement { beads: Vec<String>, budget: Option<i64> },
    Feedback,
}

/// Persist the task and ensure the control plane is up.
pub fn run(project: &Path, work_id: &str, kind: ScheduleKind) -> anyhow::Result<u8> {
    let (_config, conn) = super::open_project(project)?;
    let now = Utc::now();

    if works::get(&conn, work_id)?.is_none() {
        anyhow::bail!("Work '{}' not found", work_id);
    }

    let task = match kind {
        ScheduleKind::Review => scheduler::schedule_review(&conn, work_id, now)?,
        ScheduleKind::Pr => scheduler::schedule_pr(&conn, work_id, now)?,
        ScheduleKind::Estimate { budget } => {
            scheduler::schedule_estimate(&conn, work_id, budget, now)?
        }
        ScheduleKind::Implement { beads, budget } => {
            if beads.is_empty() {
                anyhow::bail!("implement requires at least one bead (--beads a,b,c)");
            }
            scheduler::schedule_implement(&conn, work_id, &beads, budget, now)?
        }
        ScheduleKind::Feedback => scheduler::schedule_feedback_check(&conn, work_id, now)?,
    };

    println!("Scheduled {} ({})", task.id, task.task_type);
    super::work::ensure_control_plane(project);
    Ok(0)
}
