use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use braid_daemon::dispatch::Dispatcher;
use braid_daemon::feedback::GhCli;
use braid_daemon::supervisor::Supervisor;

use braid_session::beads::ExecBeadClient;
use braid_session::clock::SystemClock;
use braid_session::config::ProjectConfig;
use braid_session::db;
use braid_session::tmux::TmuxDriver;
use braid_session::worktree::{ExecGit, WorktreeManager};

#[derive(Parser)]
#[command(name = "braid-daemon", about = "Dispatches Braid tasks and supervises orchestrators")]
struct Cli {
    /// Project root directory
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Path to config file (default: <project>/.braid/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let project = cli.project.canonicalize().unwrap_or(cli.project);

    let config = ProjectConfig::load(&project, cli.config.as_ref())?;
    info!(project = %project.display(), db = %config.db_path.display(), "loaded config");

    let conn = db::open_and_migrate(&config.db_path)?;

    let staleness = chrono::Duration::seconds(config.staleness_threshold_secs as i64);
    let manager = Arc::new(WorktreeManager::new(
        Box::new(ExecGit),
        Box::new(ExecGit),
        &project,
        &config.worktrees_dir,
    ));
    let supervisor = Supervisor::new(
        Box::new(TmuxDriver),
        Box::new(SystemClock),
        staleness,
        &project,
    );
    let dispatcher = Dispatcher::new(
        conn,
        manager,
        Arc::new(TmuxDriver),
        Arc::new(GhCli),
        Arc::new(ExecBeadClient::new(&project)),
        supervisor,
        Arc::new(SystemClock),
        project.clone(),
        config.group_size,
        Duration::from_secs(config.task_timeout_secs),
    );

    let cancel = CancellationToken::new();
    let mut tick = tokio::time::interval(Duration::from_secs(config.tick_secs));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("daemon started, entering dispatch loop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                cancel.cancel();
                break;
            }

            _ = tick.tick() => {
                match dispatcher.run_once(&cancel).await {
                    Ok(0) => {}
                    Ok(n) => info!(tasks = n, "dispatch round complete"),
                    Err(e) => error!(error = %e, "dispatch round failed"),
                }
            }
        }
    }

    Ok(())
}
