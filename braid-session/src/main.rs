use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::schedule::ScheduleKind;
use commands::work::StartOptions;

#[derive(Parser)]
#[command(name = "braid")]
#[command(about = "Work lifecycle management for Braid orchestrations")]
#[command(version)]
struct Cli {
    /// Project root directory
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the project state dir, store, and config
    Init,

    /// Work management subcommands
    Work {
        #[command(subcommand)]
        command: WorkCommands,
    },

    /// Schedule a task against a work
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },

    /// Reset a task back to pending for re-execution
    Reset {
        /// Task id (e.g. w-auth.2)
        #[arg(long)]
        task: String,
    },

    /// Render the bead dependency tree
    Tree {
        /// Include closed beads
        #[arg(long, default_value = "false")]
        all: bool,

        /// Output JSON rows instead of text
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show progress for one work or all works
    Status {
        /// Work id (omit for all works)
        #[arg(long)]
        work: Option<String>,

        /// Output JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Block until a task reaches a terminal status
    Wait {
        /// Task id
        #[arg(long)]
        task: String,

        /// Timeout in seconds (default: no timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Switch the attached tmux client to a work's session
    Attach {
        /// Work id
        #[arg(long)]
        work: String,
    },

    /// Control-plane daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Run the per-work orchestrator loop (started by the supervisor)
    #[command(hide = true)]
    Orchestrate {
        /// Work id
        #[arg(long)]
        work: String,

        /// Process at most one task, then exit
        #[arg(long, default_value = "false")]
        once: bool,
    },
}

#[derive(Subcommand)]
enum WorkCommands {
    /// Create a work and schedule its worktree
    Start {
        /// Branch name for the work
        #[arg(long)]
        branch: String,

        /// Base branch (default: config base_branch)
        #[arg(long)]
        base: Option<String>,

        /// Root issue (bead) id
        #[arg(long)]
        issue: Option<String>,

        /// Automated grouping of beads into implement tasks
        #[arg(long, default_value = "false")]
        auto: bool,

        /// Explicit work id (default: derived from branch)
        #[arg(long)]
        id: Option<String>,

        /// Check out an existing local branch instead of cutting a new one
        #[arg(long, default_value = "false")]
        from_existing: bool,

        /// Create the worktree from a pull request head ref
        #[arg(long)]
        pr: Option<u64>,
    },

    /// Schedule worktree teardown for a work
    Destroy {
        /// Work id
        #[arg(long)]
        work: String,
    },

    /// Kill a work's orchestrator so the control plane respawns it
    Restart {
        /// Work id
        #[arg(long)]
        work: String,
    },

    /// List works with derived state
    List,
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Schedule a review task
    Review {
        #[arg(long)]
        work: String,
    },

    /// Schedule a pr task
    Pr {
        #[arg(long)]
        work: String,
    },

    /// Schedule an estimate task (groups beads into implement tasks)
    Estimate {
        #[arg(long)]
        work: String,

        /// Complexity budget
        #[arg(long)]
        budget: Option<i64>,
    },

    /// Schedule an implement task over specific beads
    Implement {
        #[arg(long)]
        work: String,

        /// Comma-separated bead ids
        #[arg(long, value_delimiter = ',')]
        beads: Vec<String>,

        /// Complexity budget
        #[arg(long)]
        budget: Option<i64>,
    },

    /// Schedule (or re-arm) the PR feedback check
    Feedback {
        #[arg(long)]
        work: String,
    },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon in the background
    Start,
    /// Stop the daemon
    Stop,
    /// Report whether the daemon is running
    Status,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<u8> {
    let cli = Cli::parse();
    let project = cli.project;

    match cli.command {
        Commands::Init => commands::init::run(&project),

        Commands::Work { command } => match command {
            WorkCommands::Start {
                branch,
                base,
                issue,
                auto,
                id,
                from_existing,
                pr,
            } => commands::work::start(
                &project,
                &StartOptions {
                    id: id.as_deref(),
                    branch: &branch,
                    base: base.as_deref(),
                    issue: issue.as_deref(),
                    auto,
                    from_existing,
                    pr,
                },
            ),
            WorkCommands::Destroy { work } => commands::work::destroy(&project, &work),
            WorkCommands::Restart { work } => commands::work::restart(&project, &work),
            WorkCommands::List => commands::work::list(&project),
        },

        Commands::Schedule { command } => match command {
            ScheduleCommands::Review { work } => {
                commands::schedule::run(&project, &work, ScheduleKind::Review)
            }
            ScheduleCommands::Pr { work } => {
                commands::schedule::run(&project, &work, ScheduleKind::Pr)
            }
            ScheduleCommands::Estimate { work, budget } => {
                commands::schedule::run(&project, &work, ScheduleKind::Estimate { budget })
            }
            ScheduleCommands::Implement { work, beads, budget } => {
                commands::schedule::run(&project, &work, ScheduleKind::Implement { beads, budget })
            }
            ScheduleCommands::Feedback { work } => {
                commands::schedule::run(&project, &work, ScheduleKind::Feedback)
            }
        },

        Commands::Reset { task } => commands::task::reset(&project, &task),

        Commands::Tree { all, json } => commands::tree::run(&project, all, json),

        Commands::Status { work, json } => {
            commands::status::run(&project, work.as_deref(), json)
        }

        Commands::Wait { task, timeout } => commands::wait::run(&project, &task, timeout),

        Commands::Attach { work } => commands::attach::run(&project, &work),

        Commands::Daemon { command } => match command {
            DaemonCommands::Start => commands::daemon::start(&project),
            DaemonCommands::Stop => commands::daemon::stop(&project),
            DaemonCommands::Status => commands::daemon::status(&project),
        },

        Commands::Orchestrate { work, once } => {
            commands::orchestrate::run(&project, &work, once)
        }
    }
}
