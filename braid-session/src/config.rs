use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Project configuration resolved from file, environment, and defaults.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Repository root this control plane manages.
    pub project_root: PathBuf,
    /// SQLite store location.
    pub db_path: PathBuf,
    /// Directory worktrees are created under.
    pub worktrees_dir: PathBuf,
    /// Default base branch for new works.
    pub base_branch: String,
    /// Heartbeats older than this are considered dead.
    pub staleness_threshold_secs: u64,
    /// Command the orchestrator runs for agent tasks, with {task}, {type} and
    /// {beads} placeholders substituted. None disables agent execution.
    pub agent_cmd: Option<String>,
    /// Max beads grouped into one implement task for auto works.
    pub group_size: usize,
    /// Dispatch loop poll interval.
    pub tick_secs: u64,
    /// Bound on a single task handler execution.
    pub task_timeout_secs: u64,
}

/// Raw TOML file structure for `.braid/config.toml` (project) or
/// `~/.config/braid/config.toml` (user fallback).
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    worktrees_dir: Option<PathBuf>,
    base_branch: Option<String>,
    staleness_threshold_secs: Option<u64>,
    agent_cmd: Option<String>,
    group_size: Option<usize>,
    tick_secs: Option<u64>,
    task_timeout_secs: Option<u64>,
}

/// Directory holding the store, pid file, and project config.
pub fn state_dir(project_root: &Path) -> PathBuf {
    project_root.join(".braid")
}

/// Project-local config file location.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("config.toml")
}

/// User-level config file location.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("braid").join("config.toml"))
}

impl ProjectConfig {
    /// Load configuration for a project.
    ///
    /// Priority: environment variables, then an explicit config path (or the
    /// project file, then the user file), then defaults.
    pub fn load(project_root: &Path, config_path: Option<&PathBuf>) -> Result<Self> {
        let path = match config_path {
            Some(p) => Some(p.clone()),
            None => {
                let project = project_config_path(project_root);
                if project.exists() {
                    Some(project)
                } else {
                    user_config_path().filter(|p| p.exists())
                }
            }
        };

        let file_config = match path {
            Some(ref p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config: {}", p.display()))?;
                toml::from_str::<ConfigFile>(&content)
                    .with_context(|| format!("failed to parse config: {}", p.display()))?
            }
            None => ConfigFile::default(),
        };

        Ok(Self::resolve(file_config, project_root, &EnvOverrides::from_env()))
    }

    /// Build config from parsed file values, the project root, and the given
    /// environment overrides. Split out so tests avoid env var mutation.
    fn resolve(file: ConfigFile, project_root: &Path, env: &EnvOverrides) -> Self {
        let worktrees_dir = env
            .worktrees_dir
            .clone()
            .or(file.worktrees_dir)
            .map(|p| absolutize(project_root, p))
            .unwrap_or_else(|| state_dir(project_root).join("worktrees"));

        let db_path = env
            .db_path
            .clone()
            .map(|p| absolutize(project_root, p))
            .unwrap_or_else(|| state_dir(project_root).join("braid.db"));

        Self {
            project_root: project_root.to_path_buf(),
            db_path,
            worktrees_dir,
            base_branch: env
                .base_branch
                .clone()
                .or(file.base_branch)
                .unwrap_or_else(|| "main".to_string()),
            staleness_threshold_secs: env
                .staleness_threshold_secs
                .or(file.staleness_threshold_secs)
                .unwrap_or(300),
            agent_cmd: env.agent_cmd.clone().or(file.agent_cmd),
            group_size: env.group_size.or(file.group_size).unwrap_or(3).max(1),
            tick_secs: file.tick_secs.unwrap_or(5).max(1),
            task_timeout_secs: file.task_timeout_secs.unwrap_or(600).max(1),
        }
    }
}

#[derive(Debug, Default)]
struct EnvOverrides {
    db_path: Option<PathBuf>,
    worktrees_dir: Option<PathBuf>,
    base_branch: Option<String>,
    staleness_threshold_secs: Option<u64>,
    agent_cmd: Option<String>,
    group_size: Option<usize>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            db_path: var("BRAID_DB_PATH").map(PathBuf::from),
            worktrees_dir: var("BRAID_WORKTREES_DIR").map(PathBuf::from),
            base_branch: var("BRAID_BASE_BRANCH"),
            staleness_threshold_secs: var("BRAID_STALENESS_SECS").and_then(|v| v.parse().ok()),
            agent_cmd: var("BRAID_AGENT_CMD"),
            group_size: var("BRAID_GROUP_SIZE").and_then(|v| v.parse().ok()),
        }
    }
}

fn absolutize(project_root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}
