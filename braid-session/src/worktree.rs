//! Worktree lifecycle: create an isolated git worktree/branch for a work and
//! tear it down on schedule.
//!
//! Creation is transactional at the filesystem level: any failure after
//! partial creation removes the partially-created worktree and directory
//! before the error propagates.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, SessionError};

/// Git operations the lifecycle manager depends on.
pub trait GitDriver: Send + Sync {
    /// Fetch a pull request head ref into a local branch.
    fn fetch_pr_ref(&self, repo: &Path, pr_number: u64, branch: &str) -> Result<()>;
    /// Push a branch and set its upstream on origin.
    fn push_set_upstream(&self, worktree: &Path, branch: &str) -> Result<()>;
}

/// Worktree operations the lifecycle manager depends on.
pub trait WorktreeDriver: Send + Sync {
    /// Create a worktree on a new branch cut from a base branch.
    fn create_from_branch(&self, repo: &Path, path: &Path, branch: &str, base: &str) -> Result<()>;
    /// Create a worktree on an existing local branch.
    fn create_from_existing(&self, repo: &Path, path: &Path, branch: &str) -> Result<()>;
    /// Forcibly remove a worktree registration and its directory.
    fn remove_force(&self, repo: &Path, path: &Path) -> Result<()>;
}

/// How the worktree branch comes into being.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorktreeSource {
    /// Cut a new branch from the given base.
    NewBranch { base: String },
    /// Check out a branch that already exists locally.
    ExistingBranch,
    /// Fetch a pull request head ref, then check it out.
    PrRef { number: u64 },
}

/// Creates and destroys the worktree backing a work.
pub struct WorktreeManager {
    git: Box<dyn GitDriver>,
    worktrees: Box<dyn WorktreeDriver>,
    repo_root: PathBuf,
    worktrees_dir: PathBuf,
}

impl WorktreeManager {
    pub fn new(
        git: Box<dyn GitDriver>,
        worktrees: Box<dyn WorktreeDriver>,
        repo_root: &Path,
        worktrees_dir: &Path,
    ) -> Self {
        Self {
            git,
            worktrees,
            repo_root: repo_root.to_path_buf(),
            worktrees_dir: worktrees_dir.to_path_buf(),
        }
    }

    /// The worktree path for a work id.
    pub fn path_for(&self, work_id: &str) -> PathBuf {
        self.worktrees_dir.join(work_id)
    }

    /// Create the worktree for a work and return its path.
    ///
    /// On any failure after partial creation the worktree and directory are
    /// removed best-effort before the error is surfaced.
    pub fn create(&self, work_id: &str, branch: &str, source: &WorktreeSource) -> Result<PathBuf> {
        let path = self.path_for(work_id);
        if path.exists() {
            return Err(SessionError::WorktreeError(format!(
                "worktree path already exists: {}",
                path.display()
            )));
        }
        std::fs::create_dir_all(&self.worktrees_dir).map_err(|e| {
            SessionError::DirectoryNotFound(format!("{}: {}", self.worktrees_dir.display(), e))
        })?;

        // The PR ref fetch happens before anything is created on disk, so a
        // fetch failure needs no rollback.
        if let WorktreeSource::PrRef { number } = source {
            self.git.fetch_pr_ref(&self.repo_root, *number, branch)?;
        }

        let created = match source {
            WorktreeSource::NewBranch { base } => {
                self.worktrees
                    .create_from_branch(&self.repo_root, &path, branch, base)
            }
            WorktreeSource::ExistingBranch | WorktreeSource::PrRef { .. } => {
                self.worktrees
                    .create_from_existing(&self.repo_root, &path, branch)
            }
        };
        if let Err(e) = created {
            self.rollback(&path);
            return Err(e);
        }

        // New branches get an upstream immediately so later PR tasks have a
        // remote ref to work against.
        if let WorktreeSource::NewBranch { .. } = source {
            if let Err(e) = self.git.push_set_upstream(&path, branch) {
                self.rollback(&path);
                return Err(e);
            }
        }

        Ok(path)
    }

    /// Remove the worktree at `path`.
    ///
    /// Refuses paths outside the managed worktrees directory.
    pub fn destroy(&self, path: &Path) -> Result<()> {
        if !path.starts_with(&self.worktrees_dir) {
            return Err(SessionError::WorktreeError(format!(
                "refusing to remove {} outside {}",
                path.display(),
                self.worktrees_dir.display()
            )));
        }
        self.worktrees.remove_force(&self.repo_root, path)?;
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(|e| {
                SessionError::WorktreeError(format!("{}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }

    /// Best-effort cleanup of a partially-created worktree.
    fn rollback(&self, path: &Path) {
        let _ = self.worktrees.remove_force(&self.repo_root, path);
        if path.exists() {
            let _ = std::fs::remove_dir_all(path);
        }
    }
}

/// Driver implementation shelling out to git.
pub struct ExecGit;

impl GitDriver for ExecGit {
    fn fetch_pr_ref(&self, repo: &Path, pr_number: u64, branch: &str) -> Result<()> {
        let refspec = format!("pull/{}/head:{}", pr_number, branch);
        run_git(repo, &["fetch", "origin", &refspec])
    }

    fn push_set_upstream(&self, worktree: &Path, branch: &str) -> Result<()> {
        run_git(worktree, &["push", "-u", "origin", branch])
    }
}

impl WorktreeDriver for ExecGit {
    fn create_from_branch(&self, repo: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        run_git(repo, &["worktree", "add", "-b", branch, &path_str, base])
    }

    fn create_from_existing(&self, repo: &Path, path: &Path, branch: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        run_git(repo, &["worktree", "add", &path_str, branch])
    }

    fn remove_force(&self, repo: &Path, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        let result = run_git(repo, &["worktree", "remove", "--force", &path_str]);
        match result {
            Ok(()) => Ok(()),
            // Removing a worktree git never registered is a no-op.
            Err(SessionError::GitError(msg)) if msg.contains("is not a working tree") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| SessionError::GitError(format!("Failed to execute git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SessionError::GitError(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }

    Ok(())
}
