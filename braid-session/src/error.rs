use thiserror::Error;

/// Error types for braid-session operations.
/// These are used by both the library and binary crates.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Work '{0}' not found")]
    WorkNotFound(String),

    #[error("Work '{0}' already exists")]
    WorkAlreadyExists(String),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Bead '{bead}' is already assigned to work '{work}'")]
    BeadAlreadyAssigned { bead: String, work: String },

    #[error("Invalid status transition: cannot go from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid status value: {0}. Valid values: pending, processing, completed, failed")]
    InvalidTaskStatus(String),

    #[error("Invalid work status value: {0}. Valid values: idle, processing, completed, failed, merged")]
    InvalidWorkStatus(String),

    #[error("Invalid task type: {0}")]
    InvalidTaskType(String),

    #[error("Worktree error: {0}")]
    WorktreeError(String),

    #[error("Git error: {0}")]
    GitError(String),

    #[error("Tmux error: {0}")]
    TmuxError(String),

    #[error("Beads backend error: {0}")]
    BeadsError(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
