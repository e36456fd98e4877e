use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Overall work status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Idle,
    Processing,
    Completed,
    Failed,
    Merged,
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkStatus::Idle => write!(f, "idle"),
            WorkStatus::Processing => write!(f, "processing"),
            WorkStatus::Completed => write!(f, "completed"),
            WorkStatus::Failed => write!(f, "failed"),
            WorkStatus::Merged => write!(f, "merged"),
        }
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(WorkStatus::Idle),
            "processing" => Ok(WorkStatus::Processing),
            "completed" => Ok(WorkStatus::Completed),
            "failed" => Ok(WorkStatus::Failed),
            "merged" => Ok(WorkStatus::Merged),
            _ => Err(SessionError::InvalidWorkStatus(s.to_string())),
        }
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(SessionError::InvalidTaskStatus(s.to_string())),
        }
    }
}

/// Persisted task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CreateWorktree,
    DestroyWorktree,
    PrFeedbackCheck,
    Review,
    Pr,
    Estimate,
    Implement,
}

impl TaskType {
    /// Task types executed by the per-work orchestrator process rather than
    /// the control-plane dispatch loop.
    pub fn is_agent_task(self) -> bool {
        matches!(
            self,
            TaskType::Review | TaskType::Pr | TaskType::Implement
        )
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::CreateWorktree => write!(f, "create_worktree"),
            TaskType::DestroyWorktree => write!(f, "destroy_worktree"),
            TaskType::PrFeedbackCheck => write!(f, "pr_feedback_check"),
            TaskType::Review => write!(f, "review"),
            TaskType::Pr => write!(f, "pr"),
            TaskType::Estimate => write!(f, "estimate"),
            TaskType::Implement => write!(f, "implement"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create_worktree" => Ok(TaskType::CreateWorktree),
            "destroy_worktree" => Ok(TaskType::DestroyWorktree),
            "pr_feedback_check" => Ok(TaskType::PrFeedbackCheck),
            "review" => Ok(TaskType::Review),
            "pr" => Ok(TaskType::Pr),
            "estimate" => Ok(TaskType::Estimate),
            "implement" => Ok(TaskType::Implement),
            _ => Err(SessionError::InvalidTaskType(s.to_string())),
        }
    }
}

/// CI status reported against a work's pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Pending,
    Success,
    Failure,
}

impl std::fmt::Display for CiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CiStatus::Pending => write!(f, "pending"),
            CiStatus::Success => write!(f, "success"),
            CiStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Review approval status on a work's pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    ChangesRequested,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::ChangesRequested => write!(f, "changes_requested"),
        }
    }
}

/// Derived display state for a work. Never stored; computed from the task
/// table, the work status, and orchestrator liveness, in that priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedState {
    Running,
    Merged,
    Completed,
    Failed,
    Dead,
    Idle,
}

impl std::fmt::Display for DerivedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DerivedState::Running => write!(f, "running"),
            DerivedState::Merged => write!(f, "merged"),
            DerivedState::Completed => write!(f, "completed"),
            DerivedState::Failed => write!(f, "failed"),
            DerivedState::Dead => write!(f, "dead"),
            DerivedState::Idle => write!(f, "idle"),
        }
    }
}

/// Validate a task status transition is allowed.
///
/// Transitions are monotonic: pending -> processing -> completed|failed.
/// Re-running a failed task goes through an explicit reset, not a transition.
pub fn validate_task_transition(from: TaskStatus, to: TaskStatus) -> Result<()> {
    let valid = match from {
        TaskStatus::Pending => matches!(to, TaskStatus::Processing),
        TaskStatus::Processing => matches!(to, TaskStatus::Completed | TaskStatus::Failed),
        TaskStatus::Completed => false,
        TaskStatus::Failed => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
