pub mod session;

use std::path::Path;

use crate::error::Result;

/// Canonical tmux session name for a work.
pub fn session_name(work_id: &str) -> String {
    format!("braid-{}", work_id)
}

/// Terminal-multiplexer operations the core consumes.
pub trait SessionDriver: Send + Sync {
    /// Open a detached session running `command` in `cwd`.
    fn open(&self, name: &str, cwd: &Path, command: &str) -> Result<()>;
    /// True if the session exists.
    fn exists(&self, name: &str) -> bool;
    /// Kill the session and close its tab.
    fn terminate(&self, name: &str) -> Result<()>;
    /// Switch the attached client to the session.
    fn switch_to(&self, name: &str) -> Result<()>;
    /// Pid of the session's first pane process, if the session exists.
    fn pane_pid(&self, name: &str) -> Result<Option<u32>>;
}

/// Driver backed by the tmux binary.
pub struct TmuxDriver;

impl SessionDriver for TmuxDriver {
    fn open(&self, name: &str, cwd: &Path, command: &str) -> Result<()> {
        session::create_session(name, cwd, Some(command))
    }

    fn exists(&self, name: &str) -> bool {
        session::session_exists(name)
    }

    fn terminate(&self, name: &str) -> Result<()> {
        session::kill_session(name)
    }

    fn switch_to(&self, name: &str) -> Result<()> {
        session::switch_client(name)
    }

    fn pane_pid(&self, name: &str) -> Result<Option<u32>> {
        session::pane_pid(name)
    }
}
