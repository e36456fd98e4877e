use std::path::Path;
use std::process::Command;

use crate::error::{Result, SessionError};

/// Create a new tmux session.
pub fn create_session(name: &str, cwd: &Path, command: Option<&str>) -> Result<()> {
    let mut args = vec![
        "new-session",
        "-d", // detached
        "-s",
        name, // session name
        "-c", // start directory
    ];
    let cwd_str = cwd.to_string_lossy();
    args.push(&cwd_str);

    if let Some(cmd) = command {
        args.push(cmd);
    }

    let output = Command::new("tmux")
        .args(&args)
        .output()
        .map_err(|e| SessionError::TmuxError(format!("Failed to execute tmux: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SessionError::TmuxError(format!(
            "tmux new-session failed: {}",
            stderr.trim()
        )));
    }

    Ok(())
}

/// Kill a tmux session.
pub fn kill_session(name: &str) -> Result<()> {
    let output = Command::new("tmux")
        .args(["kill-session", "-t", name])
        .output()
        .map_err(|e| SessionError::TmuxError(format!("Failed to execute tmux: {}", e)))?;

    // Ignore errors if session doesn't exist
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.contains("no server running") && !stderr.contains("session not found") {
            return Err(SessionError::TmuxError(format!(
                "tmux kill-session failed: {}",
                stderr.trim()
            )));
        }
    }

    Ok(())
}

/// Check if a tmux session exists.
pub fn session_exists(name: &str) -> bool {
    let output = Command::new("tmux")
        .args(["has-session", "-t", name])
        .output();

    match output {
        Ok(o) => o.status.success(),
        Err(_) => false,
    }
}

/// Switch the attached tmux client to a session.
pub fn switch_client(name: &str) -> Result<()> {
    let output = Command::new("tmux")
        .args(["switch-client", "-t", name])
        .output()
        .map_err(|e| SessionError::TmuxError(format!("Failed to execute tmux: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SessionError::TmuxError(format!(
            "tmux switch-client failed: {}",
            stderr.trim()
        )));
    }

    Ok(())
}

/// Pid of the first pane process in a session, or None if the session is gone.
pub fn pane_pid(name: &str) -> Result<Option<u32>> {
    let output = Command::new("tmux")
        .args(["list-panes", "-t", name, "-F", "#{pane_pid}"])
        .output()
        .map_err(|e| SessionError::TmuxError(format!("Failed to execute tmux: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no server running")
            || stderr.contains("session not found")
            || stderr.contains("can't find session")
        {
            return Ok(None);
        }
        return Err(SessionError::TmuxError(format!(
            "tmux list-panes failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_first_pane_pid(&stdout))
}

/// Parse the first pane pid from `tmux list-panes -F "#{pane_pid}"` output.
pub fn parse_first_pane_pid(output: &str) -> Option<u32> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse().ok())
}
