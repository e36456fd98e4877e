pub mod tree;

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Status of an externally-owned bead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl Default for BeadStatus {
    fn default() -> Self {
        BeadStatus::Open
    }
}

impl std::fmt::Display for BeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeadStatus::Open => write!(f, "open"),
            BeadStatus::InProgress => write!(f, "in_progress"),
            BeadStatus::Blocked => write!(f, "blocked"),
            BeadStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Kind of a dependency edge between beads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepKind {
    Blocks,
    ParentChild,
    Related,
    DiscoveredFrom,
}

impl DepKind {
    /// Edge kinds that define ancestry for tree construction.
    pub fn is_blocking(self) -> bool {
        matches!(self, DepKind::Blocks | DepKind::ParentChild)
    }
}

/// A directed dependency carried on the dependent bead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub depends_on: String,
    pub kind: DepKind,
}

/// An issue record owned by the external beads backend.
///
/// The core only reads bead content; it owns assignment, not the bead itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bead {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bead_type: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub status: BeadStatus,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub estimate: Option<i64>,
}

impl Bead {
    /// Dependency targets along blocking edges (blocks, parent-child).
    pub fn blocking_deps(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|d| d.kind.is_blocking())
            .map(|d| d.depends_on.as_str())
    }
}

/// Client interface to the beads issue backend.
pub trait BeadClient: Send + Sync {
    /// Fetch a single bead by id. Ok(None) for unknown ids.
    fn get_bead(&self, id: &str) -> Result<Option<Bead>>;
    /// Fetch all beads with their dependency edges.
    fn get_beads_with_deps(&self) -> Result<Vec<Bead>>;
    /// Beads that depend on the given bead.
    fn list_dependents(&self, id: &str) -> Result<Vec<Bead>>;
}

/// Client backed by the `bd` CLI with JSON output.
pub struct ExecBeadClient {
    bin: PathBuf,
    cwd: PathBuf,
}

impl ExecBeadClient {
    pub fn new(cwd: &Path) -> Self {
        Self {
            bin: resolve_bd_bin(),
            cwd: cwd.to_path_buf(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.bin)
            .current_dir(&self.cwd)
            .args(args)
            .output()
            .map_err(|e| {
                SessionError::BeadsError(format!(
                    "Failed to execute {}: {}",
                    self.bin.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::BeadsError(format!(
                "bd {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl BeadClient for ExecBeadClient {
    fn get_bead(&self, id: &str) -> Result<Option<Bead>> {
        let stdout = match self.run(&["show", id, "--json"]) {
            Ok(s) => s,
            // Unknown ids are a normal outcome, not a backend failure.
            Err(SessionError::BeadsError(msg)) if msg.contains("not found") => return Ok(None),
            Err(e) => return Err(e),
        };
        let bead = parse_bead(&stdout)?;
        Ok(Some(bead))
    }

    fn get_beads_with_deps(&self) -> Result<Vec<Bead>> {
        let stdout = self.run(&["list", "--json", "--deps"])?;
        parse_beads(&stdout)
    }

    fn list_dependents(&self, id: &str) -> Result<Vec<Bead>> {
        let stdout = self.run(&["dep", "list", id, "--json"])?;
        parse_beads(&stdout)
    }
}

/// Resolve the beads CLI binary: `BRAID_BD_BIN` override, else `bd` from PATH.
pub fn resolve_bd_bin() -> PathBuf {
    if let Ok(path) = std::env::var("BRAID_BD_BIN") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from("bd")
}

fn parse_bead(json: &str) -> Result<Bead> {
    serde_json::from_str(json)
        .map_err(|e| SessionError::BeadsError(format!("Invalid bead JSON: {}", e)))
}

fn parse_beads(json: &str) -> Result<Vec<Bead>> {
    serde_json::from_str(json)
        .map_err(|e| SessionError::BeadsError(format!("Invalid bead list JSON: {}", e)))
}
