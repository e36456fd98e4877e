//! PR feedback polling: pulls review/CI state for a work's branch and folds
//! it into the work row.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;

use braid_session::db::works::{self, PrFields, Work};
use braid_session::model::{ApprovalStatus, CiStatus};

/// One observation of a work's pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct PrSnapshot {
    pub url: String,
    pub head_sha: String,
    pub ci_status: CiStatus,
    pub approval_status: ApprovalStatus,
    pub approvers: Vec<String>,
    pub mergeable: Option<String>,
    pub merged: bool,
}

/// Source of PR state for a branch. `Ok(None)` means no PR exists yet.
pub trait PrStatusSource: Send + Sync {
    fn fetch(&self, repo: &Path, branch: &str) -> Result<Option<PrSnapshot>>;
}

/// Source backed by the `gh` CLI.
pub struct GhCli;

impl PrStatusSource for GhCli {
    fn fetch(&self, repo: &Path, branch: &str) -> Result<Option<PrSnapshot>> {
        let output = Command::new("gh")
            .current_dir(repo)
            .args([
                "pr",
                "view",
                branch,
                "--json",
                "url,headRefOid,reviewDecision,mergeable,state,statusCheckRollup,latestReviews",
            ])
            .output()
            .context("Failed to execute gh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no pull requests found") || stderr.contains("Could not resolve") {
                return Ok(None);
            }
            anyhow::bail!("gh pr view failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_snapshot(&stdout).map(Some)
    }
}

#[derive(Debug, Deserialize)]
struct GhPrView {
    url: String,
    #[serde(rename = "headRefOid")]
    head_ref_oid: String,
    #[serde(rename = "reviewDecision", default)]
    review_decision: Option<String>,
    #[serde(default)]
    mergeable: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(rename = "statusCheckRollup", default)]
    status_check_rollup: Vec<GhCheck>,
    #[serde(rename = "latestReviews", default)]
    latest_reviews: Vec<GhReview>,
}

#[derive(Debug, Deserialize)]
struct GhCheck {
    #[serde(default)]
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhReview {
    #[serde(default)]
    author: Option<GhAuthor>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhAuthor {
    login: String,
}

/// Parse `gh pr view --json` output into a snapshot.
pub fn parse_snapshot(json: &str) -> Result<PrSnapshot> {
    let view: GhPrView = serde_json::from_str(json).context("Invalid gh pr view JSON")?;

    let ci_status = if view.status_check_rollup.is_empty() {
        CiStatus::Pending
    } else if view
        .status_check_rollup
        .iter()
        .any(|c| c.conclusion.as_deref() == Some("FAILURE"))
    {
        CiStatus::Failure
    } else if view
        .status_check_rollup
        .iter()
        .all(|c| matches!(c.conclusion.as_deref(), Some("SUCCESS") | Some("NEUTRAL") | Some("SKIPPED")))
    {
        CiStatus::Success
    } else {
        CiStatus::Pending
    };

    let approval_status = match view.review_decision.as_deref() {
        Some("APPROVED") => ApprovalStatus::Approved,
        Some("CHANGES_REQUESTED") => ApprovalStatus::ChangesRequested,
        _ => ApprovalStatus::Pending,
    };

    let approvers = view
        .latest_reviews
        .iter()
        .filter(|r| r.state.as_deref() == Some("APPROVED"))
        .filter_map(|r| r.author.as_ref().map(|a| a.login.clone()))
        .collect();

    Ok(PrSnapshot {
        url: view.url,
        head_sha: view.head_ref_oid,
        ci_status,
        approval_status,
        approvers,
        mergeable: view.mergeable.map(|m| m.to_lowercase()),
        merged: view.state.as_deref() == Some("MERGED"),
    })
}

/// Fold a snapshot into the work row.
///
/// The unseen-changes flag latches on when the head sha moves between checks
/// and stays on until something downstream (a review pass) clears it.
pub fn apply_snapshot(
    conn: &Connection,
    work: &Work,
    snapshot: Option<&PrSnapshot>,
) -> Result<()> {
    let Some(snap) = snapshot else {
        // No PR yet: nothing to record.
        return Ok(());
    };

    let sha_moved = work
        .pr_head_sha
        .as_deref()
        .map(|old| old != snap.head_sha)
        .unwrap_or(false);

    works::update_pr_fields(
        conn,
        &work.id,
        &PrFields {
            pr_url: Some(snap.url.clone()),
            pr_head_sha: Some(snap.head_sha.clone()),
            ci_status: snap.ci_status.to_string(),
            approval_status: snap.approval_status.to_string(),
            approvers: snap.approvers.clone(),
            mergeable: snap.mergeable.clone(),
        },
    )?;

    if sha_moved {
        works::set_unseen_changes(conn, &work.id, true)?;
    }

    if snap.merged {
        works::update_status(conn, &work.id, "merged")?;
    }

    Ok(())
}
