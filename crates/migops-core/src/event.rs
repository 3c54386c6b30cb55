//! Trigger event and pull-request snapshot types
//!
//! A workflow invocation starts from one immutable [`TriggerEvent`],
//! extracted from the host's `issue_comment` payload. The PR snapshot
//! ([`PrInfo`]) is fetched separately, once, before the gate runs.

use serde::{Deserialize, Serialize};

/// Immutable input for one workflow invocation.
///
/// Constructed once per incoming trigger and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Organization login (for org-owned repos this equals the repo owner)
    pub organization: String,
    /// Repository owner login
    pub repo_owner: String,
    /// Repository name
    pub repo_name: String,
    /// Repository HTML URL, used to build PR and execution links
    pub repo_html_url: String,
    /// Pull request number
    pub pr_number: u64,
    /// Identifier of the triggering comment
    pub comment_id: u64,
    /// Raw comment body (untrimmed)
    pub comment_body: String,
    /// Login of the comment author
    pub comment_author: String,
    /// CI run identifier, used for the execution back-link
    pub run_id: String,
}

impl TriggerEvent {
    /// Extracts a trigger event from a raw `issue_comment` payload.
    ///
    /// Returns `None` when the payload is not a comment on a pull request
    /// (issues and PRs share the comment event; only PR comments trigger
    /// the workflow).
    #[must_use]
    pub fn from_issue_comment(payload: &serde_json::Value, run_id: &str) -> Option<Self> {
        let issue = payload.get("issue")?;
        // Present only when the "issue" is actually a pull request.
        issue.get("pull_request")?;

        let repository = payload.get("repository")?;
        let comment = payload.get("comment")?;

        let organization = payload
            .get("organization")
            .and_then(|o| o.get("login"))
            .or_else(|| repository.get("owner")?.get("login"))
            .and_then(serde_json::Value::as_str)?;

        Some(Self {
            organization: organization.to_string(),
            repo_owner: repository.get("owner")?.get("login")?.as_str()?.to_string(),
            repo_name: repository.get("name")?.as_str()?.to_string(),
            repo_html_url: repository.get("html_url")?.as_str()?.to_string(),
            pr_number: issue.get("number")?.as_u64()?,
            comment_id: comment.get("id")?.as_u64()?,
            comment_body: comment.get("body")?.as_str()?.to_string(),
            comment_author: comment.get("user")?.get("login")?.as_str()?.to_string(),
            run_id: run_id.to_string(),
        })
    }

    /// HTML link to the pull request.
    #[must_use]
    pub fn pr_link(&self) -> String {
        format!("{}/pull/{}", self.repo_html_url, self.pr_number)
    }

    /// HTML link to the CI run that is executing this workflow.
    #[must_use]
    pub fn run_link(&self) -> String {
        format!("{}/actions/runs/{}", self.repo_html_url, self.run_id)
    }
}

/// Pull request state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    /// PR is open
    Open,
    /// PR is closed without merge
    Closed,
    /// PR is merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Merged => write!(f, "MERGED"),
        }
    }
}

/// Point-in-time snapshot of the pull request, fetched before the gate runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrInfo {
    /// PR author login
    pub author: String,
    /// Base branch name
    pub base_branch: String,
    /// Whether the PR is a draft
    pub is_draft: bool,
    /// Current state
    pub state: PrState,
    /// Labels present at fetch time; used for idempotent label addition
    pub labels: Vec<String>,
}

impl PrInfo {
    /// True when the PR is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == PrState::Open
    }
}
