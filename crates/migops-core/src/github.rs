//! PR host collaborator
//!
//! The [`PrHost`] trait is the seam the gate and the workflow talk through;
//! [`GithubClient`] implements it over the GitHub REST v3 API. The base URL
//! is injectable so tests can point the client at a local server.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::HostError;
use crate::event::{PrInfo, PrState};

/// Operations the workflow consumes from the pull-request host.
#[async_trait]
pub trait PrHost: Send + Sync {
    /// Fetches the PR snapshot (state, draft flag, labels, author, base
    /// branch) by number.
    async fn pr_info(&self, owner: &str, repo: &str, number: u64) -> Result<PrInfo, HostError>;

    /// Replaces the body of an existing comment.
    async fn update_comment(
        &self,
        owner: &str,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<(), HostError>;

    /// Creates a new comment on the PR thread.
    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), HostError>;

    /// Adds a label unless the pre-fetched snapshot already carries it.
    /// Returns whether the label was actually added.
    async fn add_label(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        label: &str,
        current: &[String],
    ) -> Result<bool, HostError>;

    /// Returns the allow-list teams the user belongs to, matched
    /// case-insensitively. Paginates the organization team listing.
    async fn matching_teams(
        &self,
        organization: &str,
        username: &str,
        allow_list: &[String],
    ) -> Result<Vec<String>, HostError>;
}

#[async_trait]
impl<P: PrHost + ?Sized> PrHost for &P {
    async fn pr_info(&self, owner: &str, repo: &str, number: u64) -> Result<PrInfo, HostError> {
        (**self).pr_info(owner, repo, number).await
    }

    async fn update_comment(
        &self,
        owner: &str,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<(), HostError> {
        (**self).update_comment(owner, repo, comment_id, body).await
    }

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), HostError> {
        (**self).create_comment(owner, repo, number, body).await
    }

    async fn add_label(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        label: &str,
        current: &[String],
    ) -> Result<bool, HostError> {
        (**self).add_label(owner, repo, number, label, current).await
    }

    async fn matching_teams(
        &self,
        organization: &str,
        username: &str,
        allow_list: &[String],
    ) -> Result<Vec<String>, HostError> {
        (**self).matching_teams(organization, username, allow_list).await
    }
}

const DEFAULT_API_BASE: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;

/// GitHub REST v3 implementation of [`PrHost`].
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    state: String,
    draft: Option<bool>,
    merged: Option<bool>,
    labels: Vec<NamedItem>,
    user: Login,
    base: BaseRef,
}

#[derive(Debug, Deserialize)]
struct NamedItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct BaseRef {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct TeamItem {
    name: String,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct MembershipResponse {
    state: String,
}

impl GithubClient {
    /// Creates a client against the public GitHub API.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Http`] when the underlying client cannot be
    /// constructed.
    pub fn new(token: impl Into<String>) -> Result<Self, HostError> {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    /// Creates a client against a custom API base (GitHub Enterprise, test
    /// servers).
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Http`] when the underlying client cannot be
    /// constructed.
    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, HostError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("migops/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, HostError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(HostError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// True when the user is an active member of the team.
    async fn is_team_member(
        &self,
        organization: &str,
        team_slug: &str,
        username: &str,
    ) -> Result<bool, HostError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/orgs/{organization}/teams/{team_slug}/memberships/{username}"),
            )
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let membership: MembershipResponse = Self::check(response).await?.json().await?;
        Ok(membership.state == "active")
    }
}

#[async_trait]
impl PrHost for GithubClient {
    async fn pr_info(&self, owner: &str, repo: &str, number: u64) -> Result<PrInfo, HostError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{owner}/{repo}/pulls/{number}"),
            )
            .send()
            .await?;
        let pull: PullResponse = Self::check(response).await?.json().await?;

        let state = if pull.merged.unwrap_or(false) {
            PrState::Merged
        } else if pull.state == "open" {
            PrState::Open
        } else {
            PrState::Closed
        };

        Ok(PrInfo {
            author: pull.user.login,
            base_branch: pull.base.branch,
            is_draft: pull.draft.unwrap_or(false),
            state,
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
        })
    }

    async fn update_comment(
        &self,
        owner: &str,
        repo: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<(), HostError> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{owner}/{repo}/issues/comments/{comment_id}"),
            )
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), HostError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{owner}/{repo}/issues/{number}/comments"),
            )
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn add_label(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        label: &str,
        current: &[String],
    ) -> Result<bool, HostError> {
        if current.iter().any(|l| l == label) {
            debug!(label, "label already present, skipping");
            return Ok(false);
        }
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{owner}/{repo}/issues/{number}/labels"),
            )
            .json(&serde_json::json!({ "labels": [label] }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(true)
    }

    async fn matching_teams(
        &self,
        organization: &str,
        username: &str,
        allow_list: &[String],
    ) -> Result<Vec<String>, HostError> {
        let mut candidates: Vec<TeamItem> = Vec::new();
        let mut page = 1usize;
        loop {
            let response = self
                .request(
                    reqwest::Method::GET,
                    &format!("/orgs/{organization}/teams?per_page={PAGE_SIZE}&page={page}"),
                )
                .send()
                .await?;
            let teams: Vec<TeamItem> = Self::check(response).await?.json().await?;
            let last_page = teams.len() < PAGE_SIZE;
            candidates.extend(
                teams
                    .into_iter()
                    .filter(|t| allow_list.contains(&t.name.to_lowercase())),
            );
            if last_page {
                break;
            }
            page += 1;
        }

        let mut matching = Vec::new();
        for team in candidates {
            if self
                .is_team_member(organization, &team.slug, username)
                .await?
            {
                matching.push(team.name.to_lowercase());
            }
        }
        debug!(username, teams = ?matching, "matching approval teams");
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = GithubClient::with_base_url("t", "http://localhost:9999/").unwrap();
        assert_eq!(client.base_url, "http://localhost:9999");
    }
}
