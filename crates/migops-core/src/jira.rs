//! Jira implementation of the ticket tracker seam
//!
//! Talks to the Jira REST v2 API with basic auth: JQL search for the dedup
//! key, issue create (with the PR-link custom field), transition, comment.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::ticket::{CreateTicket, TicketRef, TicketTracker};

/// Jira REST v2 client implementing [`TicketTracker`].
#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    api_base: String,
    browse_base: String,
    user: String,
    token: String,
    config: TrackerConfig,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    issues: Vec<IssueItem>,
}

#[derive(Debug, Deserialize)]
struct IssueItem {
    id: String,
    key: String,
}

impl JiraClient {
    /// Creates a client for `<domain>.atlassian.net`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Http`] when the underlying client cannot be
    /// constructed.
    pub fn new(
        config: TrackerConfig,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, TrackerError> {
        let site = format!("https://{}.atlassian.net", config.domain);
        Self::with_site(config, user, token, &site)
    }

    /// Creates a client against a custom site URL (test servers).
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Http`] when the underlying client cannot be
    /// constructed.
    pub fn with_site(
        config: TrackerConfig,
        user: impl Into<String>,
        token: impl Into<String>,
        site: &str,
    ) -> Result<Self, TrackerError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("migops/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let site = site.trim_end_matches('/');
        Ok(Self {
            http,
            api_base: format!("{site}/rest/api/2"),
            browse_base: format!("{site}/browse"),
            user: user.into(),
            token: token.into(),
            config,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .basic_auth(&self.user, Some(&self.token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TrackerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(TrackerError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn ticket_ref(&self, issue: IssueItem) -> TicketRef {
        let url = format!("{}/{}", self.browse_base, issue.key);
        TicketRef {
            id: issue.id,
            key: issue.key,
            url,
        }
    }
}

#[async_trait]
impl TicketTracker for JiraClient {
    async fn search(&self, summary: &str) -> Result<Vec<TicketRef>, TrackerError> {
        let jql = format!(
            "project={} AND labels={} AND summary~\"{summary}\"",
            self.config.project, self.config.label
        );
        let response = self
            .request(reqwest::Method::GET, "/search")
            .query(&[("jql", jql.as_str())])
            .send()
            .await?;
        let found: SearchResponse = Self::check(response).await?.json().await?;
        Ok(found
            .issues
            .into_iter()
            .map(|issue| self.ticket_ref(issue))
            .collect())
    }

    async fn create(&self, request: &CreateTicket) -> Result<TicketRef, TrackerError> {
        let mut fields = json!({
            "project": { "key": self.config.project },
            "summary": request.summary,
            "issuetype": { "name": self.config.issue_type },
            "labels": [self.config.label],
            "description": request.description,
        });
        fields[self.config.pr_link_field.as_str()] = json!(request.pr_link);
        if let Some(assignee) = &self.config.assignee {
            fields["assignee"] = json!({ "name": assignee });
        }

        let response = self
            .request(reqwest::Method::POST, "/issue")
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        let issue: IssueItem = Self::check(response).await?.json().await?;
        Ok(self.ticket_ref(issue))
    }

    async fn transition(&self, ticket_id: &str, status_id: &str) -> Result<(), TrackerError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/issue/{ticket_id}/transitions"),
            )
            .json(&json!({ "transition": { "id": status_id } }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn add_comment(&self, ticket_id: &str, body: &str) -> Result<(), TrackerError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/issue/{ticket_id}/comment"))
            .json(&json!({ "body": body }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
