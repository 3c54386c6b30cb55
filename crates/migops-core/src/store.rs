//! Persisted request record
//!
//! Durable record of the request lifecycle keyed by (organization,
//! repository): ticket linkage, approver history, execution history,
//! overall status. The trait exposes field-level operations (append-only
//! lists, targeted sets) rather than whole-record writes, so concurrent
//! invocations for different PRs on the same repository cannot clobber
//! shared history. A durable backend is an external collaborator;
//! [`MemoryRequestStore`] backs tests and single-shot CI runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Overall execution status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Created, no execution recorded yet
    Pending,
    /// Last execution succeeded
    Success,
    /// Last execution failed
    Failed,
}

/// Where an approval or execution was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSource {
    /// Initiated from the PR thread
    Github,
    /// Initiated from the tracking ticket
    Ticket,
}

/// One approval entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Approving user
    pub user: String,
    /// Team the approval was granted through, when known
    pub team: Option<String>,
    /// Epoch milliseconds
    pub time_ms: i64,
}

/// One execution entry; the list is append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// User whose command triggered the execution
    pub executed_by: String,
    /// Surface the command came from
    pub source: ActionSource,
    /// Epoch milliseconds
    pub time_ms: i64,
    /// Aggregated error text for failed runs
    pub error: Option<String>,
}

/// The full request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Organization part of the key
    pub org: String,
    /// Repository part of the key
    pub repo: String,
    /// Pull request number this record tracks
    pub pr_number: u64,
    /// PR HTML link
    pub pr_html_url: String,
    /// Linked ticket id, empty until assigned
    pub ticket_id: String,
    /// Linked ticket link, empty until assigned
    pub ticket_url: String,
    /// Users who approved on the PR
    pub pr_approvers: Vec<Approval>,
    /// Users who approved on the ticket
    pub ticket_approvers: Vec<Approval>,
    /// Append-only execution history
    pub executions: Vec<ExecutionRecord>,
    /// Overall status
    pub status: ExecutionStatus,
}

impl RequestRecord {
    fn new(org: &str, repo: &str, pr_number: u64, pr_html_url: &str) -> Self {
        Self {
            org: org.to_string(),
            repo: repo.to_string(),
            pr_number,
            pr_html_url: pr_html_url.to_string(),
            ticket_id: String::new(),
            ticket_url: String::new(),
            pr_approvers: Vec::new(),
            ticket_approvers: Vec::new(),
            executions: Vec::new(),
            status: ExecutionStatus::Pending,
        }
    }
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Durable request-record operations, keyed by (organization, repository).
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Creates the record if absent; a pre-existing record is left intact.
    async fn init(
        &self,
        org: &str,
        repo: &str,
        pr_number: u64,
        pr_html_url: &str,
    ) -> Result<(), StoreError>;

    /// Sets the ticket linkage fields.
    async fn set_ticket(
        &self,
        org: &str,
        repo: &str,
        ticket_id: &str,
        ticket_url: &str,
    ) -> Result<(), StoreError>;

    /// Appends a PR-side approval.
    async fn add_pr_approver(
        &self,
        org: &str,
        repo: &str,
        user: &str,
        team: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Appends a ticket-side approval.
    async fn add_ticket_approver(&self, org: &str, repo: &str, user: &str)
        -> Result<(), StoreError>;

    /// Appends an execution entry and sets the overall status.
    async fn record_execution(
        &self,
        org: &str,
        repo: &str,
        status: ExecutionStatus,
        record: ExecutionRecord,
    ) -> Result<(), StoreError>;

    /// Fetches the record.
    async fn get(&self, org: &str, repo: &str) -> Result<RequestRecord, StoreError>;
}

#[async_trait]
impl<S: RequestStore + ?Sized> RequestStore for &S {
    async fn init(
        &self,
        org: &str,
        repo: &str,
        pr_number: u64,
        pr_html_url: &str,
    ) -> Result<(), StoreError> {
        (**self).init(org, repo, pr_number, pr_html_url).await
    }

    async fn set_ticket(
        &self,
        org: &str,
        repo: &str,
        ticket_id: &str,
        ticket_url: &str,
    ) -> Result<(), StoreError> {
        (**self).set_ticket(org, repo, ticket_id, ticket_url).await
    }

    async fn add_pr_approver(
        &self,
        org: &str,
        repo: &str,
        user: &str,
        team: Option<&str>,
    ) -> Result<(), StoreError> {
        (**self).add_pr_approver(org, repo, user, team).await
    }

    async fn add_ticket_approver(
        &self,
        org: &str,
        repo: &str,
        user: &str,
    ) -> Result<(), StoreError> {
        (**self).add_ticket_approver(org, repo, user).await
    }

    async fn record_execution(
        &self,
        org: &str,
        repo: &str,
        status: ExecutionStatus,
        record: ExecutionRecord,
    ) -> Result<(), StoreError> {
        (**self).record_execution(org, repo, status, record).await
    }

    async fn get(&self, org: &str, repo: &str) -> Result<RequestRecord, StoreError> {
        (**self).get(org, repo).await
    }
}

/// In-memory [`RequestStore`].
#[derive(Debug, Default)]
pub struct MemoryRequestStore {
    records: Mutex<HashMap<(String, String), RequestRecord>>,
}

impl MemoryRequestStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, org: &str, repo: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RequestRecord),
    {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&(org.to_string(), repo.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                org: org.to_string(),
                repo: repo.to_string(),
            })?;
        f(record);
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn init(
        &self,
        org: &str,
        repo: &str,
        pr_number: u64,
        pr_html_url: &str,
    ) -> Result<(), StoreError> {
        self.records
            .lock()
            .entry((org.to_string(), repo.to_string()))
            .or_insert_with(|| RequestRecord::new(org, repo, pr_number, pr_html_url));
        Ok(())
    }

    async fn set_ticket(
        &self,
        org: &str,
        repo: &str,
        ticket_id: &str,
        ticket_url: &str,
    ) -> Result<(), StoreError> {
        self.update(org, repo, |record| {
            record.ticket_id = ticket_id.to_string();
            record.ticket_url = ticket_url.to_string();
        })
    }

    async fn add_pr_approver(
        &self,
        org: &str,
        repo: &str,
        user: &str,
        team: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update(org, repo, |record| {
            record.pr_approvers.push(Approval {
                user: user.to_string(),
                team: team.map(ToString::to_string),
                time_ms: now_ms(),
            });
        })
    }

    async fn add_ticket_approver(
        &self,
        org: &str,
        repo: &str,
        user: &str,
    ) -> Result<(), StoreError> {
        self.update(org, repo, |record| {
            record.ticket_approvers.push(Approval {
                user: user.to_string(),
                team: None,
                time_ms: now_ms(),
            });
        })
    }

    async fn record_execution(
        &self,
        org: &str,
        repo: &str,
        status: ExecutionStatus,
        record: ExecutionRecord,
    ) -> Result<(), StoreError> {
        self.update(org, repo, |r| {
            r.executions.push(record);
            r.status = status;
        })
    }

    async fn get(&self, org: &str, repo: &str) -> Result<RequestRecord, StoreError> {
        self.records
            .lock()
            .get(&(org.to_string(), repo.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                org: org.to_string(),
                repo: repo.to_string(),
            })
    }
}
