//! Ticket reconciliation
//!
//! Guarantees exactly one tracking ticket per pull request. Identity is a
//! deterministic summary key built from (organization, repository, PR
//! number); search-then-create on that key is the sole dedup mechanism, so
//! two concurrent invocations for the same PR leave a known race window —
//! the tracker offers no conditional create, and none is invented here.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::TrackerError;

/// Reference to a ticket held by the external tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRef {
    /// Tracker-internal identifier
    pub id: String,
    /// Human-facing key (e.g. `SCHEMA-17`)
    pub key: String,
    /// Browse URL
    pub url: String,
}

/// Result of a reconciliation: the ticket plus a freshness flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingTicket {
    /// The reconciled ticket
    pub ticket: TicketRef,
    /// True when the ticket existed before this invocation
    pub already_existed: bool,
}

/// Fields for a ticket to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTicket {
    /// Deterministic summary key
    pub summary: String,
    /// Ticket body; carries the current run state for fresh tickets
    pub description: String,
    /// PR link written into the configured custom field
    pub pr_link: String,
}

/// External ticket tracker operations consumed by the reconciler.
#[async_trait]
pub trait TicketTracker: Send + Sync {
    /// Searches for tickets whose summary contains the given key within
    /// the configured project and label.
    async fn search(&self, summary: &str) -> Result<Vec<TicketRef>, TrackerError>;

    /// Creates a ticket with the configured project, label and issue type.
    async fn create(&self, request: &CreateTicket) -> Result<TicketRef, TrackerError>;

    /// Transitions a ticket to a workflow status.
    async fn transition(&self, ticket_id: &str, status_id: &str) -> Result<(), TrackerError>;

    /// Appends a comment without altering ticket status.
    async fn add_comment(&self, ticket_id: &str, body: &str) -> Result<(), TrackerError>;
}

#[async_trait]
impl<T: TicketTracker + ?Sized> TicketTracker for &T {
    async fn search(&self, summary: &str) -> Result<Vec<TicketRef>, TrackerError> {
        (**self).search(summary).await
    }

    async fn create(&self, request: &CreateTicket) -> Result<TicketRef, TrackerError> {
        (**self).create(request).await
    }

    async fn transition(&self, ticket_id: &str, status_id: &str) -> Result<(), TrackerError> {
        (**self).transition(ticket_id, status_id).await
    }

    async fn add_comment(&self, ticket_id: &str, body: &str) -> Result<(), TrackerError> {
        (**self).add_comment(ticket_id, body).await
    }
}

/// Deterministic summary key for one pull request.
#[must_use]
pub fn summary_key(organization: &str, repo_name: &str, pr_number: u64) -> String {
    format!("{organization}/{repo_name}/PR#{pr_number}")
}

/// Ensures exactly one tracking ticket exists per pull request.
#[derive(Debug)]
pub struct TicketReconciler<T> {
    tracker: T,
    initial_status_id: String,
}

impl<T: TicketTracker> TicketReconciler<T> {
    /// Creates a reconciler that transitions fresh tickets to the given
    /// initial workflow status.
    #[inline]
    #[must_use]
    pub fn new(tracker: T, initial_status_id: impl Into<String>) -> Self {
        Self {
            tracker,
            initial_status_id: initial_status_id.into(),
        }
    }

    /// Finds or creates the ticket for one pull request.
    ///
    /// Zero matches: create, transition to the initial status (a transition
    /// failure is logged, not fatal — the ticket exists and later runs will
    /// find it), return with `already_existed = false`. One match: return
    /// it with `already_existed = true`.
    ///
    /// # Errors
    ///
    /// Tracker failures propagate; more than one match is
    /// [`TrackerError::DuplicateTickets`], surfaced rather than resolved by
    /// guessing.
    pub async fn ensure(
        &self,
        organization: &str,
        repo_name: &str,
        pr_number: u64,
        description: &str,
        pr_link: &str,
    ) -> Result<TrackingTicket, TrackerError> {
        let summary = summary_key(organization, repo_name, pr_number);
        let mut matches = self.tracker.search(&summary).await?;

        match matches.len() {
            0 => {
                let ticket = self
                    .tracker
                    .create(&CreateTicket {
                        summary: summary.clone(),
                        description: description.to_string(),
                        pr_link: pr_link.to_string(),
                    })
                    .await?;
                info!(key = %ticket.key, %summary, "created tracking ticket");
                if let Err(e) = self
                    .tracker
                    .transition(&ticket.id, &self.initial_status_id)
                    .await
                {
                    warn!(
                        key = %ticket.key,
                        status = %self.initial_status_id,
                        error = %e,
                        "could not transition fresh ticket"
                    );
                }
                Ok(TrackingTicket {
                    ticket,
                    already_existed: false,
                })
            }
            1 => {
                let ticket = matches.remove(0);
                info!(key = %ticket.key, %summary, "reusing existing tracking ticket");
                Ok(TrackingTicket {
                    ticket,
                    already_existed: true,
                })
            }
            count => Err(TrackerError::DuplicateTickets { summary, count }),
        }
    }

    /// Appends a progress comment to an existing ticket.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub async fn add_comment(&self, ticket_id: &str, body: &str) -> Result<(), TrackerError> {
        self.tracker.add_comment(ticket_id, body).await
    }
}
