//! Workflow driver
//!
//! One invocation runs this pipeline to completion:
//!
//! ```text
//! event -> gate -> stage targets -> orchestrate -> render
//!       -> reconcile ticket -> PR comment/label -> request store
//! ```
//!
//! All collaborators are injected at construction (no module-level clients
//! or config), constructed once per invocation. Failure handling follows
//! the taxonomy: unrecognized commands are silent no-ops, policy rejections
//! report once and stop, config/credential/staging faults abort hard,
//! per-target engine failures are isolated inside the run result, and
//! ticket or store failures are demoted to logged secondaries so they can
//! never suppress the PR-facing report.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::credentials::{self, SecretStore};
use crate::engine::{self, MigrationEngine};
use crate::error::{HostError, WorkflowError};
use crate::event::TriggerEvent;
use crate::gate::{parse_command, ApprovalGate, Decision, GatePolicy, Mode};
use crate::github::PrHost;
use crate::orchestrate::{MigrationOrchestrator, RunResult};
use crate::report::{render_rejection_comment, render_run_comment};
use crate::store::{ActionSource, ExecutionRecord, ExecutionStatus, RequestStore};
use crate::ticket::{TicketReconciler, TicketTracker, TrackingTicket};

/// Terminal outcome of one invocation.
#[derive(Debug)]
pub enum WorkflowOutcome {
    /// The comment was not a recognized command; zero side effects
    Ignored,
    /// A policy rule failed; the reason was reported on the PR
    Rejected {
        /// The rejection reason, as reported
        reason: String,
    },
    /// The run went through (possibly with per-target failures)
    Completed {
        /// Mode the run executed in
        mode: Mode,
        /// Aggregate migration result
        result: RunResult,
        /// Reconciled ticket, when the tracker step succeeded
        ticket: Option<TrackingTicket>,
    },
}

/// The approval-gated migration workflow with its injected collaborators.
pub struct MigrationWorkflow<H, S, E, T, R> {
    config: WorkflowConfig,
    host: H,
    secrets: S,
    orchestrator: MigrationOrchestrator<E>,
    reconciler: TicketReconciler<T>,
    store: R,
    staging_root: PathBuf,
}

impl<H, S, E, T, R> MigrationWorkflow<H, S, E, T, R>
where
    H: PrHost,
    S: SecretStore,
    E: MigrationEngine,
    T: TicketTracker,
    R: RequestStore,
{
    /// Wires a workflow from its collaborators.
    #[must_use]
    pub fn new(
        config: WorkflowConfig,
        host: H,
        secrets: S,
        engine: E,
        tracker: T,
        store: R,
        staging_root: PathBuf,
    ) -> Self {
        let initial_status_id = config.tracker.initial_status_id.clone();
        Self {
            config,
            host,
            secrets,
            orchestrator: MigrationOrchestrator::new(engine),
            reconciler: TicketReconciler::new(tracker, initial_status_id),
            store,
            staging_root,
        }
    }

    /// Handles one trigger event to completion.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] only for precondition-fatal infrastructure
    /// faults (credentials, staging, PR host calls). Policy rejections and
    /// per-target migration failures are ordinary outcomes.
    pub async fn handle(&self, event: &TriggerEvent) -> Result<WorkflowOutcome, WorkflowError> {
        let command = event.comment_body.trim();
        let Some(mode) = parse_command(command) else {
            debug!(pr = event.pr_number, "comment is not a migration command, ignoring");
            return Ok(WorkflowOutcome::Ignored);
        };

        info!(
            org = %event.organization,
            repo = %event.repo_name,
            pr = event.pr_number,
            actor = %event.comment_author,
            ?mode,
            "migration command received"
        );

        let pr = self
            .host
            .pr_info(&event.repo_owner, &event.repo_name, event.pr_number)
            .await?;

        let gate = ApprovalGate::new(GatePolicy {
            base_branch: self.config.pr_base_branch.clone(),
            approval_teams: self.config.approval_teams.clone(),
            organization: event.organization.clone(),
        });
        let teams = match gate.decide(event, &pr, mode, &self.host).await? {
            Decision::Proceed { teams, .. } => teams,
            Decision::Rejected { reason } => {
                warn!(pr = event.pr_number, %reason, "approval rejected");
                self.post_report(event, &render_rejection_comment(command, &reason))
                    .await?;
                return Ok(WorkflowOutcome::Rejected { reason });
            }
        };

        // Everything from here until the run itself is precondition-fatal.
        let creds =
            credentials::resolve(&self.secrets, &self.config, &event.organization).await?;
        let targets = engine::build_targets(&self.config, &creds, mode, &self.staging_root)?;

        let result = self.orchestrator.run(&targets).await;
        let comment = render_run_comment(command, &result, &event.run_link(), Utc::now());

        let ticket = self.reconcile_ticket(event, &comment).await;

        self.post_report(event, &comment).await?;

        if mode.is_apply() && result.any_applied {
            self.host
                .add_label(
                    &event.repo_owner,
                    &event.repo_name,
                    event.pr_number,
                    &self.config.completion_label,
                    &pr.labels,
                )
                .await?;
        }

        if mode.is_apply() {
            self.record_request(event, &result, teams.first().map(String::as_str), ticket.as_ref())
                .await;
        }

        Ok(WorkflowOutcome::Completed {
            mode,
            result,
            ticket,
        })
    }

    /// Posts the report on the PR: the triggering comment is updated in
    /// place; when the update fails (the comment may have been deleted
    /// between trigger and report) a fresh comment carries the report
    /// instead.
    async fn post_report(&self, event: &TriggerEvent, body: &str) -> Result<(), HostError> {
        let updated = self
            .host
            .update_comment(&event.repo_owner, &event.repo_name, event.comment_id, body)
            .await;
        match updated {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    pr = event.pr_number,
                    comment_id = event.comment_id,
                    error = %e,
                    "comment update failed, posting a new comment"
                );
                self.host
                    .create_comment(&event.repo_owner, &event.repo_name, event.pr_number, body)
                    .await
            }
        }
    }

    /// Runs the ticket step, demoting tracker failures to logged
    /// secondaries: a broken tracker must never block the PR-facing report.
    async fn reconcile_ticket(
        &self,
        event: &TriggerEvent,
        comment: &str,
    ) -> Option<TrackingTicket> {
        let ensured = self
            .reconciler
            .ensure(
                &event.organization,
                &event.repo_name,
                event.pr_number,
                comment,
                &event.pr_link(),
            )
            .await;
        match ensured {
            Ok(ticket) => {
                // Fresh tickets already carry the run state in their
                // description; only pre-existing ones get a progress comment.
                if ticket.already_existed {
                    if let Err(e) = self.reconciler.add_comment(&ticket.ticket.id, comment).await {
                        warn!(key = %ticket.ticket.key, error = %e, "ticket comment failed");
                    }
                }
                Some(ticket)
            }
            Err(e) => {
                warn!(pr = event.pr_number, error = %e, "ticket reconciliation failed");
                None
            }
        }
    }

    /// Appends the approval and execution records. Store failures are
    /// secondary: the run already happened and was reported.
    async fn record_request(
        &self,
        event: &TriggerEvent,
        result: &RunResult,
        team: Option<&str>,
        ticket: Option<&TrackingTicket>,
    ) {
        let org = &event.organization;
        let repo = &event.repo_name;

        let outcome = async {
            self.store
                .init(org, repo, event.pr_number, &event.pr_link())
                .await?;
            self.store
                .add_pr_approver(org, repo, &event.comment_author, team)
                .await?;
            if let Some(ticket) = ticket {
                self.store
                    .set_ticket(org, repo, &ticket.ticket.id, &ticket.ticket.url)
                    .await?;
            }
            let status = if result.is_success() {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failed
            };
            self.store
                .record_execution(
                    org,
                    repo,
                    status,
                    ExecutionRecord {
                        executed_by: event.comment_author.clone(),
                        source: ActionSource::Github,
                        time_ms: crate::store::now_ms(),
                        error: result.combined_error.clone(),
                    },
                )
                .await
        };

        if let Err(e) = outcome.await {
            warn!(pr = event.pr_number, error = %e, "request store update failed");
        }
    }
}
