//! Migops Core - approval-gated migration orchestration
//!
//! The workflow that turns a reviewer's PR comment into a multi-database
//! schema migration run:
//! - Validates the command and the actor against the approval policy
//! - Stages each target's SQL units and drives them through the engine
//!   with per-target failure isolation
//! - Reconciles exactly one tracking ticket per pull request
//! - Reports the outcome back to the PR thread and the ticket
//!
//! # Example
//!
//! ```rust,ignore
//! use migops_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkflowConfig::from_path("migops.yml".as_ref())?;
//! let workflow = MigrationWorkflow::new(
//!     config, host, secrets, engine, tracker, store, staging_root,
//! );
//! match workflow.handle(&event).await? {
//!     WorkflowOutcome::Ignored => {}
//!     outcome => println!("{outcome:?}"),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod event;
pub mod gate;
pub mod github;
pub mod jira;
pub mod orchestrate;
pub mod report;
pub mod store;
pub mod ticket;
pub mod workflow;

// Re-exports for convenience
pub use config::{DatabaseConfig, TrackerConfig, WorkflowConfig};
pub use credentials::{ResolvedCredentials, SecretStore};
pub use engine::{build_targets, CommandEngine, MigrationEngine, MigrationTarget};
pub use error::{
    ConfigError, CredentialError, EngineError, HostError, StageError, StoreError, TrackerError,
    WorkflowError,
};
pub use event::{PrInfo, PrState, TriggerEvent};
pub use gate::{parse_command, ApprovalGate, Decision, GatePolicy, Mode};
pub use github::{GithubClient, PrHost};
pub use jira::JiraClient;
pub use orchestrate::{MigrationOrchestrator, MigrationOutcome, RunResult};
pub use report::{render_directory_listing, render_rejection_comment, render_run_comment};
pub use store::{
    ActionSource, Approval, ExecutionRecord, ExecutionStatus, MemoryRequestStore, RequestRecord,
    RequestStore,
};
pub use ticket::{summary_key, TicketReconciler, TicketRef, TicketTracker, TrackingTicket};
pub use workflow::{MigrationWorkflow, WorkflowOutcome};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring and running the workflow
    pub use crate::{
        Decision, MigrationEngine, MigrationWorkflow, Mode, PrHost, RequestStore, RunResult,
        SecretStore, TicketTracker, TriggerEvent, WorkflowConfig, WorkflowOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
