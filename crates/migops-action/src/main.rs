//! CI entry point for the migration workflow.
//!
//! Reads the trigger event from `GITHUB_EVENT_PATH` and its settings from
//! action inputs (`INPUT_*` environment variables, overridable with flags
//! for local runs), wires the live collaborators, and handles the event
//! once to completion. Exits non-zero only on precondition-fatal faults;
//! ignored comments and policy rejections are successful exits.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use migops_core::{
    CommandEngine, CredentialError, GithubClient, JiraClient, MemoryRequestStore,
    MigrationWorkflow, SecretStore, TriggerEvent, WorkflowConfig, WorkflowOutcome,
};

#[derive(Debug, Parser)]
#[command(name = "migops-action", version, about = "Approval-gated migration workflow runner")]
struct Args {
    /// Path to the trigger event payload
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: PathBuf,

    /// Path to the workflow config file
    #[arg(long, env = "INPUT_CONFIG_PATH", default_value = ".github/migops.yml")]
    config_path: PathBuf,

    /// Host API token used for PR info, comments and labels
    #[arg(long, env = "INPUT_GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// CI run identifier, used for the execution back-link
    #[arg(long, env = "GITHUB_RUN_ID", default_value = "0")]
    run_id: String,

    /// External migration runner executable
    #[arg(long, env = "INPUT_MIGRATION_RUNNER", default_value = "node-pg-migrate")]
    migration_runner: String,

    /// Directory migration sources are staged into before each run
    #[arg(long, env = "INPUT_STAGING_DIR", default_value = "tmp/__migrations__")]
    staging_dir: PathBuf,
}

/// Secret store backed by the process environment: each bundle key is
/// looked up verbatim, then as `UPPER_SNAKE_CASE`.
struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch(
        &self,
        _secret_id: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, CredentialError> {
        let mut values = HashMap::new();
        for key in keys {
            let env_name = key.to_uppercase().replace('-', "_");
            if let Ok(value) = std::env::var(key).or_else(|_| std::env::var(&env_name)) {
                values.insert(key.clone(), value);
            }
        }
        Ok(values)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let payload: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&args.event_path)
            .with_context(|| format!("cannot read event payload {}", args.event_path.display()))?,
    )
    .context("event payload is not valid JSON")?;

    let Some(event) = TriggerEvent::from_issue_comment(&payload, &args.run_id) else {
        debug!("not a pull request comment event");
        return Ok(());
    };

    let config = WorkflowConfig::from_path(&args.config_path)?;

    // The tracker client needs its credentials up front; the workflow
    // resolves the full bundle again per invocation through the same store.
    let secrets = EnvSecretStore;
    let creds = migops_core::credentials::resolve(&secrets, &config, &event.organization).await?;
    let jira = JiraClient::new(
        config.tracker.clone(),
        creds.get(&config.tracker.user_secret_key)?,
        creds.get(&config.tracker.token_secret_key)?,
    )?;
    let github = GithubClient::new(&args.github_token)?;
    let engine = CommandEngine::new(&args.migration_runner);

    // Single-shot run: the durable request store is an external service in
    // production deployments; the CI binary records into a per-run store.
    let store = MemoryRequestStore::new();

    let workflow = MigrationWorkflow::new(
        config,
        github,
        secrets,
        engine,
        jira,
        store,
        args.staging_dir,
    );

    match workflow.handle(&event).await? {
        WorkflowOutcome::Ignored => debug!("comment ignored"),
        WorkflowOutcome::Rejected { reason } => {
            warn!(%reason, "command rejected by policy");
        }
        WorkflowOutcome::Completed { mode, result, ticket } => {
            info!(
                ?mode,
                targets = result.outcomes.len(),
                any_applied = result.any_applied,
                success = result.is_success(),
                ticket = ticket.as_ref().map(|t| t.ticket.key.as_str()),
                "workflow completed"
            );
        }
    }
    Ok(())
}
