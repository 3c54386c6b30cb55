//! Error types for the migration workflow
//!
//! Provides one error enum per external concern:
//! - Configuration loading and validation
//! - Credential resolution
//! - PR host API failures
//! - Ticket tracker API failures
//! - Migration engine failures
//! - Request store failures
//!
//! Policy rejection is deliberately *not* an error: the gate returns it as
//! data (`Decision::Rejected`) because it is a normal, reportable outcome.

use std::path::PathBuf;

/// Configuration loading or validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that failed to read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Config parsed but violates a structural rule
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Credential resolution failure. Always precondition-fatal: no run is
/// attempted without a complete credential set.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Secret store call failed
    #[error("secret fetch failed: {0}")]
    Fetch(String),

    /// A required key was absent from the fetched bundle
    #[error("secret bundle is missing key '{0}'")]
    MissingKey(String),
}

/// PR host (GitHub) API failure.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Transport-level failure
    #[error("PR host request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The host answered with a non-success status
    #[error("PR host API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },
}

/// Ticket tracker API failure.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Transport-level failure
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The tracker answered with a non-success status
    #[error("tracker API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// More than one ticket matched the deterministic search key. This is
    /// duplicate-ticket corruption and must be surfaced, never resolved by
    /// guessing which ticket is authoritative.
    #[error("found {count} tickets matching '{summary}', expected at most one")]
    DuplicateTickets {
        /// The search key that matched multiple tickets
        summary: String,
        /// Number of matches
        count: usize,
    },
}

/// Migration engine failure for a single target. Non-fatal to the
/// orchestrator: it becomes the target's outcome error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Could not reach or authenticate against the target database
    #[error("connection failed: {0}")]
    Connection(String),

    /// The engine failed after applying zero or more units
    #[error("{0}")]
    Migration(String),

    /// The engine process itself could not be launched or produced
    /// unparseable output
    #[error("engine invocation failed: {0}")]
    Invocation(String),
}

/// SQL staging failure while building target descriptors. Precondition-fatal:
/// it aborts the run before any target is attempted.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The configured source directory does not exist or cannot be listed
    #[error("cannot read migration source {path}: {source}")]
    Io {
        /// Path involved in the failure
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A `.sql` unit carries a file name that is not valid UTF-8. Skipping
    /// it would silently drop a unit from the batch, so it is fatal.
    #[error("migration file name is not valid utf-8: {path}")]
    NonUtf8Name {
        /// Path of the offending file
        path: PathBuf,
    },

    /// A target referenced a credential key that did not resolve
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Request store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the requested key
    #[error("no request record for {org}/{repo}")]
    NotFound {
        /// Organization part of the key
        org: String,
        /// Repository part of the key
        repo: String,
    },

    /// Backend-specific failure
    #[error("request store error: {0}")]
    Backend(String),
}

/// Precondition-fatal workflow failure: an infrastructure fault that aborts
/// the whole invocation before (or while) reporting. Distinct from a policy
/// rejection, which is an ordinary outcome.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Config could not be loaded or validated
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Credentials could not be resolved
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// PR host call failed (PR info fetch, comment, label)
    #[error(transparent)]
    Host(#[from] HostError),

    /// SQL staging failed before any target ran
    #[error(transparent)]
    Stage(#[from] StageError),
}
