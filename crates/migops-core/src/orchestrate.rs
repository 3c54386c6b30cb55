//! Migration orchestrator
//!
//! Drives N independent targets through one run, isolating per-target
//! failure: a failure on target *i* never prevents targets *i+1..N* from
//! running, and the outcomes always correspond positionally to the input
//! targets. Dry-run and apply share this single code path; only the flag
//! carried by each target differs.

use tracing::{error, info};

use crate::engine::{MigrationEngine, MigrationTarget};

/// Per-target result of one run.
///
/// Exactly one of the two sides is meaningful: a target either contributes
/// its applied-unit list or carries an error. When `error` is set, `applied`
/// holds only the units that committed before the failure (a guarantee of
/// the engine, not this layer); in practice engines report nothing on
/// failure, so it is usually empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Directory label of the target
    pub directory: String,
    /// Applied (or, in dry-run, would-apply) unit names in version order
    pub applied: Vec<String>,
    /// Engine error, when the target failed
    pub error: Option<String>,
}

/// Aggregate result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// One outcome per input target, in input order
    pub outcomes: Vec<MigrationOutcome>,
    /// True iff at least one outcome has a non-empty applied list
    pub any_applied: bool,
    /// All per-target errors, each prefixed with its target label,
    /// line-joined in input order; `None` when no target failed
    pub combined_error: Option<String>,
}

impl RunResult {
    /// True when no target failed.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.combined_error.is_none()
    }
}

/// Runs each target's migration batch through the engine.
#[derive(Debug)]
pub struct MigrationOrchestrator<E> {
    engine: E,
}

impl<E: MigrationEngine> MigrationOrchestrator<E> {
    /// Creates an orchestrator over the given engine.
    #[inline]
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Runs all targets in input order, capturing each failure locally.
    ///
    /// Engine-level errors (connectivity, SQL failures, lock timeouts) are
    /// non-fatal: they become the target's outcome error and the run
    /// continues with the next target.
    pub async fn run(&self, targets: &[MigrationTarget]) -> RunResult {
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut errors: Vec<String> = Vec::new();

        for target in targets {
            match self.engine.run(target).await {
                Ok(applied) => {
                    info!(
                        directory = %target.directory,
                        units = applied.len(),
                        dry_run = target.dry_run,
                        "migration batch finished"
                    );
                    outcomes.push(MigrationOutcome {
                        directory: target.directory.clone(),
                        applied,
                        error: None,
                    });
                }
                Err(e) => {
                    error!(directory = %target.directory, error = %e, "migration batch failed");
                    errors.push(format!("Dir={} {e}", target.directory));
                    outcomes.push(MigrationOutcome {
                        directory: target.directory.clone(),
                        applied: Vec::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let any_applied = outcomes.iter().any(|o| !o.applied.is_empty());
        let combined_error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("\r\n"))
        };

        RunResult {
            outcomes,
            any_applied,
            combined_error,
        }
    }
}
