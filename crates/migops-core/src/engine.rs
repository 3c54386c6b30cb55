//! Migration engine seam and target staging
//!
//! The engine that applies a single ordered batch of versioned SQL units to
//! one database is an external collaborator; this module owns only its
//! interface ([`MigrationEngine`]), the per-target descriptor, and the
//! staging step that copies each target's `.sql` units into a private
//! working directory before a run.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::WorkflowConfig;
use crate::credentials::ResolvedCredentials;
use crate::error::{EngineError, StageError};
use crate::gate::Mode;

/// One database to migrate, fully resolved.
///
/// Targets are independent units of work: no ordering dependency exists
/// between them, but they are reported in configured order.
#[derive(Clone)]
pub struct MigrationTarget {
    /// Directory label, used in reports and error prefixes
    pub directory: String,
    /// Staged directory holding this target's `.sql` units
    pub sql_dir: PathBuf,
    /// Connection URL for the target database
    pub database_url: String,
    /// Migration-state table name
    pub migrations_table: String,
    /// When true, pending units are computed but not committed
    pub dry_run: bool,
}

impl std::fmt::Debug for MigrationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationTarget")
            .field("directory", &self.directory)
            .field("sql_dir", &self.sql_dir)
            .field("database_url", &"<redacted>")
            .field("migrations_table", &self.migrations_table)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Applies one target's migration batch, forward direction, order-checked.
///
/// Returns the unit names it applied (or, in dry-run, would apply) in
/// version order. A failing run may have committed zero or more units; the
/// returned error describes the first failure.
#[async_trait]
pub trait MigrationEngine: Send + Sync {
    /// Runs the batch for one target.
    async fn run(&self, target: &MigrationTarget) -> Result<Vec<String>, EngineError>;
}

#[async_trait]
impl<E: MigrationEngine + ?Sized> MigrationEngine for &E {
    async fn run(&self, target: &MigrationTarget) -> Result<Vec<String>, EngineError> {
        (**self).run(target).await
    }
}

/// Builds the resolved target list for one run, staging SQL units on the way.
///
/// For each configured database, the `.sql` files under
/// `<base_directory>/<directory>` are copied (sorted by name, which is
/// version order for versioned units) into `<staging_root>/<directory>`.
/// The staging root is recreated from scratch so stale units from a
/// previous run can never leak into this one.
///
/// # Errors
///
/// Any failure here is precondition-fatal: a missing source directory, an
/// IO error while copying, or a database URL key absent from the resolved
/// credentials.
pub fn build_targets(
    config: &WorkflowConfig,
    credentials: &ResolvedCredentials,
    mode: Mode,
    staging_root: &Path,
) -> Result<Vec<MigrationTarget>, StageError> {
    clean_dir(staging_root)?;

    let mut targets = Vec::with_capacity(config.databases.len());
    for db in &config.databases {
        let source_dir = config.base_directory.join(&db.directory);
        let staged_dir = staging_root.join(&db.directory);
        let staged = stage_sql_files(&source_dir, &staged_dir)?;
        debug!(directory = %db.directory, units = staged, "staged migration source");

        targets.push(MigrationTarget {
            directory: db.directory.clone(),
            sql_dir: staged_dir,
            database_url: credentials.get(&db.url_secret_key)?.to_string(),
            migrations_table: db.migration_table.clone(),
            dry_run: !mode.is_apply(),
        });
    }
    Ok(targets)
}

/// Removes a directory tree, treating "already absent" as success.
fn clean_dir(dir: &Path) -> Result<(), StageError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StageError::Io {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Copies the `.sql` files from `source_dir` into `staged_dir`, returning
/// how many were staged. Non-SQL files are skipped; a `.sql` file whose
/// name is not valid UTF-8 is fatal rather than silently dropped.
fn stage_sql_files(source_dir: &Path, staged_dir: &Path) -> Result<usize, StageError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StageError::Io { path, source }
    };

    std::fs::create_dir_all(staged_dir).map_err(io_err(staged_dir))?;

    let mut names = Vec::new();
    for entry in std::fs::read_dir(source_dir).map_err(io_err(source_dir))? {
        let entry = entry.map_err(io_err(source_dir))?;
        let raw = entry.file_name();
        if Path::new(&raw).extension().map_or(true, |ext| ext != "sql") {
            continue;
        }
        let name = raw.into_string().map_err(|raw| StageError::NonUtf8Name {
            path: source_dir.join(raw),
        })?;
        names.push(name);
    }
    names.sort_unstable();

    for name in &names {
        let from = source_dir.join(name);
        std::fs::copy(&from, staged_dir.join(name)).map_err(io_err(&from))?;
    }
    Ok(names.len())
}

/// Engine adapter that shells out to an external migration runner.
///
/// The runner is expected to accept the target via arguments and the
/// connection URL via the `DATABASE_URL` environment variable, and to print
/// one applied (or would-apply) unit name per stdout line, in version order.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
}

impl CommandEngine {
    /// Creates an adapter for the given runner executable.
    #[inline]
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MigrationEngine for CommandEngine {
    async fn run(&self, target: &MigrationTarget) -> Result<Vec<String>, EngineError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--migrations-dir")
            .arg(&target.sql_dir)
            .arg("--migrations-table")
            .arg(&target.migrations_table)
            .arg("--check-order")
            .arg("up")
            .env("DATABASE_URL", &target.database_url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if target.dry_run {
            cmd.arg("--dry-run");
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| EngineError::Invocation(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Migration(stderr.trim().to_string()));
        }

        let applied = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::credentials::SecretStore;

    struct Bundle(HashMap<String, String>);

    #[async_trait]
    impl SecretStore for Bundle {
        async fn fetch(
            &self,
            _secret_id: &str,
            _keys: &[String],
        ) -> Result<HashMap<String, String>, crate::error::CredentialError> {
            Ok(self.0.clone())
        }
    }

    fn config(base: &Path) -> WorkflowConfig {
        WorkflowConfig::from_yaml(&format!(
            r#"
base_directory: {}
pr_base_branch: main
approval_teams: [dba]
databases:
  - directory: core
    url_secret_key: core_db_url
  - directory: audit
    url_secret_key: audit_db_url
tracker:
  domain: acme
  project: SCHEMA
  initial_status_id: "11"
  pr_link_field: customfield_10902
secret_id: acme/migops
"#,
            base.display()
        ))
        .unwrap()
    }

    async fn credentials(config: &WorkflowConfig) -> ResolvedCredentials {
        let bundle: HashMap<String, String> = [
            ("core_db_url", "postgres://core"),
            ("audit_db_url", "postgres://audit"),
            ("jira_user", "bot"),
            ("jira_token", "t"),
            ("github-acme-token", "g"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        crate::credentials::resolve(&Bundle(bundle), config, "acme")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stages_only_sql_files_in_sorted_order() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("migrations");
        for dir in ["core", "audit"] {
            std::fs::create_dir_all(base.join(dir)).unwrap();
        }
        std::fs::write(base.join("core/002_b.sql"), "select 2;").unwrap();
        std::fs::write(base.join("core/001_a.sql"), "select 1;").unwrap();
        std::fs::write(base.join("core/README.md"), "docs").unwrap();

        let config = config(&base);
        let creds = credentials(&config).await;
        let staging = root.path().join("staging");

        let targets = build_targets(&config, &creds, Mode::DryRun, &staging).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].directory, "core");
        assert!(targets[0].dry_run);
        assert_eq!(targets[0].database_url, "postgres://core");

        let mut staged: Vec<_> = std::fs::read_dir(&targets[0].sql_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        staged.sort();
        assert_eq!(staged, vec!["001_a.sql", "002_b.sql"]);

        // The audit target had no units staged but still exists.
        assert!(targets[1].sql_dir.is_dir());
    }

    #[tokio::test]
    async fn staging_root_is_recreated_between_runs() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("migrations");
        for dir in ["core", "audit"] {
            std::fs::create_dir_all(base.join(dir)).unwrap();
        }
        let config = config(&base);
        let creds = credentials(&config).await;
        let staging = root.path().join("staging");

        std::fs::create_dir_all(staging.join("core")).unwrap();
        std::fs::write(staging.join("core/stale.sql"), "old").unwrap();

        let targets = build_targets(&config, &creds, Mode::Apply, &staging).unwrap();
        assert!(!targets[0].dry_run);
        assert!(!targets[0].sql_dir.join("stale.sql").exists());
    }

    #[tokio::test]
    async fn missing_source_directory_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("migrations");
        std::fs::create_dir_all(base.join("core")).unwrap();
        // "audit" directory intentionally absent.
        let config = config(&base);
        let creds = credentials(&config).await;

        let err = build_targets(&config, &creds, Mode::Apply, &root.path().join("staging"))
            .unwrap_err();
        assert!(matches!(err, StageError::Io { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_sql_file_name_is_fatal() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("migrations");
        for dir in ["core", "audit"] {
            std::fs::create_dir_all(base.join(dir)).unwrap();
        }
        std::fs::write(base.join("core/001_a.sql"), "select 1;").unwrap();
        std::fs::write(
            base.join("core").join(OsStr::from_bytes(b"002_\xff.sql")),
            "select 2;",
        )
        .unwrap();

        let config = config(&base);
        let creds = credentials(&config).await;
        let err = build_targets(&config, &creds, Mode::Apply, &root.path().join("staging"))
            .unwrap_err();
        assert!(matches!(err, StageError::NonUtf8Name { .. }));
    }

    #[test]
    fn target_debug_redacts_database_url() {
        let target = MigrationTarget {
            directory: "core".to_string(),
            sql_dir: PathBuf::from("/tmp/x"),
            database_url: "postgres://user:pw@host/db".to_string(),
            migrations_table: "pgmigrations".to_string(),
            dry_run: false,
        };
        let rendered = format!("{target:?}");
        assert!(!rendered.contains("pw@host"));
        assert!(rendered.contains("<redacted>"));
    }
}
