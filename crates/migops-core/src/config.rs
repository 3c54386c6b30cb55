//! Static workflow configuration
//!
//! Loads the YAML config that describes the migration targets, the ticket
//! tracker, and the approval policy, then normalizes it (defaults applied,
//! team names lowercased) and validates the structural rules.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_migration_table() -> String {
    "pgmigrations".to_string()
}

fn default_ticket_label() -> String {
    "db-migration".to_string()
}

fn default_issue_type() -> String {
    "Story".to_string()
}

fn default_completion_label() -> String {
    "db-migrated".to_string()
}

fn default_tracker_user_key() -> String {
    "jira_user".to_string()
}

fn default_tracker_token_key() -> String {
    "jira_token".to_string()
}

/// One database target in the static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory label; also the subdirectory of `base_directory` holding
    /// this target's SQL units
    pub directory: String,
    /// Key inside the secret bundle holding this target's connection URL
    pub url_secret_key: String,
    /// Migration-state table name
    #[serde(default = "default_migration_table")]
    pub migration_table: String,
}

/// Ticket tracker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker domain; the REST base is `https://<domain>.atlassian.net`
    pub domain: String,
    /// Project key for created tickets
    pub project: String,
    /// Label applied to created tickets and used in the dedup search
    #[serde(default = "default_ticket_label")]
    pub label: String,
    /// Issue type for created tickets
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
    /// Workflow status a fresh ticket is transitioned to
    pub initial_status_id: String,
    /// Custom field that carries the PR link on created tickets
    pub pr_link_field: String,
    /// Optional assignee for created tickets
    #[serde(default)]
    pub assignee: Option<String>,
    /// Secret-bundle key holding the tracker API user
    #[serde(default = "default_tracker_user_key")]
    pub user_secret_key: String,
    /// Secret-bundle key holding the tracker API token
    #[serde(default = "default_tracker_token_key")]
    pub token_secret_key: String,
}

/// The full static workflow configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Root directory containing one subdirectory of SQL units per target
    pub base_directory: PathBuf,
    /// Branch a PR must target to be eligible
    pub pr_base_branch: String,
    /// Teams whose members may approve; matched case-insensitively
    pub approval_teams: Vec<String>,
    /// Label added to the PR after a successful apply with changes
    #[serde(default = "default_completion_label")]
    pub completion_label: String,
    /// Migration targets, in reporting order
    pub databases: Vec<DatabaseConfig>,
    /// Ticket tracker settings
    pub tracker: TrackerConfig,
    /// Identifier of the secret bundle holding all runtime credentials
    pub secret_id: String,
}

impl WorkflowConfig {
    /// Parses and normalizes a config from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed YAML and
    /// [`ConfigError::Invalid`] when a structural rule is violated.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(text)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and normalizes a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, plus the
    /// failures of [`Self::from_yaml`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Applies normalization that is not expressible through serde defaults.
    fn normalize(&mut self) {
        for team in &mut self.approval_teams {
            *team = team.trim().to_lowercase();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one database target is required".to_string(),
            ));
        }
        if self.approval_teams.iter().any(String::is_empty) || self.approval_teams.is_empty() {
            return Err(ConfigError::Invalid(
                "approval_teams must contain at least one non-empty team".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for db in &self.databases {
            if db.directory.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "database directory labels must be non-empty".to_string(),
                ));
            }
            if !seen.insert(db.directory.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate database directory '{}'",
                    db.directory
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
base_directory: migrations
pr_base_branch: main
approval_teams: [DBA, Data-Platform]
databases:
  - directory: core
    url_secret_key: core_db_url
tracker:
  domain: acme
  project: SCHEMA
  initial_status_id: "11"
  pr_link_field: customfield_10902
secret_id: acme/migops
"#;

    #[test]
    fn applies_defaults_and_lowercases_teams() {
        let config = WorkflowConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.databases[0].migration_table, "pgmigrations");
        assert_eq!(config.tracker.label, "db-migration");
        assert_eq!(config.tracker.issue_type, "Story");
        assert_eq!(config.completion_label, "db-migrated");
        assert_eq!(config.approval_teams, vec!["dba", "data-platform"]);
    }

    #[test]
    fn rejects_empty_database_list() {
        let yaml = MINIMAL.replace(
            "databases:\n  - directory: core\n    url_secret_key: core_db_url\n",
            "databases: []\n",
        );
        let err = WorkflowConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_duplicate_directories() {
        let yaml = MINIMAL.replace(
            "databases:\n  - directory: core\n    url_secret_key: core_db_url\n",
            "databases:\n  - directory: core\n    url_secret_key: a\n  - directory: core\n    url_secret_key: b\n",
        );
        let err = WorkflowConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
