//! Runtime credential resolution
//!
//! The static config names secret *keys*; this module fetches the secret
//! *values* for one run through the [`SecretStore`] seam. Resolution is
//! all-or-nothing: a missing key aborts before any target is attempted.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::WorkflowConfig;
use crate::error::CredentialError;

/// External secret store. Fetches a named bundle, selecting a subset of keys.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the named keys out of the bundle identified by `secret_id`.
    ///
    /// Implementations return whatever subset of `keys` exists; the
    /// resolver decides which absences are fatal.
    async fn fetch(
        &self,
        secret_id: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, CredentialError>;
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for &S {
    async fn fetch(
        &self,
        secret_id: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, CredentialError> {
        (**self).fetch(secret_id, keys).await
    }
}

/// Resolved secret values for one run.
///
/// `Debug` is implemented manually so secret values never reach logs.
#[derive(Clone)]
pub struct ResolvedCredentials {
    values: HashMap<String, String>,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("ResolvedCredentials")
            .field("keys", &keys)
            .field("values", &"<redacted>")
            .finish()
    }
}

impl ResolvedCredentials {
    /// Looks up one secret value by key.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingKey`] when the bundle did not
    /// contain the key.
    pub fn get(&self, key: &str) -> Result<&str, CredentialError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CredentialError::MissingKey(key.to_string()))
    }

    /// The host API token, stored under the conventional per-org key.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingKey`] when the bundle did not
    /// contain the token.
    pub fn github_token(&self, organization: &str) -> Result<&str, CredentialError> {
        self.get(&github_token_key(organization))
    }
}

/// Conventional bundle key for the per-organization host token.
#[must_use]
pub fn github_token_key(organization: &str) -> String {
    format!("github-{organization}-token")
}

/// Fetches every secret this run needs: one connection URL per database
/// target, the tracker user and token, and the per-org host token.
///
/// # Errors
///
/// Propagates store failures and fails on any key absent from the bundle.
pub async fn resolve(
    store: &dyn SecretStore,
    config: &WorkflowConfig,
    organization: &str,
) -> Result<ResolvedCredentials, CredentialError> {
    let mut keys: Vec<String> = config
        .databases
        .iter()
        .map(|db| db.url_secret_key.clone())
        .collect();
    keys.push(config.tracker.user_secret_key.clone());
    keys.push(config.tracker.token_secret_key.clone());
    keys.push(github_token_key(organization));
    keys.sort_unstable();
    keys.dedup();

    let values = store.fetch(&config.secret_id, &keys).await?;
    for key in &keys {
        if !values.contains_key(key) {
            return Err(CredentialError::MissingKey(key.clone()));
        }
    }

    Ok(ResolvedCredentials { values })
}
