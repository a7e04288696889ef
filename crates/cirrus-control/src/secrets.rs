//! Credential store seam.
//!
//! Credential persistence is the host's concern; the orchestrator only ever
//! resolves references it finds in templates. Lookups that resolve to
//! nothing are not errors: the descriptor builder skips those entries.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;

/// A username/password pair for a container registry.
#[derive(Debug, Clone)]
pub struct UsernamePassword {
    /// Registry username.
    pub username: String,
    /// Registry password.
    pub password: SecretString,
}

/// Storage-account credentials backing a file-share volume.
#[derive(Debug, Clone)]
pub struct FileShareCredentials {
    /// Storage account name.
    pub storage_account_name: String,
    /// Storage account key.
    pub storage_account_key: SecretString,
}

/// Host-provided credential store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a username/password credential, or `None` if unknown.
    async fn username_password(&self, credentials_id: &str) -> Option<UsernamePassword>;

    /// Resolve storage-account credentials for a file share, or `None` if
    /// unknown.
    async fn file_share(&self, credentials_id: &str) -> Option<FileShareCredentials>;
}

/// Fixed-content [`CredentialStore`] for tests and embedding.
#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    users: HashMap<String, UsernamePassword>,
    shares: HashMap<String, FileShareCredentials>,
}

impl StaticCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a username/password credential.
    #[must_use]
    pub fn with_username_password(
        mut self,
        id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.users.insert(
            id.into(),
            UsernamePassword {
                username: username.into(),
                password: SecretString::from(password.into()),
            },
        );
        self
    }

    /// Add storage-account credentials for a file share.
    #[must_use]
    pub fn with_file_share(
        mut self,
        id: impl Into<String>,
        account_name: impl Into<String>,
        account_key: impl Into<String>,
    ) -> Self {
        self.shares.insert(
            id.into(),
            FileShareCredentials {
                storage_account_name: account_name.into(),
                storage_account_key: SecretString::from(account_key.into()),
            },
        );
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn username_password(&self, credentials_id: &str) -> Option<UsernamePassword> {
        self.users.get(credentials_id).cloned()
    }

    async fn file_share(&self, credentials_id: &str) -> Option<FileShareCredentials> {
        self.shares.get(credentials_id).cloned()
    }
}
