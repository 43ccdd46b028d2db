//! Credential sealing backed by the OS keychain.
//!
//! When a blueprint asks for encrypted credentials, the plaintext is handed to
//! the platform keychain (`keyring-rs`) and only a `${secret:<entry>}`
//! reference is written to disk.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

static SERVICE: &str = "hacksmith";

/// Secret storage backend selected in settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretsBackend {
    /// Seal credentials in the OS keychain.
    #[default]
    Keychain,
    /// No sealing backend; blueprints requiring encryption cannot complete.
    None,
}

/// Errors raised while sealing credentials.
#[derive(Debug, Error, Clone)]
pub enum SealError {
    #[error("Keyring error for {name}: {error}")]
    Keyring { name: String, error: String },
}

/// Stores secrets in the OS keychain under a per-provider namespace.
#[derive(Debug, Clone)]
pub struct KeychainSealer {
    namespace: String,
}

impl KeychainSealer {
    /// Creates a sealer whose entries are prefixed with `namespace` (typically the provider slug).
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Keychain entry name for a credential.
    pub fn entry_name(&self, credential_name: &str) -> String {
        format!("{}-{}", self.namespace, credential_name)
    }

    /// Stores `plaintext` and returns the reference written in its place.
    pub fn seal(&self, credential_name: &str, plaintext: &str) -> Result<String, SealError> {
        let entry_name = self.entry_name(credential_name);
        let entry = Entry::new(SERVICE, &entry_name).map_err(|error| SealError::Keyring {
            name: entry_name.clone(),
            error: error.to_string(),
        })?;
        entry.set_password(plaintext).map_err(|error| SealError::Keyring {
            name: entry_name.clone(),
            error: error.to_string(),
        })?;

        debug!("Sealed credential in keychain: {}", entry_name);
        Ok(sealed_reference(&entry_name))
    }
}

/// Formats the on-disk reference for a keychain entry.
fn sealed_reference(entry_name: &str) -> String {
    format!("${{secret:{}}}", entry_name)
}
