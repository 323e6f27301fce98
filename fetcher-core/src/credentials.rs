//! Credentials are opaque inputs handed to each fetch; nothing here stores them.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct Credentials {
    pub identity: String,
    secret: SecretString,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::new(secret.into().into_boxed_str()),
        }
    }

    /// For sources that need no login (local statement folders).
    pub fn anonymous() -> Self {
        Self::new("", "")
    }

    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Credentials keyed by credential key (e.g. `degiro`, `schwab`).
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: BTreeMap<String, Credentials>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, credentials: Credentials) {
        self.entries.insert(key.into(), credentials);
    }

    pub fn with(mut self, key: impl Into<String>, credentials: Credentials) -> Self {
        self.insert(key, credentials);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Credentials> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
