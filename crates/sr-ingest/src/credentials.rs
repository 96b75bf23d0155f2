// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hostname-scoped credential validation

use std::collections::HashMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("unknown credential")]
    Unknown,

    #[error("url '{0}' has no hostname")]
    NoHost(String),
}

/// Resolves an opaque credential to the one hostname it may record
#[cfg_attr(test, mockall::automock)]
pub trait CredentialValidator: Send + Sync {
    fn allowed_hostname(&self, credential: &str) -> Result<String, CredentialError>;
}

/// Fixed credential to hostname table
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, credential: impl Into<String>, hostname: impl Into<String>) -> Self {
        self.keys
            .insert(credential.into(), hostname.into().to_ascii_lowercase());
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<(String, String)> for StaticCredentials {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::new(), |creds, (key, host)| creds.with_key(key, host))
    }
}

impl CredentialValidator for StaticCredentials {
    fn allowed_hostname(&self, credential: &str) -> Result<String, CredentialError> {
        self.keys.get(credential).cloned().ok_or(CredentialError::Unknown)
    }
}

/// Lowercased hostname of `url`
pub fn hostname_of(url: &str) -> Result<String, CredentialError> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .ok_or_else(|| CredentialError::NoHost(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_ignores_scheme_port_and_path() {
        assert_eq!(hostname_of("https://App.Example:8443/a?b=1").unwrap(), "app.example");
        assert_eq!(hostname_of("http://app.example").unwrap(), "app.example");
        assert!(matches!(hostname_of("not a url"), Err(CredentialError::NoHost(_))));
    }

    #[test]
    fn static_table_resolves_known_keys_only() {
        let creds = StaticCredentials::new().with_key("k1", "App.Example");
        assert_eq!(creds.allowed_hostname("k1").unwrap(), "app.example");
        assert_eq!(creds.allowed_hostname("k2"), Err(CredentialError::Unknown));
    }

    #[test]
    fn subdomains_are_distinct_hosts() {
        let creds = StaticCredentials::new().with_key("k1", "example.com");
        let allowed = creds.allowed_hostname("k1").unwrap();
        assert_ne!(hostname_of("https://www.example.com/").unwrap(), allowed);
    }
}
