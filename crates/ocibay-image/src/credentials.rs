//! Registry credential storage.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::reference::normalize_registry;

/// Authentication credentials for one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

/// Registry host to credentials mapping.
///
/// Lookups normalize Docker Hub aliases, so credentials stored under
/// `docker.io` are found for `registry-1.docker.io` and vice versa.
/// Absence means anonymous access. Constructed once at startup and shared
/// by `Arc`.
#[derive(Debug, Default)]
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, RegistryAuth>>,
}

impl CredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets credentials for a registry.
    pub fn set(&self, registry: &str, username: impl Into<String>, password: impl Into<String>) {
        if let Ok(mut credentials) = self.credentials.write() {
            credentials.insert(
                normalize_registry(registry).to_string(),
                RegistryAuth {
                    username: username.into(),
                    password: password.into(),
                },
            );
        }
    }

    /// Looks up credentials for a registry. `None` means anonymous.
    #[must_use]
    pub fn get(&self, registry: &str) -> Option<RegistryAuth> {
        let credentials = self.credentials.read().ok()?;
        credentials.get(normalize_registry(registry)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_registry_is_anonymous() {
        let store = CredentialStore::new();
        assert!(store.get("ghcr.io").is_none());
    }

    #[test]
    fn test_set_and_get() {
        let store = CredentialStore::new();
        store.set("ghcr.io", "user", "secret");

        let auth = store.get("ghcr.io").unwrap();
        assert_eq!(auth.username, "user");
        assert_eq!(auth.password, "secret");
    }

    #[test]
    fn test_docker_hub_aliases_share_credentials() {
        let store = CredentialStore::new();
        store.set("docker.io", "hubuser", "hubpass");

        for alias in ["docker.io", "index.docker.io", "registry-1.docker.io"] {
            let auth = store.get(alias).unwrap();
            assert_eq!(auth.username, "hubuser", "{alias}");
        }
    }

    #[test]
    fn test_overwrite_replaces_previous() {
        let store = CredentialStore::new();
        store.set("quay.io", "old", "old");
        store.set("quay.io", "new", "new");
        assert_eq!(store.get("quay.io").unwrap().username, "new");
    }
}
