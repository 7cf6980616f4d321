//! Gateway configuration.
//!
//! Configuration is loaded from defaults, a YAML file, and `OCIBAY_*`
//! environment variables, in that order of precedence (later wins).
//!
//! ## Example Configuration File
//!
//! ```yaml
//! port: 8080
//! cache_dir: /var/cache/ocibay
//!
//! registries:
//!   ghcr.io:
//!     username: bot
//!     password: token
//!
//! auth:
//!   enabled: true
//!   username: admin
//!   password: secret
//!   api_keys:
//!     - dev-key-1
//! ```

use std::collections::HashMap;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use ocibay_image::CredentialStore;
use serde::{Deserialize, Serialize};

/// Default listen port.
const DEFAULT_PORT: u16 = 8080;

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen port.
    pub port: u16,
    /// Cache directory for built archives. Empty means a temp directory is
    /// created at startup.
    pub cache_dir: String,
    /// Per-registry credentials.
    pub registries: HashMap<String, RegistryCredentials>,
    /// HTTP authentication for the image endpoint.
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cache_dir: String::new(),
            registries: HashMap::new(),
            auth: AuthConfig::default(),
        }
    }
}

/// Credentials for one registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryCredentials {
    /// Username.
    #[serde(default)]
    pub username: String,
    /// Password or token.
    #[serde(default)]
    pub password: String,
}

/// HTTP authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether authentication is enforced on protected routes.
    pub enabled: bool,
    /// Basic auth username.
    pub username: String,
    /// Basic auth password.
    pub password: String,
    /// Accepted API keys.
    pub api_keys: Vec<String>,
}

impl Config {
    /// Loads configuration from defaults and environment only.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction or validation fails.
    pub fn load() -> Result<Self, figment::Error> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("OCIBAY_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("OCIBAY_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants figment cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error for an out-of-range port, auth enabled with no
    /// credentials at all, or a username without a password.
    pub fn validate(&self) -> Result<(), figment::Error> {
        if self.port == 0 {
            return Err(figment::Error::from(
                "invalid port: 0 (must be between 1 and 65535)".to_string(),
            ));
        }

        if self.auth.enabled {
            let has_basic = !self.auth.username.is_empty();
            let has_keys = !self.auth.api_keys.is_empty();
            if !has_basic && !has_keys {
                return Err(figment::Error::from(
                    "auth is enabled but no credentials are configured".to_string(),
                ));
            }
        }
        if !self.auth.username.is_empty() && self.auth.password.is_empty() {
            return Err(figment::Error::from(
                "auth username is set but password is empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Registers every configured registry credential with the store.
    pub fn apply_credentials(&self, store: &CredentialStore) {
        for (registry, credentials) in &self.registries {
            store.set(registry, &credentials.username, &credentials.password);
        }
    }
}
