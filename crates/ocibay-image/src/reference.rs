//! Image reference parsing and normalization.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validate;

/// Canonical Docker Hub registry host. The `docker.io` and
/// `index.docker.io` aliases collapse to this.
pub const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";

/// Tag assumed when the reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Target platform of a pull (`os/architecture`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system (e.g. "linux").
    pub os: String,
    /// CPU architecture (e.g. "amd64").
    pub arch: String,
}

impl Platform {
    /// Creates a platform from already-validated components.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Parses and validates an `os/architecture` string against the
    /// platform whitelists.
    ///
    /// # Errors
    ///
    /// Returns an error for anything but a known pair.
    pub fn parse(s: &str) -> Result<Self> {
        validate::sanitize_platform(s)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new("linux", "amd64")
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Parsed image reference (e.g. "registry-1.docker.io/library/nginx:latest").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host, canonicalized.
    pub registry: String,
    /// Repository (e.g. "library/nginx").
    pub repository: String,
    /// Tag.
    pub tag: String,
    /// Requested platform.
    pub platform: Platform,
}

impl ImageRef {
    /// Parses an image reference string, filling in defaults.
    ///
    /// - tag defaults to `latest`
    /// - registry defaults to Docker Hub, aliases are canonicalized
    /// - bare Docker Hub repositories gain the `library/` namespace
    ///
    /// Parsing never fails; the result still must pass
    /// [`validate::validate_reference`] before any network or filesystem
    /// use.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let mut name = s;
        let mut tag = DEFAULT_TAG.to_string();

        // A ':' after the last '/' separates the tag.
        if let Some(idx) = name.rfind(':') {
            if !name[idx..].contains('/') {
                tag = name[idx + 1..].to_string();
                name = &name[..idx];
            }
        }

        let mut registry = DOCKER_HUB_REGISTRY.to_string();
        let mut repository = name.to_string();

        // A first component with a dot or port is a registry host.
        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() > 1 && (parts[0].contains('.') || parts[0].contains(':')) {
            registry = normalize_registry(parts[0]).to_string();
            repository = parts[1..].join("/");
        }

        if registry == DOCKER_HUB_REGISTRY && !repository.contains('/') {
            repository = format!("library/{repository}");
        }

        Self {
            registry,
            repository,
            tag,
            platform: Platform::default(),
        }
    }

    /// Replaces the platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Returns the fully-qualified name, registry included.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }

    /// Returns the tag docker attaches on `docker load`.
    ///
    /// The registry prefix is omitted for Docker Hub images so that
    /// `alpine:latest` loads as `library/alpine:latest`, matching what a
    /// plain `docker pull` would have produced.
    #[must_use]
    pub fn repo_tag(&self) -> String {
        if self.registry == DOCKER_HUB_REGISTRY {
            format!("{}:{}", self.repository, self.tag)
        } else {
            format!("{}/{}:{}", self.registry, self.repository, self.tag)
        }
    }

    /// Returns the cache fingerprint: every component sanitized and joined
    /// with underscores. Doubles as the single-flight key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            validate::sanitize_path_component(&self.repository),
            validate::sanitize_path_component(&self.tag),
            validate::sanitize_path_component(&self.platform.os),
            validate::sanitize_path_component(&self.platform.arch),
        )
    }

    /// Returns the archive filename this reference caches under.
    #[must_use]
    pub fn cache_filename(&self) -> String {
        format!("{}.tar.gz", self.fingerprint())
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Collapses the Docker Hub aliases onto the canonical registry host.
#[must_use]
pub fn normalize_registry(registry: &str) -> &str {
    match registry {
        "docker.io" | "index.docker.io" | "registry-1.docker.io" => DOCKER_HUB_REGISTRY,
        other => other,
    }
}
