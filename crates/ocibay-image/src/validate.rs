//! Validation of untrusted registry components.
//!
//! Every string that reaches an outbound URL or a cache filename passes
//! through here first. The registry validator doubles as the SSRF gate:
//! loopback, link-local, private ranges, and encoded-IP forms are refused
//! outright.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ImageError, Result};
use crate::reference::{ImageRef, Platform};

static REGISTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*(:[0-9]+)?$",
    )
    .expect("registry pattern")
});

static REPOSITORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*$")
        .expect("repository pattern")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").expect("tag pattern"));

static DIGEST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+:[a-f0-9]+$").expect("digest pattern"));

static IMAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._\-/:]*$").expect("image name pattern"));

/// Operating systems accepted in a platform string.
const VALID_OS: &[&str] = &["linux", "windows", "darwin"];

/// Architectures accepted in a platform string.
const VALID_ARCH: &[&str] = &["amd64", "arm64", "arm", "386", "ppc64le", "s390x", "riscv64"];

fn invalid(field: &'static str, reason: impl Into<String>) -> ImageError {
    ImageError::InvalidInput {
        field,
        reason: reason.into(),
    }
}

/// Validates a registry hostname, including the SSRF block list.
///
/// # Errors
///
/// Returns [`ImageError::InvalidInput`] when the hostname is malformed or
/// resolves to a blocked address family.
pub fn validate_registry(registry: &str) -> Result<()> {
    if registry.is_empty() {
        return Err(invalid("registry", "cannot be empty"));
    }
    if registry.len() > 253 {
        return Err(invalid("registry", "hostname too long"));
    }
    if !REGISTRY_RE.is_match(registry) {
        return Err(invalid("registry", format!("malformed hostname: {registry}")));
    }

    let lower = registry.to_ascii_lowercase();
    let host = lower.split(':').next().unwrap_or(&lower);

    let blocked = |host: &str| invalid("registry", format!("hostname not allowed: {host}"));

    // Loopback, unspecified, and the cloud metadata endpoint.
    if matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0" | "169.254.169.254") {
        return Err(blocked(host));
    }

    // Private ranges.
    if host.starts_with("10.") || host.starts_with("192.168.") || host.starts_with("172.") {
        return Err(blocked(host));
    }

    // Decimal-encoded IPs: a real registry has at least one dot for a TLD.
    if !host.contains('.') && is_numeric(host) {
        return Err(blocked(host));
    }

    let parts: Vec<&str> = host.split('.').collect();

    // Hex-encoded octets (0x7f.0.0.1).
    if parts.iter().any(|p| p.starts_with("0x")) {
        return Err(blocked(host));
    }

    // Zero-padded or octal octets (127.0.0.01, 0177.0.0.1).
    if parts.len() == 4
        && parts.iter().all(|p| is_numeric(p))
        && parts.iter().any(|p| p.len() > 1 && p.starts_with('0'))
    {
        return Err(blocked(host));
    }

    Ok(())
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Validates a repository name.
///
/// # Errors
///
/// Returns [`ImageError::InvalidInput`] for empty, oversized, or malformed
/// names.
pub fn validate_repository(repository: &str) -> Result<()> {
    if repository.is_empty() {
        return Err(invalid("repository", "cannot be empty"));
    }
    if repository.len() > 256 {
        return Err(invalid("repository", "name too long"));
    }
    if !REPOSITORY_RE.is_match(repository) {
        return Err(invalid("repository", format!("malformed name: {repository}")));
    }
    Ok(())
}

/// Validates a tag name.
///
/// # Errors
///
/// Returns [`ImageError::InvalidInput`] for empty or malformed tags.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(invalid("tag", "cannot be empty"));
    }
    if !TAG_RE.is_match(tag) {
        return Err(invalid("tag", format!("malformed tag: {tag}")));
    }
    Ok(())
}

/// Validates a content digest (`<algorithm>:<hex>`).
///
/// # Errors
///
/// Returns [`ImageError::InvalidInput`] for empty, oversized, or malformed
/// digests.
pub fn validate_digest(digest: &str) -> Result<()> {
    if digest.is_empty() {
        return Err(invalid("digest", "cannot be empty"));
    }
    if digest.len() > 256 {
        return Err(invalid("digest", "too long"));
    }
    if !DIGEST_RE.is_match(digest) {
        return Err(invalid("digest", format!("malformed digest: {digest}")));
    }
    Ok(())
}

/// Validates every component of a parsed image reference.
///
/// # Errors
///
/// Returns the first component failure.
pub fn validate_reference(reference: &ImageRef) -> Result<()> {
    validate_registry(&reference.registry)?;
    validate_repository(&reference.repository)?;
    validate_tag(&reference.tag)?;
    Ok(())
}

/// Validates a raw image name from user input and returns the trimmed form.
///
/// The name is checked both as a string (length, traversal sequences,
/// character set) and as a parsed reference (registry, repository, tag).
///
/// # Errors
///
/// Returns [`ImageError::InvalidInput`] with field `image name` when the
/// string is unusable, or the component error when parsing reveals a bad
/// registry, repository, or tag.
pub fn sanitize_image_name(image_name: &str) -> Result<String> {
    let image_name = image_name.trim();

    if image_name.is_empty() {
        return Err(invalid("image name", "cannot be empty"));
    }
    if image_name.len() > 256 {
        return Err(invalid("image name", "too long (max 256 characters)"));
    }
    if image_name.contains("..") {
        return Err(invalid("image name", "contains path traversal sequence"));
    }
    if !IMAGE_NAME_RE.is_match(image_name) {
        return Err(invalid("image name", "contains invalid characters"));
    }

    validate_reference(&ImageRef::parse(image_name))?;

    Ok(image_name.to_string())
}

/// Validates a platform string and reconstructs it from the whitelists.
///
/// The returned [`Platform`] is built from whitelist members, never from the
/// raw input, so downstream filename and URL use cannot carry
/// attacker-chosen bytes.
///
/// # Errors
///
/// Returns [`ImageError::InvalidInput`] for anything but a known
/// `os/architecture` pair.
pub fn sanitize_platform(platform: &str) -> Result<Platform> {
    let parts: Vec<&str> = platform.split('/').collect();
    if parts.len() != 2 {
        return Err(invalid(
            "platform",
            "must be in format 'os/architecture' (e.g. 'linux/amd64')",
        ));
    }

    let os = VALID_OS.iter().find(|&&os| os == parts[0]).ok_or_else(|| {
        invalid(
            "platform",
            format!(
                "unsupported OS '{}', valid options: {}",
                parts[0],
                VALID_OS.join(", ")
            ),
        )
    })?;

    let arch = VALID_ARCH
        .iter()
        .find(|&&arch| arch == parts[1])
        .ok_or_else(|| {
            invalid(
                "platform",
                format!(
                    "unsupported architecture '{}', valid options: {}",
                    parts[1],
                    VALID_ARCH.join(", ")
                ),
            )
        })?;

    Ok(Platform::new(*os, *arch))
}

/// Normalizes a string into a single safe path component.
///
/// Path separators become underscores, parent-directory sequences are
/// removed, and leading dots are stripped. Used for cache filenames.
#[must_use]
pub fn sanitize_path_component(s: &str) -> String {
    let s = s.replace(['/', '\\'], "_");
    let s = s.replace("..", "");
    s.trim_start_matches('.').to_string()
}

/// Checks that `candidate` stays inside `base` after lexical normalization.
///
/// Neither path needs to exist; `.` and `..` components are resolved
/// textually before the prefix comparison.
#[must_use]
pub fn path_is_contained(base: &Path, candidate: &Path) -> bool {
    let base = normalize(base);
    let candidate = normalize(candidate);
    candidate == base || candidate.starts_with(&base)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
