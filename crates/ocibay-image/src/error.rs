//! Error types for image operations.

use thiserror::Error;

/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors that can occur while pulling and assembling an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// A user-controlled input failed validation. Never reaches the network.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// Which input failed (registry, repository, tag, ...).
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The registry rejected credentials or the token flow broke down.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The manifest endpoint returned an error or a malformed document.
    #[error("manifest unavailable: {0}")]
    ManifestUnavailable(String),

    /// The manifest list carried no exact match for the requested platform.
    #[error(
        "platform {wanted} not offered by this image, available platforms: {}",
        available.join(", ")
    )]
    PlatformUnavailable {
        /// The platform the caller asked for.
        wanted: String,
        /// Every platform the manifest list does offer.
        available: Vec<String>,
    },

    /// The blob endpoint returned a non-success status.
    #[error("blob unavailable: {0}")]
    BlobUnavailable(String),

    /// The manifest and the image config disagree on the layer count.
    #[error("manifest layer count {layers} does not match config diff_id count {diff_ids}")]
    LayerCountMismatch {
        /// Layers listed by the manifest.
        layers: usize,
        /// Diff IDs listed by the image config rootfs.
        diff_ids: usize,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport error or timeout talking to the registry.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::task::JoinError> for ImageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(err))
    }
}
