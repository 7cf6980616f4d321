//! OCI image manifest types.

use serde::{Deserialize, Serialize};

// Well-known media types.
pub const MEDIA_TYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Image manifest (Docker schema 2 or OCI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version (should be 2).
    pub schema_version: u32,
    /// Media type.
    #[serde(default)]
    pub media_type: String,
    /// Config descriptor.
    pub config: Descriptor,
    /// Layer descriptors, parent first. Order defines the stacking.
    pub layers: Vec<Descriptor>,
}

/// Multi-platform manifest list (fat manifest / OCI index).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    /// Schema version (should be 2).
    pub schema_version: u32,
    /// Media type.
    #[serde(default)]
    pub media_type: String,
    /// Platform-specific manifest entries.
    pub manifests: Vec<ManifestEntry>,
}

/// One entry in a manifest list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Media type of the referenced manifest.
    #[serde(default)]
    pub media_type: String,
    /// Content digest.
    pub digest: String,
    /// Content size.
    #[serde(default)]
    pub size: u64,
    /// Platform specification. Absent on attestation entries.
    #[serde(default)]
    pub platform: Option<ManifestPlatform>,
}

/// Platform of a manifest-list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPlatform {
    /// CPU architecture.
    pub architecture: String,
    /// Operating system.
    pub os: String,
    /// Architecture variant (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Content descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type.
    #[serde(default)]
    pub media_type: String,
    /// Content digest.
    pub digest: String,
    /// Content size.
    #[serde(default)]
    pub size: u64,
}

/// Image configuration blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Architecture.
    pub architecture: String,
    /// OS.
    pub os: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created: Option<String>,
    /// Runtime configuration.
    #[serde(default)]
    pub config: RuntimeConfig,
    /// Root filesystem.
    pub rootfs: RootFs,
}

/// Runtime configuration carried by the image config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuntimeConfig {
    /// Environment variables.
    #[serde(default)]
    pub env: Option<Vec<String>>,
    /// Command.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    /// Working directory.
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// Root filesystem specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFs {
    /// Type (should be "layers").
    #[serde(rename = "type")]
    pub fs_type: String,
    /// Uncompressed-content digests, one per layer, in layer order.
    pub diff_ids: Vec<String>,
}
