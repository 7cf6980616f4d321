//! End-to-end image download and docker-load archive assembly.
//!
//! One [`ImageSaver::save`] call performs the complete pipeline:
//! authenticate, fetch the manifest, download the config and every layer
//! into an exclusively-owned temp directory, lay out the `docker load`
//! structure, and publish the gzipped tar into the output directory with an
//! atomic rename. The temp directory is removed on every exit path,
//! including failures.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task;
use tracing::info;

use crate::archive;
use crate::credentials::CredentialStore;
use crate::error::{ImageError, Result};
use crate::manifest::{Descriptor, ImageConfig, ImageManifest};
use crate::reference::ImageRef;
use crate::registry::RegistryClient;
use crate::validate;

/// Contents of every layer VERSION file.
const LAYER_VERSION: &[u8] = b"1.0";

/// Fixed creation timestamp in layer metadata, matching `docker save`
/// output for layers without history.
const LAYER_CREATED: &str = "0001-01-01T00:00:00Z";

/// Pulls images from registries and saves them as docker-load archives.
pub struct ImageSaver {
    credentials: Arc<CredentialStore>,
}

impl ImageSaver {
    /// Creates a saver backed by the given credential store.
    #[must_use]
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Downloads `image` for `platform` and publishes a docker-load tar.gz
    /// in `output_dir`.
    ///
    /// Returns the absolute path of the published archive, named
    /// `<repo>_<tag>_<os>_<arch>.tar.gz` with every component sanitized.
    ///
    /// # Errors
    ///
    /// Fails fast on invalid input, and otherwise surfaces the first
    /// authentication, registry, or I/O failure. A failed build leaves no
    /// partial artifact behind.
    pub async fn save(&self, image: &str, output_dir: &Path, platform: &str) -> Result<PathBuf> {
        let image = validate::sanitize_image_name(image)?;
        let platform = validate::sanitize_platform(platform)?;
        let reference = ImageRef::parse(&image).with_platform(platform);
        validate::validate_reference(&reference)?;

        let mut client = RegistryClient::new();
        if let Some(auth) = self.credentials.get(&reference.registry) {
            client = client.with_auth(auth);
        }

        info!(registry = %reference.registry, "authenticating");
        client.authenticate(&reference).await?;
        info!(user = client.authenticated_user(), "authenticated");

        info!(image = %reference, "fetching manifest");
        let manifest = client.get_manifest(&reference).await?;

        // Owned exclusively by this build; dropped (and deleted) on every
        // exit path below.
        let tmp = tempfile::Builder::new()
            .prefix("ocibay-build-")
            .tempdir()?;

        let archive_path = build_archive(
            &client,
            &reference,
            &manifest,
            tmp.path(),
            output_dir,
        )
        .await?;

        Ok(archive_path)
    }
}

/// Runs the assembly steps inside the temp directory and publishes the
/// final archive.
async fn build_archive(
    client: &RegistryClient,
    reference: &ImageRef,
    manifest: &ImageManifest,
    tmp: &Path,
    output_dir: &Path,
) -> Result<PathBuf> {
    let (config, config_hex) = fetch_config(client, reference, manifest, tmp).await?;

    if config.rootfs.diff_ids.len() != manifest.layers.len() {
        return Err(ImageError::LayerCountMismatch {
            layers: manifest.layers.len(),
            diff_ids: config.rootfs.diff_ids.len(),
        });
    }

    let total = manifest.layers.len();
    let mut layer_ids = Vec::with_capacity(total);
    for (index, layer) in manifest.layers.iter().enumerate() {
        let diff_id = download_layer(client, reference, layer, index, total, &config, tmp).await?;
        layer_ids.push(diff_id);
    }

    write_docker_manifest(reference, &config_hex, &layer_ids, tmp)?;
    write_repositories(reference, &layer_ids, tmp)?;

    publish(reference, tmp, output_dir).await
}

/// Downloads the image config blob and parses it.
async fn fetch_config(
    client: &RegistryClient,
    reference: &ImageRef,
    manifest: &ImageManifest,
    tmp: &Path,
) -> Result<(ImageConfig, String)> {
    info!("downloading image config");
    let config_hex = digest_hex(&manifest.config.digest).to_string();
    let config_path = tmp.join(format!("{config_hex}.json"));
    client
        .download_blob(reference, &manifest.config.digest, &config_path)
        .await?;

    let data = tokio::fs::read(&config_path).await?;
    let config: ImageConfig = serde_json::from_slice(&data)?;
    Ok((config, config_hex))
}

/// Downloads one layer blob, decompresses it into its diff-ID directory,
/// and writes the layer metadata. Returns the diff ID hex.
async fn download_layer(
    client: &RegistryClient,
    reference: &ImageRef,
    layer: &Descriptor,
    index: usize,
    total: usize,
    config: &ImageConfig,
    tmp: &Path,
) -> Result<String> {
    info!(layer = index + 1, total, digest = %layer.digest, "downloading layer");

    let layer_hex = digest_hex(&layer.digest);
    let compressed = tmp.join(format!("{layer_hex}.tar.gz"));
    client
        .download_blob(reference, &layer.digest, &compressed)
        .await?;

    let diff_id = digest_hex(&config.rootfs.diff_ids[index]).to_string();
    let layer_dir = tmp.join(&diff_id);
    tokio::fs::create_dir_all(&layer_dir).await?;

    let tar_path = layer_dir.join("layer.tar");
    task::spawn_blocking(move || archive::decompress(&compressed, &tar_path)).await??;

    let parent = (index > 0).then(|| digest_hex(&config.rootfs.diff_ids[index - 1]).to_string());
    write_layer_metadata(&layer_dir, &diff_id, parent.as_deref())?;

    Ok(diff_id)
}

/// Writes the VERSION and json files docker expects beside each layer tar.
fn write_layer_metadata(layer_dir: &Path, diff_id: &str, parent: Option<&str>) -> Result<()> {
    std::fs::write(layer_dir.join("VERSION"), LAYER_VERSION)?;

    let mut metadata = Map::new();
    metadata.insert("id".to_string(), Value::String(diff_id.to_string()));
    metadata.insert(
        "created".to_string(),
        Value::String(LAYER_CREATED.to_string()),
    );
    if let Some(parent) = parent {
        metadata.insert("parent".to_string(), Value::String(parent.to_string()));
    }

    std::fs::write(
        layer_dir.join("json"),
        serde_json::to_vec(&Value::Object(metadata))?,
    )?;
    Ok(())
}

/// Writes the single-entry manifest.json that drives `docker load`.
fn write_docker_manifest(
    reference: &ImageRef,
    config_hex: &str,
    layer_ids: &[String],
    tmp: &Path,
) -> Result<()> {
    let layers: Vec<Value> = layer_ids
        .iter()
        .map(|id| Value::String(format!("{id}/layer.tar")))
        .collect();

    let mut entry = Map::new();
    entry.insert(
        "Config".to_string(),
        Value::String(format!("{config_hex}.json")),
    );
    entry.insert(
        "RepoTags".to_string(),
        Value::Array(vec![Value::String(reference.repo_tag())]),
    );
    entry.insert("Layers".to_string(), Value::Array(layers));

    std::fs::write(
        tmp.join("manifest.json"),
        serde_json::to_vec(&Value::Array(vec![Value::Object(entry)]))?,
    )?;
    Ok(())
}

/// Writes the legacy repositories file mapping the short name and tag to
/// the top layer.
fn write_repositories(reference: &ImageRef, layer_ids: &[String], tmp: &Path) -> Result<()> {
    let short_name = reference
        .repository
        .rsplit('/')
        .next()
        .unwrap_or(&reference.repository);
    let top_layer = layer_ids.last().cloned().unwrap_or_default();

    let mut tags = Map::new();
    tags.insert(reference.tag.clone(), Value::String(top_layer));
    let mut repositories = Map::new();
    repositories.insert(short_name.to_string(), Value::Object(tags));

    std::fs::write(
        tmp.join("repositories"),
        serde_json::to_vec(&Value::Object(repositories))?,
    )?;
    Ok(())
}

/// Compresses the temp directory into the output archive and publishes it
/// atomically.
///
/// The tar.gz is written to a sibling temp file in the output directory and
/// renamed into place, so a reader never observes a partial archive.
async fn publish(reference: &ImageRef, tmp: &Path, output_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;

    let final_path = output_dir.join(reference.cache_filename());
    info!(path = %final_path.display(), "creating archive");

    let src = tmp.to_path_buf();
    let output_dir = output_dir.to_path_buf();
    let dest = final_path.clone();
    task::spawn_blocking(move || -> Result<()> {
        let staging = tempfile::NamedTempFile::new_in(&output_dir)?;
        archive::create_tar_gz(&src, staging.as_file())?;
        staging
            .persist(&dest)
            .map_err(|e| ImageError::Io(e.error))?;
        Ok(())
    })
    .await??;

    info!(path = %final_path.display(), "image saved");
    Ok(final_path)
}

/// Strips the algorithm prefix from a digest.
fn digest_hex(digest: &str) -> &str {
    digest.split_once(':').map_or(digest, |(_, hex)| hex)
}
