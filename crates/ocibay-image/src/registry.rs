//! Docker Registry v2 API client.
//!
//! Supports Docker Hub and OCI-compliant registries with bearer token
//! authentication. One client instance serves one image build; the token is
//! acquired on demand, scoped to a single repository, and never refreshed.
//!
//! Outbound URLs are never assembled by string interpolation: the host is
//! validated first, then a [`url::Url`] is reconstructed from validated
//! components with per-segment escaping.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::credentials::RegistryAuth;
use crate::error::{ImageError, Result};
use crate::manifest::{ImageManifest, ManifestList};
use crate::reference::{ImageRef, Platform};
use crate::validate;

/// Accept header for the initial manifest request.
const MANIFEST_ACCEPT: &str = concat!(
    "application/vnd.docker.distribution.manifest.v2+json, ",
    "application/vnd.oci.image.manifest.v1+json, ",
    "application/vnd.docker.distribution.manifest.list.v2+json, ",
    "application/vnd.oci.image.index.v1+json"
);

/// Accept header for the by-digest request after index resolution.
const IMAGE_MANIFEST_ACCEPT: &str = concat!(
    "application/vnd.docker.distribution.manifest.v2+json, ",
    "application/vnd.oci.image.manifest.v1+json"
);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Token response from the registry auth service.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    access_token: String,
}

/// WWW-Authenticate challenge parsed from a 401 response.
#[derive(Debug, Default, PartialEq, Eq)]
struct AuthChallenge {
    realm: String,
    service: String,
}

/// Registry client for the Docker Registry HTTP API v2.
pub struct RegistryClient {
    /// HTTP client.
    client: Client,
    /// Optional basic auth credentials for the token endpoint.
    auth: Option<RegistryAuth>,
    /// Bearer token, acquired by [`Self::authenticate`].
    token: Option<String>,
    /// Username used for authentication, for logging.
    username: String,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    /// Creates a new anonymous registry client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("ocibay/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            auth: None,
            token: None,
            username: "anonymous".to_string(),
        }
    }

    /// Sets credentials for the token exchange.
    #[must_use]
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.username = auth.username.clone();
        self.auth = Some(auth);
        self
    }

    /// Returns the username used for authentication.
    #[must_use]
    pub fn authenticated_user(&self) -> &str {
        &self.username
    }

    /// Performs the two-step bearer token flow for the given image.
    ///
    /// A registry that answers the `/v2/` probe with 200 needs no token. On
    /// 401 the `WWW-Authenticate` challenge is parsed, the realm is vetted
    /// against the same SSRF rules as registry hosts, and a pull-scoped
    /// token is requested (with basic auth when credentials are present).
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::AuthenticationFailed`] on any unexpected
    /// status or a malformed challenge or token response.
    pub async fn authenticate(&mut self, reference: &ImageRef) -> Result<()> {
        validate::validate_reference(reference)?;

        let url = v2_url(&reference.registry, "", &[])?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => {
                let header = response
                    .headers()
                    .get(header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        ImageError::AuthenticationFailed(
                            "missing WWW-Authenticate header".to_string(),
                        )
                    })?;
                let challenge = parse_www_authenticate(header)?;
                self.fetch_token(&challenge, reference).await
            }
            status => Err(ImageError::AuthenticationFailed(format!(
                "unexpected status from registry: {status}"
            ))),
        }
    }

    /// Requests a bearer token from the auth service named by the challenge.
    async fn fetch_token(&mut self, challenge: &AuthChallenge, reference: &ImageRef) -> Result<()> {
        let mut token_url = validate_realm(&challenge.realm)?;

        let scope = format!("repository:{}:pull", reference.repository);
        token_url
            .query_pairs_mut()
            .append_pair("service", &challenge.service)
            .append_pair("scope", &scope);

        debug!(url = %token_url, "requesting token");

        let mut request = self.client.get(token_url);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::AuthenticationFailed(format!(
                "{status} - {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ImageError::AuthenticationFailed(format!("malformed token response: {e}"))
        })?;

        let token = if token.token.is_empty() {
            token.access_token
        } else {
            token.token
        };
        if token.is_empty() {
            return Err(ImageError::AuthenticationFailed(
                "token response carried no token".to_string(),
            ));
        }

        self.token = Some(token);
        Ok(())
    }

    /// Fetches the image manifest for the reference, resolving manifest
    /// lists to the requested platform.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::ManifestUnavailable`] on a non-200 status or a
    /// malformed document, and [`ImageError::PlatformUnavailable`] when the
    /// manifest list has no exact platform match.
    pub async fn get_manifest(&self, reference: &ImageRef) -> Result<ImageManifest> {
        validate::validate_reference(reference)?;

        let url = v2_url(
            &reference.registry,
            &reference.repository,
            &["manifests", &reference.tag],
        )?;
        debug!(url = %url, "fetching manifest");

        let response = self.get_with_token(url, Some(MANIFEST_ACCEPT)).await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::ManifestUnavailable(format!(
                "{status} - {body}"
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.bytes().await?;

        if is_manifest_list(&content_type) {
            let list: ManifestList = serde_json::from_slice(&body).map_err(|e| {
                ImageError::ManifestUnavailable(format!("malformed manifest list: {e}"))
            })?;
            let digest = select_platform(&list, &reference.platform)?;
            self.get_manifest_by_digest(reference, &digest).await
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| ImageError::ManifestUnavailable(format!("malformed manifest: {e}")))
        }
    }

    /// Fetches a single-platform manifest by digest, reusing the token.
    async fn get_manifest_by_digest(
        &self,
        reference: &ImageRef,
        digest: &str,
    ) -> Result<ImageManifest> {
        validate::validate_digest(digest)?;

        let url = v2_url(
            &reference.registry,
            &reference.repository,
            &["manifests", digest],
        )?;
        debug!(url = %url, "fetching manifest by digest");

        let response = self.get_with_token(url, Some(IMAGE_MANIFEST_ACCEPT)).await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::ManifestUnavailable(format!(
                "{status} - {body}"
            )));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| ImageError::ManifestUnavailable(format!("malformed manifest: {e}")))
    }

    /// Streams a blob to `dest` without buffering it in memory.
    ///
    /// No decompression happens here; the blob lands byte-for-byte as the
    /// registry serves it.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::BlobUnavailable`] on a non-200 status and I/O
    /// or network errors as their own categories.
    pub async fn download_blob(
        &self,
        reference: &ImageRef,
        digest: &str,
        dest: &Path,
    ) -> Result<()> {
        validate::validate_reference(reference)?;
        validate::validate_digest(digest)?;

        let url = v2_url(
            &reference.registry,
            &reference.repository,
            &["blobs", digest],
        )?;
        debug!(url = %url, dest = %dest.display(), "downloading blob");

        let response = self.get_with_token(url, None).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ImageError::BlobUnavailable(format!("{digest}: {status}")));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Issues a GET with the bearer token and optional Accept header.
    async fn get_with_token(&self, url: Url, accept: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(request.send().await?)
    }
}

/// Builds a v2 API URL from validated components.
///
/// The host is re-validated, then the path is assembled segment by segment
/// so every component is escaped individually. An empty `repository` with no
/// trailing parts yields the `/v2/` discovery endpoint.
fn v2_url(registry: &str, repository: &str, parts: &[&str]) -> Result<Url> {
    validate::validate_registry(registry)?;

    let mut url = Url::parse(&format!("https://{registry}/")).map_err(|e| {
        ImageError::InvalidInput {
            field: "registry",
            reason: e.to_string(),
        }
    })?;

    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            ImageError::InvalidInput {
                field: "registry",
                reason: "cannot be a base URL".to_string(),
            }
        })?;
        segments.pop_if_empty();
        segments.push("v2");
        for segment in repository.split('/').filter(|s| !s.is_empty()) {
            segments.push(segment);
        }
        for part in parts {
            segments.push(part);
        }
        if repository.is_empty() && parts.is_empty() {
            // Trailing slash of the discovery endpoint.
            segments.push("");
        }
    }

    Ok(url)
}

/// Validates a token realm URL and returns it parsed.
///
/// The realm comes from a response header, so it gets the same treatment as
/// user input: scheme restricted to http/https and the host run through the
/// registry SSRF gate.
fn validate_realm(realm: &str) -> Result<Url> {
    let url = Url::parse(realm)
        .map_err(|e| ImageError::AuthenticationFailed(format!("invalid auth realm URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ImageError::AuthenticationFailed(format!(
            "invalid auth realm scheme: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or_else(|| {
        ImageError::AuthenticationFailed("auth realm URL has no host".to_string())
    })?;
    validate::validate_registry(host)
        .map_err(|e| ImageError::AuthenticationFailed(format!("auth realm rejected: {e}")))?;

    Ok(url)
}

/// Parses a `WWW-Authenticate: Bearer` challenge header.
fn parse_www_authenticate(header: &str) -> Result<AuthChallenge> {
    let mut challenge = AuthChallenge::default();

    for part in header.trim_start_matches("Bearer ").split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("realm=") {
            challenge.realm = value.trim_matches('"').to_string();
        } else if let Some(value) = part.strip_prefix("service=") {
            challenge.service = value.trim_matches('"').to_string();
        }
    }

    if challenge.realm.is_empty() {
        return Err(ImageError::AuthenticationFailed(
            "invalid WWW-Authenticate header".to_string(),
        ));
    }

    Ok(challenge)
}

/// Checks whether a content type names a manifest list or image index.
fn is_manifest_list(content_type: &str) -> bool {
    content_type.contains("manifest.list") || content_type.contains("image.index")
}

/// Selects the manifest digest matching the platform exactly.
///
/// No fallback: a mismatch is an error that enumerates what the image does
/// offer, so the caller can pick a platform that exists.
fn select_platform(list: &ManifestList, platform: &Platform) -> Result<String> {
    for entry in &list.manifests {
        if let Some(p) = &entry.platform {
            if p.os == platform.os && p.architecture == platform.arch {
                return Ok(entry.digest.clone());
            }
        }
    }

    let available: Vec<String> = list
        .manifests
        .iter()
        .filter_map(|entry| entry.platform.as_ref())
        .map(|p| format!("{}/{}", p.os, p.architecture))
        .collect();

    Err(ImageError::PlatformUnavailable {
        wanted: platform.to_string(),
        available,
    })
}
