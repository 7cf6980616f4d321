//! Request handlers.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use ocibay_image::{validate, ImageRef, Platform};
use serde::Deserialize;
use tower::util::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use crate::api::AppState;
use crate::error::{ApiError, Result};

/// Landing page served at `/`.
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>ocibay</title></head>
<body>
<h1>ocibay</h1>
<p>Caching gateway for container images. Request an image as a
<code>docker load</code>-compatible archive:</p>
<pre>GET /image?name=alpine:latest
GET /image?name=alpine:latest&amp;platform=linux/arm64</pre>
<p>Load the result with <code>docker load -i alpine.tar.gz</code>.</p>
</body>
</html>
"#;

/// Query parameters of the image endpoint.
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    /// Image reference, e.g. `alpine:latest`.
    pub name: Option<String>,
    /// Target platform, e.g. `linux/arm64`.
    pub platform: Option<String>,
}

/// `GET /image` - serve an archive from cache or build it first.
pub async fn get_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
    request: Request,
) -> Response {
    match serve_image(&state, query, request).await {
        Ok(response) => response,
        Err(err) => {
            if err.status_code().is_server_error() {
                state.stats.record_error();
            }
            err.into_response()
        }
    }
}

async fn serve_image(state: &AppState, query: ImageQuery, request: Request) -> Result<Response> {
    let name = query.name.ok_or(ApiError::MissingParameter("name"))?;
    let name = validate::sanitize_image_name(&name)
        .map_err(|e| ApiError::InvalidParameter(e.to_string()))?;

    // An absent or empty platform normalizes to the default before
    // fingerprinting, so implicit and explicit requests share one build.
    let platform = match query.platform.as_deref() {
        Some(platform) if !platform.is_empty() => validate::sanitize_platform(platform)
            .map_err(|e| ApiError::InvalidParameter(e.to_string()))?,
        _ => Platform::default(),
    };

    let reference = ImageRef::parse(&name).with_platform(platform);

    let Some(path) = state.cache.entry_path(&reference) else {
        warn!(image = %name, "security: cache path escapes cache directory");
        return Err(ApiError::PathTraversal);
    };

    if state.cache.lookup(&reference).is_some() {
        info!(image = %name, platform = %reference.platform, "serving cached image");
        return stream_archive(state, &reference, &path, request).await;
    }

    info!(image = %name, platform = %reference.platform, "downloading image");
    let saver = Arc::clone(&state.saver);
    let cache_dir = state.cache.dir().to_path_buf();
    let image = name.clone();
    let platform = reference.platform.to_string();
    let built = state
        .flight
        .run(&reference.fingerprint(), async move {
            saver.save(&image, &cache_dir, &platform).await
        })
        .await
        .map_err(ApiError::Build)?;

    stream_archive(state, &reference, &built, request).await
}

/// Streams an archive with HTTP Range support.
///
/// The file service supplies Accept-Ranges, 206/416 handling, and seeking;
/// only the download headers are overridden on top.
async fn stream_archive(
    state: &AppState,
    reference: &ImageRef,
    path: &Path,
    request: Request,
) -> Result<Response> {
    let response = ServeFile::new(path)
        .oneshot(request)
        .await
        .map_err(|_| ApiError::Internal)?;

    if response.status() == StatusCode::NOT_FOUND {
        // The archive vanished between lookup and serve.
        return Err(ApiError::Internal);
    }

    let mut response = response.map(Body::new);
    if response.status().is_success() {
        let filename = reference.cache_filename();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/gzip"),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }

        state.stats.record_pull();
        info!(image = %reference, "served image");
    }

    Ok(response)
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK\n"
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.stats.render_prometheus(),
    )
        .into_response()
}

/// `GET /`
pub async fn home() -> Html<&'static str> {
    Html(INDEX_HTML)
}
