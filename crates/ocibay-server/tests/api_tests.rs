//! Integration tests for the gateway HTTP surface.
//!
//! Everything here runs against a router with a seeded cache directory, so
//! no test performs outbound network traffic: cache hits short-circuit the
//! build pipeline and invalid inputs are rejected before it.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use ocibay_image::{CredentialStore, ImageSaver};
use ocibay_server::api::{create_router, AppState};
use ocibay_server::auth::AuthGate;
use ocibay_server::cache::ImageCache;
use ocibay_server::config::AuthConfig;
use ocibay_server::flight::BuildGroup;
use ocibay_server::stats::GatewayStats;
use tempfile::TempDir;
use tower::ServiceExt;

/// Archive bytes seeded into the cache for the happy-path tests.
const ARCHIVE: &[u8] = b"gzip archive stand-in, 32 bytes!";

fn test_state(cache_dir: &TempDir) -> AppState {
    AppState {
        cache: ImageCache::new(cache_dir.path()),
        saver: Arc::new(ImageSaver::new(Arc::new(CredentialStore::new()))),
        flight: Arc::new(BuildGroup::new()),
        stats: Arc::new(GatewayStats::new()),
    }
}

/// Router with auth disabled and an empty cache.
fn test_router(cache_dir: &TempDir) -> Router {
    create_router(test_state(cache_dir), &AuthGate::new(AuthConfig::default()))
}

/// Router with auth disabled and `alpine:latest` (default platform) cached.
fn seeded_router(cache_dir: &TempDir) -> Router {
    std::fs::write(
        cache_dir
            .path()
            .join("library_alpine_latest_linux_amd64.tar.gz"),
        ARCHIVE,
    )
    .unwrap();
    test_router(cache_dir)
}

async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body.to_vec())
}

// ============================================================================
// Input validation
// ============================================================================

#[tokio::test]
async fn test_missing_name_is_bad_request() {
    let cache = TempDir::new().unwrap();
    let (status, _, body) = get(test_router(&cache), "/image").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("missing required 'name'"));
}

#[tokio::test]
async fn test_path_traversal_name_is_rejected() {
    let cache = TempDir::new().unwrap();
    let (status, _, body) = get(test_router(&cache), "/image?name=../../etc/passwd").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().starts_with("invalid image name"));

    // No cache file was created.
    assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_ssrf_registry_is_rejected_before_network() {
    let cache = TempDir::new().unwrap();
    let router = test_router(&cache);

    for uri in [
        "/image?name=169.254.169.254/meta:latest",
        "/image?name=localhost:5000/foo",
        "/image?name=10.0.0.1/internal/app",
    ] {
        let (status, _, _) = get(router.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
    assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_invalid_platform_is_rejected() {
    let cache = TempDir::new().unwrap();
    let router = test_router(&cache);

    for uri in [
        "/image?name=alpine&platform=linux/mips",
        "/image?name=alpine&platform=plan9/amd64",
        "/image?name=alpine&platform=linux",
        "/image?name=alpine&platform=../../etc",
    ] {
        let (status, _, body) = get(router.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().starts_with("invalid platform"));
    }
}

// ============================================================================
// Cache serving
// ============================================================================

#[tokio::test]
async fn test_cached_image_is_served_with_download_headers() {
    let cache = TempDir::new().unwrap();
    let (status, headers, body) =
        get(seeded_router(&cache), "/image?name=alpine:latest").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ARCHIVE);
    assert_eq!(headers[header::CONTENT_TYPE], "application/gzip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"library_alpine_latest_linux_amd64.tar.gz\""
    );
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
}

#[tokio::test]
async fn test_default_and_explicit_platform_hit_same_entry() {
    let cache = TempDir::new().unwrap();
    let router = seeded_router(&cache);

    // Bare name, explicit platform, and URL-encoded platform all resolve to
    // the one cached archive.
    for uri in [
        "/image?name=alpine:latest",
        "/image?name=alpine:latest&platform=linux/amd64",
        "/image?name=alpine:latest&platform=linux%2Famd64",
        "/image?name=alpine",
    ] {
        let (status, _, body) = get(router.clone(), uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, ARCHIVE, "{uri}");
    }
}

#[tokio::test]
async fn test_docker_hub_aliases_hit_same_entry() {
    let cache = TempDir::new().unwrap();
    let router = seeded_router(&cache);

    for uri in [
        "/image?name=docker.io/alpine:latest",
        "/image?name=index.docker.io/library/alpine:latest",
        "/image?name=registry-1.docker.io/alpine",
    ] {
        let (status, _, body) = get(router.clone(), uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, ARCHIVE, "{uri}");
    }
}

// ============================================================================
// Range requests
// ============================================================================

async fn get_range(
    router: Router,
    uri: &str,
    range: &str,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::RANGE, range)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body.to_vec())
}

#[tokio::test]
async fn test_range_request_returns_partial_content() {
    let cache = TempDir::new().unwrap();
    let (status, headers, body) = get_range(
        seeded_router(&cache),
        "/image?name=alpine:latest",
        "bytes=2-5",
    )
    .await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, &ARCHIVE[2..=5]);
    let content_range = headers[header::CONTENT_RANGE].to_str().unwrap();
    assert_eq!(content_range, format!("bytes 2-5/{}", ARCHIVE.len()));
}

#[tokio::test]
async fn test_open_ended_range_returns_suffix() {
    let cache = TempDir::new().unwrap();
    let (status, _, body) = get_range(
        seeded_router(&cache),
        "/image?name=alpine:latest",
        "bytes=4-",
    )
    .await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, &ARCHIVE[4..]);
}

#[tokio::test]
async fn test_adjacent_ranges_reassemble_prefix() {
    let cache = TempDir::new().unwrap();
    let router = seeded_router(&cache);

    let (_, _, first) = get_range(router.clone(), "/image?name=alpine:latest", "bytes=0-9").await;
    let (_, _, second) =
        get_range(router, "/image?name=alpine:latest", "bytes=10-19").await;

    let mut reassembled = first;
    reassembled.extend_from_slice(&second);
    assert_eq!(reassembled, &ARCHIVE[..20]);
}

#[tokio::test]
async fn test_range_past_end_is_unsatisfiable() {
    let cache = TempDir::new().unwrap();
    let (status, _, _) = get_range(
        seeded_router(&cache),
        "/image?name=alpine:latest",
        &format!("bytes={}-", ARCHIVE.len()),
    )
    .await;

    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
}

// ============================================================================
// Auth gate
// ============================================================================

fn auth_router(cache_dir: &TempDir) -> Router {
    std::fs::write(
        cache_dir
            .path()
            .join("library_alpine_latest_linux_amd64.tar.gz"),
        ARCHIVE,
    )
    .unwrap();
    let gate = AuthGate::new(AuthConfig {
        enabled: true,
        username: "admin".into(),
        password: "secret".into(),
        api_keys: vec!["dev-key".into()],
    });
    create_router(test_state(cache_dir), &gate)
}

#[tokio::test]
async fn test_protected_route_rejects_anonymous() {
    let cache = TempDir::new().unwrap();
    let response = auth_router(&cache)
        .oneshot(
            Request::builder()
                .uri("/image?name=alpine:latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_api_key_header_passes_gate() {
    let cache = TempDir::new().unwrap();
    let response = auth_router(&cache)
        .oneshot(
            Request::builder()
                .uri("/image?name=alpine:latest")
                .header("X-API-Key", "dev-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_query_passes_gate() {
    let cache = TempDir::new().unwrap();
    let (status, _, _) = get(
        auth_router(&cache),
        "/image?name=alpine:latest&api_key=dev-key",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_basic_auth_passes_gate() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let cache = TempDir::new().unwrap();
    let response = auth_router(&cache)
        .oneshot(
            Request::builder()
                .uri("/image?name=alpine:latest")
                .header(
                    header::AUTHORIZATION,
                    format!("Basic {}", STANDARD.encode("admin:secret")),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_public_routes_skip_gate() {
    let cache = TempDir::new().unwrap();
    let router = auth_router(&cache);

    for uri in ["/", "/health", "/metrics"] {
        let (status, _, _) = get(router.clone(), uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
}

// ============================================================================
// Ancillary endpoints
// ============================================================================

#[tokio::test]
async fn test_health() {
    let cache = TempDir::new().unwrap();
    let (status, _, body) = get(test_router(&cache), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK\n");
}

#[tokio::test]
async fn test_metrics_counts_served_images() {
    let cache = TempDir::new().unwrap();
    let router = seeded_router(&cache);

    let (_, _, _) = get(router.clone(), "/image?name=alpine:latest").await;
    let (status, _, body) = get(router, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("ocibay_pulls_total 1"), "{text}");
    assert!(text.contains("ocibay_errors_total 0"), "{text}");
}

#[tokio::test]
async fn test_home_page() {
    let cache = TempDir::new().unwrap();
    let (status, headers, body) = get(test_router(&cache), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(String::from_utf8(body).unwrap().contains("ocibay"));
}
