//! HTTP authentication for protected routes.
//!
//! Three ways in, checked in order: `X-API-Key` header, `api_key` query
//! parameter, Basic auth. All comparisons are constant-time.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;

/// Authentication gate consulted before protected handlers run.
#[derive(Debug, Clone)]
pub struct AuthGate {
    config: AuthConfig,
}

impl AuthGate {
    /// Creates a gate from the configuration.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Whether authentication is enforced at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Decides whether a request may pass.
    #[must_use]
    pub fn authorize(&self, headers: &HeaderMap, query: &HashMap<String, String>) -> bool {
        if !self.config.enabled {
            return true;
        }

        if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            return self.valid_api_key(key);
        }

        if let Some(key) = query.get("api_key") {
            return self.valid_api_key(key);
        }

        if let Some((username, password)) = basic_credentials(headers) {
            return self.valid_basic(&username, &password);
        }

        false
    }

    fn valid_api_key(&self, key: &str) -> bool {
        self.config
            .api_keys
            .iter()
            .any(|valid| secure_compare(key, valid))
    }

    fn valid_basic(&self, username: &str, password: &str) -> bool {
        if self.config.username.is_empty() {
            return false;
        }
        secure_compare(username, &self.config.username)
            && secure_compare(password, &self.config.password)
    }
}

/// Axum middleware enforcing the gate.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    if gate.authorize(request.headers(), &query) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, r#"Basic realm="ocibay""#)],
        axum::Json(serde_json::json!({ "error": "unauthorized" })),
    )
        .into_response()
}

/// Extracts Basic auth credentials from the Authorization header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Constant-time string comparison.
fn secure_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate(enabled: bool) -> AuthGate {
        AuthGate::new(AuthConfig {
            enabled,
            username: "admin".into(),
            password: "secret".into(),
            api_keys: vec!["key-1".into(), "key-2".into()],
        })
    }

    fn basic_header(username: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_disabled_gate_allows_everything() {
        let gate = gate(false);
        assert!(gate.authorize(&HeaderMap::new(), &HashMap::new()));
    }

    #[test]
    fn test_enabled_gate_rejects_anonymous() {
        let gate = gate(true);
        assert!(!gate.authorize(&HeaderMap::new(), &HashMap::new()));
    }

    #[test]
    fn test_api_key_header() {
        let gate = gate(true);
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("key-2"));
        assert!(gate.authorize(&headers, &HashMap::new()));

        headers.insert("x-api-key", HeaderValue::from_static("wrong"));
        assert!(!gate.authorize(&headers, &HashMap::new()));
    }

    #[test]
    fn test_api_key_query_param() {
        let gate = gate(true);
        let mut query = HashMap::new();
        query.insert("api_key".to_string(), "key-1".to_string());
        assert!(gate.authorize(&HeaderMap::new(), &query));

        query.insert("api_key".to_string(), "nope".to_string());
        assert!(!gate.authorize(&HeaderMap::new(), &query));
    }

    #[test]
    fn test_basic_auth() {
        let gate = gate(true);
        assert!(gate.authorize(&basic_header("admin", "secret"), &HashMap::new()));
        assert!(!gate.authorize(&basic_header("admin", "wrong"), &HashMap::new()));
        assert!(!gate.authorize(&basic_header("root", "secret"), &HashMap::new()));
    }

    #[test]
    fn test_basic_auth_needs_configured_username() {
        let gate = AuthGate::new(AuthConfig {
            enabled: true,
            api_keys: vec!["key".into()],
            ..AuthConfig::default()
        });
        assert!(!gate.authorize(&basic_header("", ""), &HashMap::new()));
    }

    #[test]
    fn test_malformed_authorization_header() {
        let gate = gate(true);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(!gate.authorize(&headers, &HashMap::new()));
    }

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare("same", "same"));
        assert!(!secure_compare("same", "different"));
        assert!(!secure_compare("same", "sam"));
        assert!(!secure_compare("", "x"));
    }
}
