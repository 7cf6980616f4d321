//! Router assembly.

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use ocibay_image::ImageSaver;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AuthGate};
use crate::cache::ImageCache;
use crate::flight::BuildGroup;
use crate::handlers;
use crate::stats::GatewayStats;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Archive cache.
    pub cache: ImageCache,
    /// Build pipeline.
    pub saver: Arc<ImageSaver>,
    /// Single-flight coordination.
    pub flight: Arc<BuildGroup>,
    /// Serving counters.
    pub stats: Arc<GatewayStats>,
}

/// Creates the gateway router.
///
/// `/`, `/health`, and `/metrics` are public; `/image` sits behind the auth
/// gate when it is enabled.
#[must_use]
pub fn create_router(state: AppState, gate: &AuthGate) -> Router {
    let mut protected = Router::new().route("/image", get(handlers::get_image));
    if gate.is_enabled() {
        protected = protected.route_layer(middleware::from_fn_with_state(
            Arc::new(gate.clone()),
            auth::require_auth,
        ));
    }

    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
