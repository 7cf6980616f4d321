//! Gateway server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use ocibay_image::{CredentialStore, ImageSaver};
use tracing::info;

use crate::api::{self, AppState};
use crate::auth::AuthGate;
use crate::cache::ImageCache;
use crate::config::Config;
use crate::flight::BuildGroup;
use crate::stats::GatewayStats;

/// The assembled gateway: configuration plus everything the handlers share.
pub struct GatewayServer {
    config: Config,
}

impl GatewayServer {
    /// Creates a server from validated configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Binds the listen port and serves until the process stops.
    ///
    /// When no cache directory is configured, a temp directory is created
    /// and kept for the lifetime of the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be prepared or the
    /// port cannot be bound.
    pub async fn run(self) -> std::io::Result<()> {
        let cache_dir = self.resolve_cache_dir()?;

        let credentials = Arc::new(CredentialStore::new());
        self.config.apply_credentials(&credentials);

        let state = AppState {
            cache: ImageCache::new(&cache_dir),
            saver: Arc::new(ImageSaver::new(credentials)),
            flight: Arc::new(BuildGroup::new()),
            stats: Arc::new(GatewayStats::new()),
        };
        let gate = AuthGate::new(self.config.auth.clone());
        let router = api::create_router(state, &gate);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(
            addr = %addr,
            cache = %cache_dir.display(),
            auth = gate.is_enabled(),
            "starting server"
        );
        axum::serve(listener, router).await
    }

    fn resolve_cache_dir(&self) -> std::io::Result<PathBuf> {
        if self.config.cache_dir.is_empty() {
            let dir = tempfile::Builder::new()
                .prefix("ocibay-cache-")
                .tempdir()?;
            return Ok(dir.keep());
        }

        let dir = PathBuf::from(&self.config.cache_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
