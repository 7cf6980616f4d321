//! Single-flight build coordination.
//!
//! At most one archive build runs per fingerprint. The first caller spawns
//! the build as a detached task and every caller, first included, awaits
//! the shared completion signal. The map entry is removed once the build
//! resolves, so the next request starts fresh and finds the artifact on
//! disk instead. Failures are shared with the waiters but never cached.
//!
//! Running the build in a spawned task means a client that disconnects
//! mid-build does not abort it; the cache still gets populated for the
//! next caller.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ocibay_image::ImageError;
use tokio::sync::watch;
use tracing::debug;

/// Outcome shared by every waiter of one build.
pub type BuildResult = std::result::Result<PathBuf, Arc<ImageError>>;

type FlightMap = HashMap<String, watch::Receiver<Option<BuildResult>>>;

/// Deduplicates concurrent builds by fingerprint.
#[derive(Debug, Default)]
pub struct BuildGroup {
    inflight: Arc<Mutex<FlightMap>>,
}

impl BuildGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `build` unless a build for `key` is already in flight, in which
    /// case the existing one is awaited instead.
    ///
    /// All concurrent callers with the same key receive the same result.
    pub async fn run<F>(&self, key: &str, build: F) -> BuildResult
    where
        F: Future<Output = Result<PathBuf, ImageError>> + Send + 'static,
    {
        let mut receiver = {
            let mut inflight = self.inflight.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

            if let Some(receiver) = inflight.get(key) {
                debug!(key, "joining in-flight build");
                receiver.clone()
            } else {
                debug!(key, "starting build");
                let (sender, receiver) = watch::channel(None);
                inflight.insert(key.to_string(), receiver.clone());

                let map = Arc::clone(&self.inflight);
                let key = key.to_string();
                tokio::spawn(async move {
                    let result = build.await.map_err(Arc::new);
                    map.lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .remove(&key);
                    let _ = sender.send(Some(result));
                });

                receiver
            }
        };

        let result = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Arc::new(ImageError::Io(std::io::Error::other("build task vanished"))))?
            .clone();

        // wait_for only returns on Some.
        result.unwrap_or_else(|| {
            Err(Arc::new(ImageError::Io(std::io::Error::other(
                "build produced no result",
            ))))
        })
    }

    /// Number of builds currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no build is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
