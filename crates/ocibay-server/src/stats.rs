//! Gateway serving statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters observable at the metrics endpoint.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Archives served successfully.
    pub pulls_total: AtomicU64,
    /// Errors returned to clients.
    pub errors_total: AtomicU64,
}

impl GatewayStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pulls_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
        }
    }

    /// Records one served archive.
    pub fn record_pull(&self) {
        self.pulls_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one client-visible error.
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Renders the counters in Prometheus text exposition format.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        format!(
            "# HELP ocibay_pulls_total The total number of images served\n\
             # TYPE ocibay_pulls_total counter\n\
             ocibay_pulls_total {}\n\
             # HELP ocibay_errors_total The total number of errors\n\
             # TYPE ocibay_errors_total counter\n\
             ocibay_errors_total {}\n",
            self.pulls_total.load(Ordering::Relaxed),
            self.errors_total.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let stats = GatewayStats::new();
        stats.record_pull();
        stats.record_pull();
        stats.record_error();

        assert_eq!(stats.pulls_total.load(Ordering::Relaxed), 2);
        assert_eq!(stats.errors_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_rendering() {
        let stats = GatewayStats::new();
        stats.record_pull();

        let text = stats.render_prometheus();
        assert!(text.contains("ocibay_pulls_total 1"));
        assert!(text.contains("ocibay_errors_total 0"));
        assert!(text.contains("# TYPE ocibay_pulls_total counter"));
    }
}
