//! Prometheus metrics for store commits and persistence.
//!
//! Metrics are recorded through the `metrics` facade and are no-ops until a
//! recorder is installed. [`MetricsExporter`] installs the Prometheus recorder
//! and renders the text exposition format.
//!
//! # Example
//!
//! ```rust,no_run
//! use slicestore_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // ... use stores ...
//!
//! if let Some(text) = exporter.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder wrapper.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that has not installed its recorder yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder globally.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the recorder cannot be built or installed.
    /// An already installed recorder is not an error; [`render`](Self::render)
    /// then returns `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "slicestore_commits_total",
        "Total number of slice updates committed to a store"
    );
    describe_counter!(
        "slicestore_persist_writes_total",
        "Total number of snapshots written to storage"
    );
    describe_counter!(
        "slicestore_persist_failures_total",
        "Total number of failed snapshot reads and writes"
    );
    describe_counter!(
        "slicestore_rehydrations_total",
        "Total number of completed rehydrations"
    );
    describe_histogram!(
        "slicestore_persist_write_duration_seconds",
        "Time taken to encode and write a snapshot"
    );
}

/// Store commit metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a committed update to `slice`.
    pub fn record_commit(slice: &str) {
        counter!("slicestore_commits_total", "slice" => slice.to_string()).increment(1);
    }
}

/// Persistence metrics recorder.
pub struct PersistMetrics;

impl PersistMetrics {
    /// Record a snapshot write.
    pub fn record_write(duration: Duration) {
        counter!("slicestore_persist_writes_total").increment(1);
        histogram!("slicestore_persist_write_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed read or write.
    pub fn record_failure(operation: &'static str) {
        counter!("slicestore_persist_failures_total", "operation" => operation).increment(1);
    }

    /// Record a completed rehydration.
    pub fn record_rehydration() {
        counter!("slicestore_rehydrations_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn exporter_starts_without_handle() {
        let exporter = MetricsExporter::new();
        assert!(exporter.render().is_none());
    }

    #[test]
    fn exporter_renders_recorded_metrics() {
        let mut exporter = MetricsExporter::new();
        exporter.install().unwrap();

        StoreMetrics::record_commit("fish");
        PersistMetrics::record_write(Duration::from_millis(2));

        // Another test may have installed the recorder first; recording still works.
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("slicestore_commits_total"));
            assert!(rendered.contains("slicestore_persist_writes_total"));
        }
    }
}
