//! Ambient observability wiring: tracing subscriber and the Prometheus
//! recorder installation. No metric names are defined here beyond what the
//! exporter needs globally — individual components record their own
//! counters/histograms inline (see `stream::processor`).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fraudguard_backend=info".into()))
        .with(fmt::layer())
        .init();
}

/// Installs the global Prometheus recorder so the `metrics::counter!`/
/// `histogram!` macros used throughout the pipeline actually record
/// somewhere, and returns the handle the admin `/metrics` route renders.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}
