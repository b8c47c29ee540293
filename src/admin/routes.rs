//! Minimal admin HTTP surface: liveness probe and a Prometheus scrape
//! endpoint. Everything actually consumer-facing (reporting APIs, alert
//! fan-out) lives outside this system (§1 out-of-scope).

use axum::{extract::State, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::admin::logging::request_logging;

#[derive(Clone)]
struct AdminState {
    prometheus: Arc<PrometheusHandle>,
}

pub fn router(prometheus: PrometheusHandle) -> Router {
    let state = AdminState {
        prometheus: Arc::new(prometheus),
    };

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "UP"
}

async fn metrics(State(state): State<AdminState>) -> String {
    state.prometheus.render()
}

pub async fn serve(bind_addr: &str, prometheus: PrometheusHandle) -> anyhow::Result<()> {
    let app = router(prometheus);
    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admin server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
