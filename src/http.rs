use once_cell::sync::Lazy;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use axum::extract::State;
use axum::http::{self, Response, StatusCode};
use axum::{response::IntoResponse, routing::get, Router};
use axum_prometheus::{metrics_exporter_prometheus::PrometheusHandle, PrometheusMetricLayer};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::{live, metrics};

// The exporter installs a process-wide recorder, so the pair is built once.
static PROMETHEUS: Lazy<(PrometheusMetricLayer<'static>, PrometheusHandle)> =
    Lazy::new(PrometheusMetricLayer::pair);

pub fn router(state: AppState) -> Router {
    let (prom_layer, prom_handle) = PROMETHEUS.clone();

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/events", get(live::events))
        .route(
            "/metrics",
            get(move || async move { format!("{}{}", prom_handle.render(), metrics::render()) }),
        )
        .with_state(state)
        .layer(prom_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &http::Request<_>| {
                    tracing::info_span!(
                      "http_request",
                      method = %req.method(),
                      path = %req.uri().path(),
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::debug!(
                      status = %res.status(),
                      latency_ms = %latency.as_millis(),
                      "response"
                    )
                })
                .on_failure(|_error: _, latency: Duration, _span: &Span| {
                    tracing::warn!(latency_ms = %latency.as_millis(), "request_failed");
                }),
        )
}

/// Serves until `shutdown` fires, then lets open requests finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn readyz(State(st): State<AppState>) -> impl IntoResponse {
    if st.ready.is_ready(&st.cfg.health) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
