//! Prometheus metrics exposition (§6 `/metrics`, §10.1).
//!
//! `init_metrics` installs the recorder once at startup; `record_request` is
//! called from the HTTP surface's request-logging layer for every response.
//! The turn pipeline records its own stage latencies/errors directly through
//! the `metrics` crate's global recorder (same facade, no dependency on this
//! crate). `serve_metrics` renders whatever has been recorded so far for the
//! `/metrics` scrape.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the Prometheus recorder. Idempotent: a second call (e.g. in
/// tests that build more than one `AppState`) is a no-op and returns the
/// handle installed by the first call.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle.clone());
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle.clone());
            Some(handle)
        }
        Err(error) => {
            tracing::warn!(%error, "failed to install prometheus recorder, /metrics will be empty");
            None
        }
    }
}

pub async fn serve_metrics() -> impl IntoResponse {
    match HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], String::new())
            .into_response(),
    }
}

/// Counts one HTTP request against `route`, labelled with the response
/// status code.
pub fn record_request(route: &str, status: u16) {
    counter!("voice_http_requests_total", "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
}
