//! Prometheus metrics

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::state::AppState;

/// Install the global Prometheus recorder
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        },
    }
}

/// Record one upstream call.
///
/// `endpoint` is `credential` or `signal`; `status` is `None` when the
/// provider could not be reached.
pub fn record_upstream_call(endpoint: &'static str, status: Option<u16>, latency: Duration) {
    match endpoint {
        "credential" => metrics::counter!("receptionist_credential_requests_total").increment(1),
        _ => metrics::counter!("receptionist_signaling_exchanges_total").increment(1),
    }

    metrics::histogram!("receptionist_upstream_latency_seconds", "endpoint" => endpoint)
        .record(latency.as_secs_f64());

    let failed = status.map_or(true, |s| !(200..300).contains(&s));
    if failed {
        let status = status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unreachable".to_string());
        metrics::counter!(
            "receptionist_upstream_failures_total",
            "endpoint" => endpoint,
            "status" => status
        )
        .increment(1);
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics disabled".to_string(),
        ),
    }
}
