//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Registers descriptions for the metrics recorded by the allocation service.
pub fn describe() {
    metrics::describe_counter!("allocations_total", "Order lines allocated to a batch");
    metrics::describe_counter!("out_of_stock_total", "Allocations that found no batch");
    metrics::describe_counter!(
        "bus_events_handled_total",
        "Events dispatched by the message bus, by event type"
    );
    metrics::describe_counter!("uow_commits_total", "Committed unit-of-work scopes");
    metrics::describe_counter!("uow_rollbacks_total", "Rolled back unit-of-work scopes");
    metrics::describe_counter!(
        "uow_conflicts_total",
        "Commits rejected by the product version check"
    );
    metrics::describe_histogram!(
        "bus_handle_duration_seconds",
        metrics::Unit::Seconds,
        "Time to drain the message bus queue for one request"
    );
}

/// GET /metrics — returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_TEXT)], handle.render())
}
