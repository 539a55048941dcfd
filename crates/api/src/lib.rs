//! HTTP API server with observability for the allocation service.
//!
//! Provides REST endpoints for batches and allocations, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use service::{MessageBus, NotificationSender};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub bus: MessageBus<S::UnitOfWork>,
}

impl<S: Store> AppState<S> {
    /// Creates the state with the default allocation handlers.
    pub fn new(
        store: S,
        sender: Arc<dyn NotificationSender>,
        out_of_stock_address: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bus: MessageBus::with_default_handlers(sender, out_of_stock_address),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/batches", post(routes::batches::add::<S>))
        .route(
            "/batches/{reference}",
            patch(routes::batches::change_quantity::<S>),
        )
        .route(
            "/allocations",
            post(routes::allocations::allocate::<S>).delete(routes::allocations::deallocate::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
