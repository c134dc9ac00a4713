//! HTTP API server for the order fulfillment system.
//!
//! Thin axum layer over the `services` crate: identity comes from the
//! `X-User-Id` header, errors map to status codes in `error`, and
//! observability is structured logging plus Prometheus metrics behind
//! `/metrics`.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::SystemClock;
use metrics_exporter_prometheus::PrometheusHandle;
use services::{InMemoryCatalog, Services, SettlementWorker, StubGateway};
use store::Backend;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
pub struct AppState {
    pub services: Services,
}

/// Creates the axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/inventory", post(routes::inventory::initialize))
        .route("/inventory/{product_id}/stock", post(routes::inventory::add_stock))
        .route("/inventory/{product_id}", get(routes::inventory::get))
        .route("/orders", post(routes::orders::create))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/complete", post(routes::orders::complete))
        .route("/payments", post(routes::payments::process))
        .route("/payments", get(routes::payments::list))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/refunds", post(routes::refunds::create))
        .route("/refunds", get(routes::refunds::list))
        .route("/refunds/{id}", get(routes::refunds::get))
        .route("/admin/refunds", get(routes::refunds::list_by_status))
        .route("/admin/refunds/{id}/approve", post(routes::refunds::approve))
        .route("/admin/refunds/{id}/reject", post(routes::refunds::reject))
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

/// Wires the default application state over the given backend.
///
/// The catalog and settlement gateway are the in-process stubs — real
/// deployments swap in their own collaborators here. Returns the
/// settlement worker for the caller to spawn (or drain, in tests).
pub fn create_default_state(backend: Backend) -> (Arc<AppState>, InMemoryCatalog, SettlementWorker) {
    let catalog = InMemoryCatalog::new();
    let gateway = StubGateway::new();
    let (services, worker) = Services::new(
        backend,
        Arc::new(catalog.clone()),
        Arc::new(gateway),
        Arc::new(SystemClock),
    );
    (Arc::new(AppState { services }), catalog, worker)
}
