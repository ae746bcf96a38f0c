//! HTTP API server with observability for the order-creation core.
//!
//! Exposes checkout, cancellation, order lookup, back-office status changes
//! and stock availability, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    AddressBook, CartStore, Collaborators, CouponDirectory, InMemoryAnalytics, InMemoryAuditLog,
    InMemoryNotifier, OrderOrchestrator, OrderRepository, TaskQueue, TaskWorker,
};
use domain::PricingEngine;
use inventory::InventoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L, R>(state: Arc<AppState<L, R>>, metrics_handle: PrometheusHandle) -> Router
where
    L: InventoryLedger + 'static,
    R: OrderRepository + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::orders::checkout::<L, R>))
        .route("/orders/{id}", get(routes::orders::get::<L, R>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<L, R>))
        .route("/orders/{id}/tracking", get(routes::orders::tracking::<L, R>))
        .route(
            "/orders/{id}/status",
            post(routes::orders::advance_status::<L, R>),
        )
        .route(
            "/inventory/{variant_id}/availability",
            get(routes::orders::availability::<L, R>),
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

/// Wires an orchestrator over `ledger` and `store` and spawns the outbound
/// task worker.
///
/// `store` serves addresses, carts and coupons as well as orders. The worker
/// exits once the returned state (and with it the task queue) is dropped.
pub fn create_state<L, S>(
    ledger: L,
    store: S,
    config: &Config,
) -> (Arc<AppState<L, S>>, JoinHandle<()>)
where
    L: InventoryLedger + 'static,
    S: OrderRepository + AddressBook + CartStore + CouponDirectory + Clone + 'static,
{
    let audit = InMemoryAuditLog::new();
    let (tasks, rx) = TaskQueue::channel();
    let worker = TaskWorker::new(
        rx,
        Arc::new(InMemoryNotifier::new()),
        Arc::new(audit.clone()),
        Arc::new(InMemoryAnalytics::new()),
    )
    .spawn();

    let collaborators = Collaborators {
        addresses: Arc::new(store.clone()),
        carts: Arc::new(store.clone()),
        coupons: Arc::new(store.clone()),
        audit: Arc::new(audit),
    };

    let orchestrator = OrderOrchestrator::new(ledger, store, collaborators, tasks)
        .with_pricing(PricingEngine::new(config.pricing))
        .with_reservation_timeout(config.reservation_timeout);

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
    });

    (state, worker)
}
