//! API server entry point.

use api::config::{Config, LogFormat};
use api::seed::SeedData;
use checkout::{InMemoryStore, PostgresStore};
use inventory::{InMemoryInventoryLedger, PostgresInventoryLedger};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build stores, orchestrator and the outbound task worker
    let (app, worker) = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(16)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");

            let store = PostgresStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            if config.seed_file.is_some() {
                tracing::warn!("SEED_FILE is ignored when DATABASE_URL is set");
            }
            tracing::info!("using PostgreSQL stores");

            let ledger = PostgresInventoryLedger::new(pool);
            let (state, worker) = api::create_state(ledger, store, &config);
            (api::create_app(state, metrics_handle), worker)
        }
        None => {
            let ledger = InMemoryInventoryLedger::new();
            let store = InMemoryStore::new();

            if let Some(path) = &config.seed_file {
                let summary = SeedData::from_file(path)
                    .expect("failed to read seed file")
                    .apply(&ledger, &store)
                    .await
                    .expect("failed to apply seed file");
                tracing::info!(
                    path = %path.display(),
                    variants = summary.variants,
                    addresses = summary.addresses,
                    coupons = summary.coupons,
                    cart_lines = summary.cart_lines,
                    "loaded seed data"
                );
            }
            tracing::info!("using in-memory stores");

            let (state, worker) = api::create_state(ledger, store, &config);
            (api::create_app(state, metrics_handle), worker)
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // The router owned the last task queue handle; wait for queued tasks.
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "outbound task worker panicked");
    }

    tracing::info!("server shut down gracefully");
}
