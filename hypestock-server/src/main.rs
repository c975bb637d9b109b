use hypestock_server::dataset::Catalog;
use hypestock_server::routes::{self, AppState};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    info!("Starting HypeStock backend");

    // Configurable catalogue seed via DATASET_SEED env var (default: 42)
    let seed = std::env::var("DATASET_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(42);
    let catalog = Catalog::generate(seed);
    info!(
        "Generated catalogue of {} stocks (seed: {})",
        catalog.len(),
        seed
    );

    // Configurable via HYPESTOCK_ADDR env var (default: 0.0.0.0:8000)
    let addr_str =
        std::env::var("HYPESTOCK_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let addr = addr_str
        .parse::<SocketAddr>()
        .unwrap_or_else(|_| "0.0.0.0:8000".parse().expect("valid default address"));

    let app = routes::router(AppState::new(catalog));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind server address");
    info!("Backend listening on http://{} (realtime socket at /ws)", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("install ctrl-c handler");
    info!("Shutdown signal received, draining connections");
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
