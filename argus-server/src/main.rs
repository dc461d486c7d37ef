// Argus - live object-detection demo server
// Launch and it's ready - zero configuration required

use argus_eye::{LiveController, SyntheticCameraProvider};
use argus_server::http::{create_router, ApiState, DetectorCell};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("Starting Argus...");

    let config = load_config();

    // Data directories for uploads and annotated outputs
    let images_dir = PathBuf::from(&config.data_dir).join("images");
    let outputs_dir = PathBuf::from(&config.data_dir).join("outputs");
    std::fs::create_dir_all(&images_dir)?;
    std::fs::create_dir_all(&outputs_dir)?;
    info!("Data directory ready at {}", config.data_dir);

    // The frame-source provider is the seam for real capture backends;
    // the synthetic camera keeps the demo runnable on any machine.
    let live = LiveController::new(Arc::new(SyntheticCameraProvider));

    let state = ApiState {
        live: live.clone(),
        detector: DetectorCell::new(),
        images_dir,
        outputs_dir,
    };
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);
    info!("Argus is ready! Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("Shutting down Argus...");
    live.stop();
    info!("Argus stopped. Goodbye!");
    Ok(())
}

/// Default configuration - everything works out of the box
struct ServerConfig {
    http_port: u16,
    data_dir: String,
}

fn load_config() -> ServerConfig {
    let http_port = std::env::var("ARGUS_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let data_dir =
        std::env::var("ARGUS_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    ServerConfig {
        http_port,
        data_dir,
    }
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
