use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use chat_relay::config::{generate_config_template, Config};
use chat_relay::state::AppState;
use chat_relay::ws::{broadcast, ConnectionRegistry};
use chat_relay::routes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter()).init();
    }

    tracing::info!("Chat relay v{} starting", env!("CARGO_PKG_VERSION"));

    let app_state = AppState::new(config.ws.clone());
    let connections = app_state.connections.clone();

    let ws_path = config.normalized_ws_path();
    let app = routes::build_router(app_state, &ws_path);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {} (WebSocket at {})", addr, ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(connections))
        .await?;

    tracing::info!("Chat relay stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then ask every client to disconnect.
async fn shutdown_signal(connections: std::sync::Arc<ConnectionRegistry>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(
        online = connections.count(),
        "Shutdown requested, closing client connections"
    );
    broadcast::close_all(&connections, 1001, "Server shutting down");
}
