use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use ark_gateway::config::{Cli, Config};
use ark_gateway::rpc::GrpcBackend;
use ark_gateway::server::openai_api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "ark_gateway=debug,tower_http=debug"
    } else {
        "ark_gateway=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("ark-gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; flags and environment win over the file.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);
    let config = Arc::new(config);

    info!(
        hosts = ?config.backend.hosts(),
        port = config.backend.grpc_port,
        message_encoding = ?config.compat.message_encoding,
        sse_framing = ?config.compat.sse_framing,
        "Configuration loaded"
    );

    let backend = Arc::new(GrpcBackend::from_config(&config.backend));
    let state = Arc::new(AppState::new(backend, config.clone()));

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
