use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

/// DocMan REST backend.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Settings file (yaml, toml or json). Defaults to `./docman.*` if present.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docman=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting DocMan server...");

    let settings = docman::config::Settings::load(args.config.as_deref())?;
    docman::api::errors::expose_error_details(!settings.server.production);

    // Connect to MongoDB
    let mongo_uri = settings.mongo.connection_uri()?;
    let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
        .await
        .context("Failed to connect to MongoDB")?;
    let mongo_db = mongo_client.database(&settings.mongo.database);
    tracing::info!(
        host = %settings.mongo.host,
        database = %settings.mongo.database,
        "Connected to MongoDB"
    );

    let storage_client = docman::app::storage_from_settings(&settings).await;
    tracing::info!(backend = ?settings.storage.backend, "Storage client initialized");

    let app_state = docman::app::AppState::connect(&mongo_db, storage_client, &settings).await?;
    let app = docman::app::router(app_state, &settings.server, &settings.rate_limit);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind))?;
    tracing::info!("Listening on http://{}", settings.server.bind);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
