use axum::{routing::get, serve, Router};
use clap::Parser;
use nodeflow::api;
use nodeflow::config::{Cli, Config};
use nodeflow_core::events::EventBus;
use nodeflow_core::storage::RecordStore;
use nodeflow_core::TreeController;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load(Cli::parse())?;
    let store = RecordStore::open(config.data_path.clone())?;
    let tree = store.to_tree()?;
    info!(items = tree.len(), path = %config.data_path.display(), "records loaded");

    let store = Arc::new(RwLock::new(store));
    let controller = TreeController::new(tree, store.clone(), EventBus::new());
    let app = Router::new()
        .merge(api::router(controller, store))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(config.addr).await?;
    info!("Listening on {}", config.addr);
    serve(listener, app.into_make_service()).await?;
    Ok(())
}
