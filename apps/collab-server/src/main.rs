//! Collaborative diagram editing server: hosts the WebSocket transport
//! and the hub's background cleanup sweep.
mod auth;
mod cli;
mod permission;
mod state;
mod store;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use collab_core::Hub;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::HeaderAuthProvider;
use crate::cli::Cli;
use crate::permission::StaticPermissionProvider;
use crate::state::AppState;
use crate::store::InMemoryDiagramStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("collab_server=debug,collab_core=debug,tower_http=debug")
        .init();

    let cli = Cli::parse();
    let bind_addr = cli.bind_addr.clone();
    let config = cli.into_config();

    let store = Arc::new(InMemoryDiagramStore::new());
    let hub = Hub::new(store, config.clone());

    let state = AppState {
        hub: hub.clone(),
        auth: Arc::new(HeaderAuthProvider),
        permissions: Arc::new(StaticPermissionProvider { force_reader: false }),
        config: config.clone(),
    };

    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let app = Router::new()
        .route(
            "/threat_models/:threat_model_id/diagrams/:diagram_id/ws",
            get(ws::ws_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tokio::spawn(cleanup_loop(hub, config.cleanup_interval_seconds));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("collaboration server listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Drives the hub's idle sweep on a fixed interval.
async fn cleanup_loop(hub: Hub, interval_seconds: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        interval.tick().await;
        hub.sweep().await;
    }
}
