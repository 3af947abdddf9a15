// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::location_channel::{ChannelSettings, LocationChannel};
use crate::application::operator_service::OperatorService;
use crate::infrastructure::config::load_config;
use crate::infrastructure::socket_transport::SocketIoTransport;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    connection_status, current_location, health_check, publish_location, set_broadcast,
    stream_locations,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_config()?;

    // The one channel for this process; handlers share clones of it
    let channel = LocationChannel::new(
        Arc::new(SocketIoTransport),
        ChannelSettings {
            reconnect: config.reconnect.clone(),
            simulation: config.simulation.clone(),
        },
    );
    channel.connect(&config.server.endpoint, config.server.enable_simulation);

    let operator_service = OperatorService::new(channel.clone());
    if let Some(every) = config.operator.auto_publish_interval() {
        tokio::spawn(operator_service.clone().run_auto_publish(every));
    }

    let state = Arc::new(AppState {
        channel: channel.clone(),
        operator_service,
    });

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/status", get(connection_status))
        .route("/location", get(current_location).post(publish_location))
        .route("/location/stream", get(stream_locations))
        .route("/broadcast", post(set_broadcast))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.http.bind).await?;
    tracing::info!(addr = %config.http.bind, "location relay listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    channel.disconnect();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
