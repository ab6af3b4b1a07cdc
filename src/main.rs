// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::application::dashboard_service::DashboardService;
use crate::application::settings::SettingsService;
use crate::domain::channel::TopicRegistry;
use crate::infrastructure::broadcast_sink::BroadcastSink;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::logging::init_tracing;
use crate::infrastructure::mqtt_transport::RumqttTransport;
use crate::infrastructure::settings_store::JsonFileSettingsStore;
use crate::presentation::app_state::{AppState, LoginSession};
use crate::presentation::handlers;
use crate::presentation::websocket::websocket_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_app_config()?;
    init_tracing(&config.logging)?;

    // Persistent settings (infrastructure layer)
    let store = JsonFileSettingsStore::open(&config.settings.path)
        .with_context(|| format!("opening settings at {}", config.settings.path.display()))?;
    let settings = SettingsService::new(Arc::new(store), config.broker.to_settings());

    // Dashboard session actor (application layer)
    let sink = BroadcastSink::new();
    let (service, dashboard) = DashboardService::new(
        TopicRegistry::standard(),
        Arc::new(RumqttTransport::new()),
        settings.clone(),
        Arc::new(sink.clone()),
        config.dashboard.auto_refresh_interval(),
    );
    service.spawn();

    let state = Arc::new(AppState {
        dashboard,
        settings,
        sink,
        login: config.login.clone(),
        auto_connect: config.dashboard.auto_connect,
        sessions: LoginSession::default(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/connect", post(handlers::connect))
        .route("/disconnect", post(handlers::disconnect))
        .route("/refresh", post(handlers::refresh))
        .route("/test-data", post(handlers::send_test_data))
        .route("/messages", delete(handlers::clear_messages))
        .route("/messages/pause", post(handlers::pause_messages))
        .route("/messages/resume", post(handlers::resume_messages))
        .route("/messages/toggle", post(handlers::toggle_messages))
        .route("/charts", delete(handlers::clear_charts))
        .route("/charts/export", get(handlers::export_charts))
        .route("/charts/import", post(handlers::import_charts))
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/status", get(handlers::get_status))
        .route("/updates", get(handlers::stream_updates))
        .route("/ws", get(websocket_handler))
        .route(
            "/settings/connection",
            get(handlers::get_connection_settings)
                .put(handlers::put_connection_settings)
                .delete(handlers::reset_connection_settings),
        )
        .route(
            "/settings/appearance",
            get(handlers::get_appearance).put(handlers::put_appearance),
        )
        .route("/settings/auto-refresh", put(handlers::put_auto_refresh))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    tracing::info!("Starting heatpump-dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received SIGINT, shutting down...");
}
