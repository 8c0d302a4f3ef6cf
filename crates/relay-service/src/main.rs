//! Room Relay
//!
//! WebSocket server for room presence, chat and peer-connection signaling.
//!
//! # Endpoints
//!
//! A single HTTP listener (default: 0.0.0.0:5000) serves:
//! - `GET /ws` and `GET /rooms/:room_id/ws` - relay channels
//! - `GET /health`, `GET /ready` - liveness and readiness probes
//! - `GET /metrics` - Prometheus text format
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`RoomControllerActorHandle`)
//! 4. Bind the listener and start serving
//! 5. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_service::actors::{ActorMetrics, RoomControllerActorHandle};
use relay_service::config::Config;
use relay_service::observability::metrics::init_metrics_recorder;
use relay_service::observability::{health_router, metrics_router, HealthState};
use relay_service::transport::{cors_layer, relay_router, AppState};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time allowed for rooms to close their channels on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Relay");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        default_room = %config.default_room,
        allowed_origin = %config.allowed_origin,
        channel_buffer = config.channel_buffer,
        ping_interval_secs = config.ping_interval.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        max_participants_per_room = config.max_participants_per_room,
        "Configuration loaded successfully"
    );

    // This must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let controller_handle =
        RoomControllerActorHandle::new(config.max_participants_per_room, actor_metrics);
    info!("Actor system initialized");

    // Cancelled together with the controller
    let shutdown_token = controller_handle.child_token();

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let cors = cors_layer(&config.allowed_origin).map_err(|e| {
        error!(error = %e, "Invalid CORS origin");
        e
    })?;

    let state = AppState {
        controller: controller_handle.clone(),
        config: Arc::new(config),
    };

    let app = relay_router(state)
        .merge(health_router(Arc::clone(&health_state)))
        .merge(metrics_router(prometheus_handle))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind relay server");
        format!("Failed to bind relay server to {addr}: {e}")
    })?;
    info!(addr = %addr, "Relay server bound successfully");

    let server_token = shutdown_token.clone();
    let server_task = tokio::spawn(async move {
        info!(addr = %addr, "Relay server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_token.cancelled().await;
            info!("Relay server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Relay server failed");
        }
    });

    health_state.set_ready();
    info!("Room Relay running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Closes every room and channel, which lets the server drain
    if let Err(e) = controller_handle.shutdown(SHUTDOWN_DEADLINE).await {
        warn!(error = %e, "Actor system shutdown error");
    }

    match tokio::time::timeout(SHUTDOWN_DEADLINE, server_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = ?e, "Relay server task failed"),
        Err(_) => warn!(
            timeout_secs = SHUTDOWN_DEADLINE.as_secs(),
            "Relay server did not drain in time"
        ),
    }

    info!("Room Relay shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
