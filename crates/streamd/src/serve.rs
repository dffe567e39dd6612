//! HTTP(S) serving loop.

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use streamconf::StreamdConfig;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::bridge::AxumServer;
use crate::streamers::Streamers;
use crate::tls;

/// Time granted to in-flight streams after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Health check endpoint
async fn handle_health(server: AxumServer, start_time: Instant) -> Json<serde_json::Value> {
    let routes: Vec<String> = server.routes().iter().map(ToString::to_string).collect();

    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "routes": routes,
    }))
}

/// The full application: `/health` plus every route registered on `server`.
pub fn app(server: &AxumServer) -> Router {
    let start_time = Instant::now();
    let health_server = server.clone();

    Router::new()
        .route(
            "/health",
            get(move || handle_health(health_server.clone(), start_time)),
        )
        .merge(server.router())
        .layer(TraceLayer::new_for_http())
}

/// Run the streaming server until SIGINT/SIGTERM.
pub async fn run(config: StreamdConfig) -> Result<()> {
    info!("streamd starting");

    let server = AxumServer::new();
    // Routes live exactly as long as this binding.
    let streamers = Streamers::bind(&config, &server)?;
    if streamers.is_empty() {
        warn!("No [paths] configured; only /health will be served");
    }

    let app = app(&server);
    let addr: SocketAddr = config
        .bind
        .addr()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind.addr()))?;
    let scheme = if config.tls.enabled { "https" } else { "http" };

    for route in server.routes() {
        info!("   {} {}://{}{}", route.method, scheme, addr, route.path);
    }
    info!("   Health: GET {}://{}/health", scheme, addr);

    if config.tls.enabled {
        let rustls = tls::load_rustls_config(&config.tls).await?;
        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!("streamd ready (TLS) on {}", addr);
        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("Server error")?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!("streamd ready on {}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;
    }

    drop(streamers);
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
