//! HTTP server wiring: shared state, routes, startup and shutdown

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use watchparty_core::{HubHandle, SyncHub};

use crate::config::Config;
use crate::handlers;
use crate::lan;
use crate::metrics::{self, LogLevel, Metrics};
use crate::tunnel::{spawn_tunnel, NgrokTunnel, TunnelStatus};
use crate::ws;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub media_path: Arc<RwLock<Option<PathBuf>>>,
    pub tunnel: Arc<RwLock<TunnelStatus>>,
    pub metrics: Arc<RwLock<Metrics>>,
    pub lan_ips: Vec<Ipv4Addr>,
    pub port: u16,
}

impl AppState {
    pub fn new(hub: HubHandle, media_path: Option<PathBuf>, port: u16) -> Self {
        Self {
            hub,
            media_path: Arc::new(RwLock::new(media_path)),
            tunnel: Arc::new(RwLock::new(TunnelStatus::NoToken)),
            metrics: Arc::new(RwLock::new(Metrics::new())),
            lan_ips: Vec::new(),
            port,
        }
    }
}

/// Build the application router
pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/video", get(handlers::stream_video))
        .route("/video-info", get(handlers::video_info))
        .route("/public-url", get(handlers::public_url))
        .route("/lan-url", get(handlers::lan_url))
        .route("/stats", get(handlers::stats))
        .route("/admin/video-path", post(handlers::set_video_path))
        .route("/ws", get(ws::ws_handler));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until Ctrl+C
pub async fn run(config: Config) -> anyhow::Result<()> {
    let (hub, hub_events) = SyncHub::new().start();

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;
    let port = listener.local_addr()?.port();

    let mut state = AppState::new(hub.clone(), config.video_path.clone(), port);
    state.lan_ips = lan::detect_lan_ips();
    tokio::spawn(metrics::track_hub_events(hub_events, Arc::clone(&state.metrics)));

    match &config.video_path {
        Some(path) if path.is_file() => info!("Video: {}", path.display()),
        Some(path) => warn!("Video not found: {}", path.display()),
        None => info!("No video configured yet"),
    }

    info!("Server listening on http://localhost:{}", port);
    for url in lan::lan_urls(&state.lan_ips, port) {
        info!("LAN access: {}", url);
    }

    let tunnel = config.tunnel_token().map(|token| {
        Arc::new(NgrokTunnel::new(
            token,
            config.ngrok_bin.clone(),
            config.ngrok_api_url.clone(),
        ))
    });
    match &tunnel {
        Some(tunnel) => spawn_tunnel(Arc::clone(tunnel), port, Arc::clone(&state.tunnel)),
        None => info!("No ngrok token set, public tunnel disabled"),
    }

    state
        .metrics
        .write()
        .log(LogLevel::Info, format!("Server started on port {}", port));

    let app = router(state, config.static_dir.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutting down");
    if let Some(tunnel) = tunnel {
        tunnel.stop();
    }
    hub.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
