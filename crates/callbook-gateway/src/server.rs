//! Axum-based WebSocket and clip server.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use callbook_core::session::SessionId;

use crate::audio_store::AudioClip;
use crate::connection::handle_ws_connection;
use crate::state::GatewayState;

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/audio/hold", get(hold_handler))
        .route("/audio/{session}/{clip}", get(clip_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the configured address and serve until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state
        .config
        .gateway()
        .bind
        .unwrap_or_else(|| "0.0.0.0".to_string());

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    serve(state, listener, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    state: Arc<GatewayState>,
    listener: tokio::net::TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Gateway stopped");
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(state, socket))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let sessions = state.sessions.len().await;

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "sessions": sessions,
    }))
}

async fn hold_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match state.audio.hold_clip() {
        Some(clip) => audio_response(clip),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn clip_handler(
    State(state): State<Arc<GatewayState>>,
    Path((session, clip)): Path<(String, String)>,
) -> Response {
    let Some(session_id) = SessionId::parse(&session) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.audio.get(session_id, &clip).await {
        Some(clip) => audio_response(clip),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn audio_response(clip: AudioClip) -> Response {
    (
        [
            (header::CONTENT_TYPE, clip.content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        clip.data,
    )
        .into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
