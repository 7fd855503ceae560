//! WebSocket connection lifecycle: session setup, read/write loops, teardown.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use callbook_core::protocol::ServerMessage;
use callbook_core::session::SessionId;

use crate::state::GatewayState;

/// Handle one conversation from accept to close.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket) {
    let session_id = SessionId::new();
    let session = state.sessions.get_or_create(session_id).await;
    info!(session_id = %session_id, "Conversation connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (turn_tx, mut turn_rx) = mpsc::unbounded_channel::<String>();
    let cancel = CancellationToken::new();

    // Writer: protocol messages leave in the order they were queued.
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Turn worker: one transcript at a time.
    let pipeline = state.pipeline.clone();
    let worker_cancel = cancel.clone();
    let worker = tokio::spawn(async move {
        loop {
            let transcript = tokio::select! {
                _ = worker_cancel.cancelled() => break,
                next = turn_rx.recv() => match next {
                    Some(transcript) => transcript,
                    None => break,
                },
            };
            tokio::select! {
                _ = worker_cancel.cancelled() => {
                    debug!(session_id = %session_id, "Connection closed mid-turn, abandoning turn");
                    break;
                }
                outcome = pipeline.run_turn(&session, &transcript, &out_tx) => {
                    debug!(session_id = %session_id, ?outcome, "Turn outcome");
                }
            }
        }
    });

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let transcript = text.as_str().trim();
                if transcript.is_empty() {
                    debug!(session_id = %session_id, "Ignoring empty transcript");
                    continue;
                }
                debug!(session_id = %session_id, %transcript, "Transcript received");
                if turn_tx.send(transcript.to_string()).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(session_id = %session_id, "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => {
                debug!(session_id = %session_id, "Client requested close");
                break;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "WebSocket error, ending session");
                break;
            }
            // Axum answers pings itself.
            _ => {}
        }
    }

    cancel.cancel();
    let _ = worker.await;
    send_task.abort();
    cleanup_session(&state, session_id).await;
    info!(session_id = %session_id, "Conversation closed");
}

async fn cleanup_session(state: &GatewayState, session_id: SessionId) {
    state.sessions.remove(session_id).await;
    state.audio.remove_session(session_id).await;
}
