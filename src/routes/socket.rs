use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::feed::broadcaster::encode_frame;
use crate::feed::Broadcaster;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(upgrade))
}

async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Pushes every lifecycle event to one client until it goes away.
async fn handle_socket(socket: WebSocket, broadcaster: Broadcaster) {
    let mut events = broadcaster.subscribe();
    tracing::info!(
        "Client connected ({} listening)",
        broadcaster.client_count()
    );

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Client fell behind, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let frame = match encode_frame(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Failed to encode event for post {}: {}", event.post_id(), e);
                    continue;
                }
            };

            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames carry nothing; read only to notice the close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("Client disconnected");
}
