// WebSocket live view - Snapshot then render updates as JSON text frames
use crate::infrastructure::update_stream::{update_stream, StreamMessage};
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{ApiError, Authenticated};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

pub async fn websocket_handler(
    _auth: Authenticated,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let rx = state.sink.subscribe();
    tracing::debug!("Live view attached ({} viewers)", state.sink.viewer_count());
    let snapshot = state.dashboard.snapshot().await?;
    let updates = update_stream(snapshot, rx);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, updates)))
}

async fn handle_socket<S>(socket: WebSocket, updates: S)
where
    S: futures::Stream<Item = StreamMessage> + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        tokio::pin!(updates);
        while let Some(message) = updates.next().await {
            let json = match to_frame(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize live update: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Viewers only ever close; anything else they send is ignored
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
    tracing::debug!("Live view detached");
}

fn to_frame(message: &StreamMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}
