use super::state::AppState;
use crate::protocol::ServerEvent;
use crate::session::{AdvisorSession, Inbound};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Events buffered for a client before the session waits on the socket
const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// GET /ws/audio
/// Upgrade to the session protocol
pub async fn ws_audio(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn to_inbound(message: Result<Message, axum::Error>) -> Option<Inbound> {
    match message {
        Ok(Message::Binary(frame)) => Some(Inbound::Binary(frame)),
        Ok(Message::Text(text)) => Some(Inbound::Text(text)),
        Ok(Message::Close(_)) => Some(Inbound::Close),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => {
            warn!("WebSocket receive error: {}", e);
            Some(Inbound::Close)
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE_DEPTH);

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize {} event: {}", event.kind(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        // Session finished: close our side
        let _ = sender.send(Message::Close(None)).await;
    });

    let session = AdvisorSession::new(session_id.clone(), state.deps.clone(), outbound_tx);
    state.register(&session_id, session.stats()).await;
    info!("WebSocket connected, session {}", session_id);

    let inbound = receiver.filter_map(|message| async move { to_inbound(message) });
    session.run(Box::pin(inbound)).await;

    state.unregister(&session_id).await;
    if let Err(e) = send_task.await {
        warn!("Socket writer for {} ended abnormally: {}", session_id, e);
    }
    info!("WebSocket closed, session {}", session_id);
}
