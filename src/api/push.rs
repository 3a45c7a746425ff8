//! WebSocket push channel.
//!
//! Every connection registers one observer with the broadcaster and forwards its
//! notices as JSON text frames. The first frame is the replayed current state, if
//! the panel has reported one. Incoming frames are ignored apart from close.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::AppState;
use crate::broadcast::{BroadcasterHandle, Notice};

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state.broadcaster))
}

async fn handle_connection(socket: WebSocket, broadcaster: BroadcasterHandle) {
    let mut observer = match broadcaster.register().await {
        Ok(observer) => observer,
        Err(e) => {
            warn!("Refusing push connection: {}", e);
            return;
        }
    };
    let id = observer.id();
    info!("Push connection opened for observer {}", id);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            notice = observer.recv() => {
                let Some(notice) = notice else {
                    debug!("Observer {} dropped by broadcaster", id);
                    break;
                };
                let Some(frame) = encode(&notice) else { continue };
                if let Err(e) = sink.send(frame).await {
                    debug!("Push to observer {} failed: {}", id, e);
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("Push connection {} errored: {}", id, e);
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    info!("Push connection closed for observer {}", id);
}

fn encode(notice: &Notice) -> Option<Message> {
    match serde_json::to_string(notice) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            warn!("Could not encode notice: {}", e);
            None
        }
    }
}
