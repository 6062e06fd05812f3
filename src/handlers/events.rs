//! Live event channel
//!
//! One persistent WebSocket per observer. Push-only: each queued decision
//! event is forwarded as a text frame; inbound frames are treated as
//! keep-alives and ignored until the peer closes.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::AppState;

pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| observer_loop(socket, state))
}

async fn observer_loop(socket: WebSocket, state: AppState) {
    let (id, mut events) = state.broadcaster.register();
    let (mut outbound, mut inbound) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if outbound.send(Message::Text(event)).await.is_err() {
                    break;
                }
            }
            frame = inbound.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Keep-alive chatter from the dashboard
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broadcaster.unregister(id);
}
