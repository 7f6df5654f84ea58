use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, future};

use super::api::SharedState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Bridge a websocket into the hub as text in both directions.
///
/// A close frame ends the inbound side; binary, ping and pong frames are
/// not part of the feed.
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (sender, receiver) = socket.split();
    let outbound = sender.with(|text: String| {
        future::ready(Ok::<_, axum::Error>(Message::Text(text.into())))
    });
    let inbound = receiver
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_string())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });

    tracing::debug!("websocket subscriber connected");
    state.hub.accept_connection(outbound, inbound).await;
}
