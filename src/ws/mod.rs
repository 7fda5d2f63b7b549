pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;

use crate::driver;
use crate::protocol::ServerMessage;
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            None
        }
    }
}

/// One connection plays one session at a time through its own driver
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    if let Some(welcome) = encode(&ServerMessage::welcome()) {
        if sender.send(welcome).await.is_err() {
            tracing::error!("Failed to send welcome message");
            return;
        }
    }

    let driver::DriverHandle {
        inbound,
        mut outbound,
        task,
    } = driver::spawn(state, None);

    loop {
        tokio::select! {
            server_msg = outbound.recv() => {
                let Some(msg) = server_msg else { break };
                if let Some(frame) = encode(&msg) {
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);
                        if let Some(reply) = handlers::handle_text(&text, &inbound) {
                            if let Some(frame) = encode(&reply) {
                                if sender.send(frame).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Closing the inbound channel stops the driver, which abandons the session
    drop(inbound);
    if let Err(e) = task.await {
        tracing::warn!("Session driver ended abnormally: {}", e);
    }
    tracing::info!("WebSocket connection closed");
}
