//! Text frame decoding and hand-off to the session driver

use crate::protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;

/// Parse one client frame and queue it for the driver.
/// Returns an immediate reply only when the frame could not be delivered.
pub fn handle_text(
    text: &str,
    inbound: &mpsc::UnboundedSender<ClientMessage>,
) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => {
            if inbound.send(msg).is_err() {
                tracing::error!("Session driver is gone");
                return Some(ServerMessage::error(
                    "SESSION_GONE",
                    "The session is no longer running",
                ));
            }
            None
        }
        Err(e) => {
            tracing::warn!("Failed to parse client message: {}", e);
            Some(ServerMessage::error(
                "PARSE_ERROR",
                format!("Invalid message format: {}", e),
            ))
        }
    }
}
