//! Per-connection state.
//!
//! A [`ClientConn`] is the handle the hub keeps for one live WebSocket.
//! Sends go through an unbounded channel to the connection's socket task
//! and never block the caller.

use axum::extract::ws::Message;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::protocol::ServerMessage;

/// Unique connection identifier. Never reused.
pub type ConnId = Uuid;

/// Handle for a single connected client.
pub struct ClientConn {
    /// Unique connection identifier.
    pub id: ConnId,
    /// Channel to the connection's socket task.
    tx: mpsc::UnboundedSender<Message>,
    /// Wakes the socket task when the hub force-terminates the connection.
    kill: Notify,
    /// Timestamp when the client connected (epoch millis).
    pub connected_at: i64,
}

impl ClientConn {
    /// Create a connection handle around an outbound channel.
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            kill: Notify::new(),
            connected_at: Utc::now().timestamp_millis(),
        }
    }

    /// Serialize and send a protocol message to this client.
    pub fn send(&self, msg: &ServerMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.send_raw(Message::Text(json.into()))
    }

    /// Send a raw frame to this client.
    pub fn send_raw(&self, msg: Message) -> Result<()> {
        self.tx.send(msg).map_err(|_| GatewayError::ChannelSend)
    }

    /// Whether the socket task is still receiving.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Force-terminate: queue a Close frame and wake the socket task.
    pub fn close(&self) {
        let _ = self.send_raw(Message::Close(None));
        self.kill.notify_one();
    }

    /// Resolves when [`close`](Self::close) has been called.
    pub async fn killed(&self) {
        self.kill.notified().await;
    }
}
