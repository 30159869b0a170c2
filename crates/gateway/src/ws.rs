//! WebSocket endpoint using Axum.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::client::ClientConn;
use crate::error::Result;
use crate::hub::Hub;
use crate::protocol::ClientMessage;

/// Create the WebSocket router.
pub fn create_router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(hub)
        .layer(CorsLayer::permissive())
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, hub))
}

/// Handle a WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outgoing messages flow through a channel so the hub never touches
    // the socket directly.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let conn = Arc::new(ClientConn::new(tx));
    let conn_id = conn.id;
    hub.register(conn.clone());

    counter!("gateway_connections_total").increment(1);
    gauge!("gateway_active_connections").set(hub.client_count() as f64);

    info!("Client {} connected", conn_id);

    // Forward queued messages to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            biased;

            // The sweeper decided this connection is dead.
            _ = conn.killed() => {
                break;
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        if let Err(e) = handle_message(&hub, &conn, msg) {
                            warn!("Error handling message from {}: {:?}", conn_id, e);
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {:?}", conn_id, e);
                        break;
                    }
                    None => {
                        // Connection closed.
                        break;
                    }
                }
            }
        }
    }

    // Both the explicit-close and forced-termination paths funnel here;
    // deregistration is idempotent either way.
    hub.deregister(conn_id);
    send_task.abort();

    counter!("gateway_disconnections_total").increment(1);
    gauge!("gateway_active_connections").set(hub.client_count() as f64);

    info!("Client {} disconnected", conn_id);
}

/// Handle a single WebSocket frame.
fn handle_message(hub: &Arc<Hub>, conn: &Arc<ClientConn>, msg: Message) -> Result<()> {
    match msg {
        Message::Text(text) => {
            handle_client_text(hub, conn, text.as_str());
            Ok(())
        }
        Message::Binary(data) => {
            if let Ok(text) = std::str::from_utf8(&data) {
                handle_client_text(hub, conn, text);
            }
            Ok(())
        }
        Message::Ping(data) => {
            hub.mark_alive(conn.id);
            conn.send_raw(Message::Pong(data))
        }
        Message::Pong(_) => {
            hub.mark_alive(conn.id);
            Ok(())
        }
        Message::Close(_) => {
            // Handled by the connection loop.
            Ok(())
        }
    }
}

/// Dispatch one parsed client message.
///
/// A frame that does not parse (unknown type, non-integer tableId) is
/// dropped without touching the connection: one misbehaving client must
/// never cost it its link.
fn handle_client_text(hub: &Arc<Hub>, conn: &Arc<ClientConn>, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { table_id }) => {
            debug!("Client {} subscribing to table {}", conn.id, table_id);
            hub.subscribe(conn.id, table_id);
        }
        Ok(ClientMessage::Unsubscribe { table_id }) => {
            debug!("Client {} unsubscribing from table {}", conn.id, table_id);
            hub.unsubscribe(conn.id, table_id);
        }
        Err(e) => {
            debug!("Ignoring malformed message from {}: {}", conn.id, e);
        }
    }
}
