//! Quick subscription smoke test against a running server.
//!
//! Usage: cargo run -p gateway --example subscribe_smoke [ws://host:port/ws] [tableId]

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://localhost:8081/ws".to_string());
    let table_id: i64 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    println!("Connecting to {}...", url);
    let (mut ws, response) = match connect_async(&url).await {
        Ok(ok) => ok,
        Err(e) => {
            println!("Connection failed: {:?}", e);
            return;
        }
    };
    println!("Connected! Status: {:?}", response.status());

    let subscribe = format!(r#"{{"type":"subscribe","tableId":{}}}"#, table_id);
    println!("Sending: {}", subscribe);
    if let Err(e) = ws.send(Message::Text(subscribe.into())).await {
        println!("Send failed: {:?}", e);
        return;
    }

    println!("Listening for updates (Ctrl+C to stop)...");
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => println!("<- {}", text),
            Ok(Message::Ping(_)) => println!("<- ping"),
            Ok(Message::Close(frame)) => {
                println!("<- close: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                println!("WebSocket error: {:?}", e);
                break;
            }
        }
    }
}
