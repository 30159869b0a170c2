//! Real-time table synchronization for the live sheet dashboard.
//!
//! This crate:
//! - Accepts WebSocket connections from dashboard clients
//! - Tracks which connections watch which table ids
//! - Fans mutation notifications out to exactly the watchers of a table
//! - Reaps connections that stop answering liveness probes
//!
//! ## Architecture
//!
//! ```text
//! mutation handlers (table_service)
//!         ↓ broadcast(table_id, msg)
//! Hub (single-lock registry + router)
//!         ↓ per-connection channels
//! WebSocket clients
//! ```
//!
//! The hub's two maps (connection → tables, table → connections) are
//! mutated only together, under one lock, so a connection is in a
//! table's subscriber set exactly when the table is in the connection's
//! local set. Snapshot fetches never happen under that lock; broadcasts
//! serialize once and push through per-connection channels without
//! blocking.

pub mod client;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod ws;

pub use client::{ClientConn, ConnId};
pub use error::{GatewayError, Result};
pub use hub::{Hub, PROBE_INTERVAL};
pub use protocol::{ClientMessage, ServerMessage, TableUpdate};
pub use ws::create_router;
