//! Table service library.
//!
//! The HTTP side of the live sheet dashboard: account registration and
//! login, table/column/value CRUD, on-demand document fetching with the
//! custom-column overlay, and the bridge that turns every committed
//! mutation into a real-time broadcast through the gateway.

pub mod api;
pub mod auth;
pub mod bridge;
pub mod store;

pub use api::{create_router, ApiError, AppState};
pub use auth::CurrentUser;
pub use bridge::UpdateBridge;
pub use store::{StoreError, TablePatch, TableStore};
