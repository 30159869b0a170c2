//! HTTP API handlers and routes using axum.
//!
//! Routes:
//! - POST /auth/register - Create an account
//! - POST /auth/login - Open a session
//! - GET  /health - Health check
//! - GET  /tables - List the caller's tables
//! - POST /tables - Register a table
//! - GET  /tables/{id} - Get a table record
//! - PUT  /tables/{id} - Update name/source URL
//! - DELETE /tables/{id} - Delete a table
//! - GET  /tables/{id}/data - Fetched rows plus custom-column overlay
//! - POST /tables/{id}/refresh - Resync from the external source
//! - POST /tables/{id}/columns - Add a custom column
//! - PUT  /tables/{id}/columns/{columnId}/values - Enter a cell value
//! - GET  /ws - Real-time updates (gateway)
//!
//! Only store errors fail a request. Broadcasts and refetches run after
//! the write and are best-effort.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use common::{CustomColumn, SheetSnapshot, SheetTable, TableId};
use gateway::Hub;
use serde::{Deserialize, Serialize};
use sheet_client::SheetClient;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{login_handler, register_handler, CurrentUser};
use crate::bridge::UpdateBridge;
use crate::store::{StoreError, TablePatch, TableStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: TableStore,
    pub sheets: SheetClient,
    pub hub: Arc<Hub>,
    pub bridge: UpdateBridge,
}

/// Create the API router, with the WebSocket endpoint merged in.
pub fn create_router(state: AppState) -> Router {
    let hub = state.hub.clone();
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/tables", get(list_tables_handler).post(create_table_handler))
        .route(
            "/tables/{id}",
            get(get_table_handler)
                .put(update_table_handler)
                .delete(delete_table_handler),
        )
        .route("/tables/{id}/data", get(table_data_handler))
        .route("/tables/{id}/refresh", post(refresh_table_handler))
        .route("/tables/{id}/columns", post(add_column_handler))
        .route(
            "/tables/{id}/columns/{column_id}/values",
            put(set_column_value_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
        .merge(gateway::create_router(hub))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    clients: usize,
    subscriptions: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTableRequest {
    name: String,
    source_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTableRequest {
    name: Option<String>,
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddColumnRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetValueRequest {
    row_index: usize,
    value: String,
}

/// Fetched rows plus the custom-column overlay for one table.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableDataResponse {
    table: SheetTable,
    snapshot: SheetSnapshot,
    columns: Vec<CustomColumn>,
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        clients: state.hub.client_count(),
        subscriptions: state.hub.subscription_count(),
    })
}

/// GET /tables
async fn list_tables_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    Json(state.store.list_tables(user.id))
}

/// POST /tables
async fn create_table_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateTableRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("table name is required".to_string()));
    }
    if req.source_url.trim().is_empty() {
        return Err(ApiError::Validation("source URL is required".to_string()));
    }

    let table = state.store.create_table(user.id, &req.name, &req.source_url);
    Ok((StatusCode::CREATED, Json(table)))
}

/// GET /tables/{id}
async fn get_table_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TableId>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.store.get_table_owned(id, user.id)?;
    Ok(Json(table))
}

/// GET /tables/{id}/data
async fn table_data_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TableId>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.store.get_table_owned(id, user.id)?;
    let snapshot = state.sheets.fetch_snapshot(&table.source_url).await;
    let columns = state.store.get_custom_columns(table.id);
    Ok(Json(TableDataResponse {
        table,
        snapshot,
        columns,
    }))
}

/// PUT /tables/{id}
async fn update_table_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TableId>,
    Json(req): Json<UpdateTableRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.store.update_table(
        id,
        user.id,
        TablePatch {
            name: req.name,
            source_url: req.source_url,
        },
    )?;

    state.bridge.table_updated(&table);
    Ok(Json(table))
}

/// DELETE /tables/{id}
async fn delete_table_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TableId>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_table(id, user.id)?;

    state.bridge.table_deleted(id);
    Ok(Json(DeletedResponse { deleted: true }))
}

/// POST /tables/{id}/refresh
async fn refresh_table_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TableId>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.store.get_table_owned(id, user.id)?;
    let snapshot = state.sheets.fetch_snapshot(&table.source_url).await;
    let columns = state.store.get_custom_columns(table.id);

    state.bridge.data_refreshed(&table, &columns, &snapshot);
    Ok(Json(TableDataResponse {
        table,
        snapshot,
        columns,
    }))
}

/// POST /tables/{id}/columns
async fn add_column_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TableId>,
    Json(req): Json<AddColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("column name is required".to_string()));
    }

    let table = state.store.get_table_owned(id, user.id)?;
    let column = state.store.add_column(table.id, &req.name);

    state.bridge.column_added(&table, &column).await;
    Ok((StatusCode::CREATED, Json(column)))
}

/// PUT /tables/{id}/columns/{column_id}/values
async fn set_column_value_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((id, column_id)): Path<(TableId, i64)>,
    Json(req): Json<SetValueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.store.get_table_owned(id, user.id)?;
    let column = state.store.get_column(column_id)?;
    if column.table_id != table.id {
        return Err(StoreError::NotFound("column").into());
    }

    let saved = state
        .store
        .set_column_value(column_id, req.row_index, &req.value)?;

    state.bridge.column_value_updated(&table, &saved).await;
    Ok(Json(saved))
}

// ============================================================================
// Error Handling
// ============================================================================

/// API error types, mapped onto status codes.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Forbidden(String),
    Unauthorized(String),
    Conflict(String),
    Validation(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::Forbidden => ApiError::Forbidden(e.to_string()),
            StoreError::EmailTaken => ApiError::Conflict(e.to_string()),
            StoreError::InvalidCredentials | StoreError::InvalidToken => {
                ApiError::Unauthorized(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::NotFound("table"), StatusCode::NOT_FOUND),
            (StoreError::Forbidden, StatusCode::FORBIDDEN),
            (StoreError::EmailTaken, StatusCode::CONFLICT),
            (StoreError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (StoreError::InvalidToken, StatusCode::UNAUTHORIZED),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
