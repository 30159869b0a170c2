//! In-memory keyed storage using DashMap.
//!
//! Holds users, sessions, registered tables, custom columns, and entered
//! cell values. Cloneable handle over a shared inner; per-entry atomicity
//! from DashMap is enough here since no invariant spans two maps.
//!
//! Store errors are the only errors that abort a mutation: everything
//! downstream of a successful write (broadcast, external refetch) is
//! best-effort and must not fail the request.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use common::{ColumnValue, CustomColumn, SheetTable, TableId, User, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not the owner of this table")]
    Forbidden,

    #[error("email is already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid session token")]
    InvalidToken,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Fields of a table that can be patched by its owner.
#[derive(Debug, Default, Clone)]
pub struct TablePatch {
    pub name: Option<String>,
    pub source_url: Option<String>,
}

/// Shared in-memory store for all request handlers.
#[derive(Debug, Clone)]
pub struct TableStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    users: DashMap<UserId, User>,
    users_by_email: DashMap<String, UserId>,
    /// token -> user id
    sessions: DashMap<String, UserId>,
    tables: DashMap<TableId, SheetTable>,
    /// Column definitions; entered values live in `values`.
    columns: DashMap<i64, CustomColumn>,
    /// column id -> row index -> value
    values: DashMap<i64, DashMap<usize, String>>,
    next_user_id: AtomicI64,
    next_table_id: AtomicI64,
    next_column_id: AtomicI64,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl TableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                users: DashMap::new(),
                users_by_email: DashMap::new(),
                sessions: DashMap::new(),
                tables: DashMap::new(),
                columns: DashMap::new(),
                values: DashMap::new(),
                next_user_id: AtomicI64::new(1),
                next_table_id: AtomicI64::new(1),
                next_column_id: AtomicI64::new(1),
            }),
        }
    }

    // ========================================================================
    // Users and sessions
    // ========================================================================

    /// Register a user. The password must already be hashed.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        match self.inner.users_by_email.entry(email.to_string()) {
            Entry::Occupied(_) => Err(StoreError::EmailTaken),
            Entry::Vacant(slot) => {
                let id = self.inner.next_user_id.fetch_add(1, Ordering::Relaxed);
                let user = User {
                    id,
                    email: email.to_string(),
                    password_hash: password_hash.to_string(),
                    created_at: now_millis(),
                };
                slot.insert(id);
                self.inner.users.insert(id, user.clone());
                Ok(user)
            }
        }
    }

    /// Look a user up by email.
    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let id = *self.inner.users_by_email.get(email)?;
        self.inner.users.get(&id).map(|u| u.clone())
    }

    /// Open a session and return its opaque token.
    pub fn create_session(&self, user_id: UserId) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.inner.sessions.insert(token.clone(), user_id);
        token
    }

    /// Resolve a session token to its user.
    pub fn session_user(&self, token: &str) -> Result<User> {
        let user_id = *self
            .inner
            .sessions
            .get(token)
            .ok_or(StoreError::InvalidToken)?;
        self.inner
            .users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or(StoreError::InvalidToken)
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Register a new table pointing at an external document.
    pub fn create_table(&self, owner_id: UserId, name: &str, source_url: &str) -> SheetTable {
        let id = self.inner.next_table_id.fetch_add(1, Ordering::Relaxed);
        let now = now_millis();
        let table = SheetTable {
            id,
            owner_id,
            name: name.to_string(),
            source_url: source_url.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.inner.tables.insert(id, table.clone());
        table
    }

    /// Fetch a table record by id.
    pub fn get_table(&self, id: TableId) -> Result<SheetTable> {
        self.inner
            .tables
            .get(&id)
            .map(|t| t.clone())
            .ok_or(StoreError::NotFound("table"))
    }

    /// Fetch a table, enforcing ownership.
    pub fn get_table_owned(&self, id: TableId, owner_id: UserId) -> Result<SheetTable> {
        let table = self.get_table(id)?;
        if table.owner_id != owner_id {
            return Err(StoreError::Forbidden);
        }
        Ok(table)
    }

    /// All tables owned by a user, oldest first.
    pub fn list_tables(&self, owner_id: UserId) -> Vec<SheetTable> {
        let mut tables: Vec<SheetTable> = self
            .inner
            .tables
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .map(|t| t.clone())
            .collect();
        tables.sort_by_key(|t| t.id);
        tables
    }

    /// Patch a table's metadata, enforcing ownership.
    pub fn update_table(
        &self,
        id: TableId,
        owner_id: UserId,
        patch: TablePatch,
    ) -> Result<SheetTable> {
        let mut entry = self
            .inner
            .tables
            .get_mut(&id)
            .ok_or(StoreError::NotFound("table"))?;
        if entry.owner_id != owner_id {
            return Err(StoreError::Forbidden);
        }
        if let Some(name) = patch.name {
            entry.name = name;
        }
        if let Some(source_url) = patch.source_url {
            entry.source_url = source_url;
        }
        entry.updated_at = now_millis();
        Ok(entry.clone())
    }

    /// Delete a table and cascade its columns and values.
    pub fn delete_table(&self, id: TableId, owner_id: UserId) -> Result<()> {
        {
            let table = self
                .inner
                .tables
                .get(&id)
                .ok_or(StoreError::NotFound("table"))?;
            if table.owner_id != owner_id {
                return Err(StoreError::Forbidden);
            }
        }
        self.inner.tables.remove(&id);

        let column_ids: Vec<i64> = self
            .inner
            .columns
            .iter()
            .filter(|c| c.table_id == id)
            .map(|c| c.id)
            .collect();
        for column_id in column_ids {
            self.inner.columns.remove(&column_id);
            self.inner.values.remove(&column_id);
        }
        Ok(())
    }

    // ========================================================================
    // Custom columns and values
    // ========================================================================

    /// Add a custom column to a table. Ownership is the caller's problem.
    pub fn add_column(&self, table_id: TableId, name: &str) -> CustomColumn {
        let id = self.inner.next_column_id.fetch_add(1, Ordering::Relaxed);
        let column = CustomColumn {
            id,
            table_id,
            name: name.to_string(),
            created_at: now_millis(),
            values: Vec::new(),
        };
        self.inner.columns.insert(id, column.clone());
        column
    }

    /// Fetch a column definition (values not populated).
    pub fn get_column(&self, column_id: i64) -> Result<CustomColumn> {
        self.inner
            .columns
            .get(&column_id)
            .map(|c| c.clone())
            .ok_or(StoreError::NotFound("column"))
    }

    /// Create or overwrite the value at (column, row index).
    pub fn set_column_value(
        &self,
        column_id: i64,
        row_index: usize,
        value: &str,
    ) -> Result<ColumnValue> {
        if !self.inner.columns.contains_key(&column_id) {
            return Err(StoreError::NotFound("column"));
        }
        self.inner
            .values
            .entry(column_id)
            .or_default()
            .insert(row_index, value.to_string());
        Ok(ColumnValue {
            column_id,
            row_index,
            value: value.to_string(),
        })
    }

    /// All custom columns of a table with their values, columns ordered by
    /// id and values by row index.
    pub fn get_custom_columns(&self, table_id: TableId) -> Vec<CustomColumn> {
        let mut columns: Vec<CustomColumn> = self
            .inner
            .columns
            .iter()
            .filter(|c| c.table_id == table_id)
            .map(|c| c.clone())
            .collect();
        columns.sort_by_key(|c| c.id);

        for column in &mut columns {
            let mut values: Vec<ColumnValue> = self
                .inner
                .values
                .get(&column.id)
                .map(|rows| {
                    rows.iter()
                        .map(|entry| ColumnValue {
                            column_id: column.id,
                            row_index: *entry.key(),
                            value: entry.value().clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            values.sort_by_key(|v| v.row_index);
            column.values = values;
        }
        columns
    }

    /// Number of registered tables.
    pub fn table_count(&self) -> usize {
        self.inner.tables.len()
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}
