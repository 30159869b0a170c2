//! Domain records shared by every service crate.
//!
//! All wire names are camelCase to match the JSON the dashboard client
//! speaks.

use serde::{Deserialize, Serialize};

/// Identifier of a registered sheet table.
pub type TableId = i64;

/// Identifier of a registered user.
pub type UserId = i64;

/// A registered connection to an external spreadsheet document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SheetTable {
    pub id: TableId,
    pub owner_id: UserId,
    /// Display name chosen by the owner.
    pub name: String,
    /// URL of the external document the rows are fetched from.
    pub source_url: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds, bumped on every metadata update.
    pub updated_at: i64,
}

/// A user-defined column overlaid on the fetched rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomColumn {
    pub id: i64,
    pub table_id: TableId,
    pub name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Entered values, sorted by row index.
    #[serde(default)]
    pub values: Vec<ColumnValue>,
}

/// One entered cell of a custom column, keyed by row index into the
/// fetched snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnValue {
    pub column_id: i64,
    pub row_index: usize,
    pub value: String,
}

/// Tabular contents of an external document.
///
/// Fetch failures are represented in-band (see [`SheetSnapshot::error`]),
/// so consumers always receive a well-formed table shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SheetSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetSnapshot {
    /// One-row table describing a fetch failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            headers: vec!["Error".to_string()],
            rows: vec![vec![message.into()]],
        }
    }

    /// True if this snapshot is the in-band error shape.
    pub fn is_error(&self) -> bool {
        self.headers.len() == 1 && self.headers[0] == "Error"
    }
}

/// A registered user. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_snapshot_shape() {
        let snap = SheetSnapshot::error("access denied");
        assert_eq!(snap.headers, vec!["Error"]);
        assert_eq!(snap.rows, vec![vec!["access denied".to_string()]]);
        assert!(snap.is_error());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User {
            id: 1,
            email: "a@b.c".to_string(),
            password_hash: "secret".to_string(),
            created_at: 0,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"email\":\"a@b.c\""));
    }

    #[test]
    fn table_wire_names_are_camel_case() {
        let table = SheetTable {
            id: 7,
            owner_id: 3,
            name: "budget".to_string(),
            source_url: "https://example.com/sheet.csv".to_string(),
            created_at: 1,
            updated_at: 2,
        };
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains("\"ownerId\":3"));
        assert!(json.contains("\"sourceUrl\""));
        assert!(json.contains("\"updatedAt\":2"));
    }
}
