//! WebSocket protocol message types.
//!
//! Defines the JSON message format for client-server communication.
//! Update payloads are a tagged union: the envelope carries the outer
//! `tableUpdate` tag and the table id, the mutation tag rides in the
//! flattened `event` field.

use common::{CustomColumn, SheetSnapshot, SheetTable, TableId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Client → Server Messages
// ============================================================================

/// Message sent from client to server.
///
/// Anything that fails to parse into one of these (unknown `type`,
/// non-integer `tableId`) is ignored by the socket handler.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Start receiving updates for a table.
    Subscribe { table_id: TableId },
    /// Stop receiving updates for a table.
    Unsubscribe { table_id: TableId },
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Message sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Confirmation of subscription, sent to the requester alone.
    Subscribed { table_id: TableId, message: String },
    /// Confirmation of unsubscription, sent to the requester alone.
    Unsubscribed { table_id: TableId },
    /// A server-side mutation touched the table.
    TableUpdate {
        table_id: TableId,
        #[serde(flatten)]
        update: TableUpdate,
    },
}

impl ServerMessage {
    /// Build the update envelope for a mutation.
    pub fn table_update(table_id: TableId, update: TableUpdate) -> Self {
        Self::TableUpdate { table_id, update }
    }
}

/// One server-side mutation, tagged for the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TableUpdate {
    /// A custom column was created.
    ColumnAdded {
        column: CustomColumn,
        snapshot: SheetSnapshot,
    },
    /// Table metadata (name or source URL) changed.
    TableUpdated { table: SheetTable },
    /// The table was deleted; subscribers should drop their view.
    TableDeleted,
    /// The owner asked for a resync from the external source.
    DataRefreshed {
        table: SheetTable,
        columns: Vec<CustomColumn>,
        snapshot: SheetSnapshot,
    },
    /// A custom column cell was created or overwritten.
    ColumnValueUpdated {
        column_id: i64,
        row_index: usize,
        value: String,
        columns: Vec<CustomColumn>,
        snapshot: SheetSnapshot,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn parses_subscribe() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","tableId":42}"#).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe { table_id: 42 });
    }

    #[test]
    fn parses_unsubscribe() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"unsubscribe","tableId":7}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unsubscribe { table_id: 7 });
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout","tableId":1}"#).is_err());
    }

    #[test]
    fn rejects_non_integer_table_id() {
        assert!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe","tableId":"42"}"#)
                .is_err()
        );
        assert!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe","tableId":4.5}"#).is_err()
        );
    }

    #[test]
    fn subscribed_ack_shape() {
        let msg = ServerMessage::Subscribed {
            table_id: 42,
            message: "subscribed to table 42".to_string(),
        };
        let v: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "subscribed");
        assert_eq!(v["tableId"], 42);
        assert!(v["message"].is_string());
    }

    #[test]
    fn update_envelope_merges_mutation_tag() {
        let msg = ServerMessage::table_update(
            42,
            TableUpdate::ColumnValueUpdated {
                column_id: 7,
                row_index: 3,
                value: "done".to_string(),
                columns: vec![],
                snapshot: SheetSnapshot {
                    headers: vec!["a".to_string()],
                    rows: vec![],
                },
            },
        );
        let v: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "tableUpdate");
        assert_eq!(v["tableId"], 42);
        assert_eq!(v["event"], "columnValueUpdated");
        assert_eq!(v["columnId"], 7);
        assert_eq!(v["rowIndex"], 3);
        assert_eq!(v["value"], "done");
        assert!(v["snapshot"]["headers"].is_array());
    }

    #[test]
    fn table_deleted_envelope_has_no_payload() {
        let msg = ServerMessage::table_update(9, TableUpdate::TableDeleted);
        let v: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "tableUpdate");
        assert_eq!(v["tableId"], 9);
        assert_eq!(v["event"], "tableDeleted");
        assert_eq!(v.as_object().unwrap().len(), 3);
    }
}
