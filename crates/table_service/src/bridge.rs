//! Mutation → broadcast bridge.
//!
//! Every state-mutating operation on table-scoped data calls one of these
//! methods after its store write has committed. The bridge builds the
//! tagged update message (fetching a fresh snapshot where the payload
//! calls for one) and fans it out to the table's subscribers.
//!
//! Nothing here returns an error to the caller: the persisted change is
//! authoritative by the time the bridge runs, and a half-closed
//! connection or a failed refetch must never turn a successful mutation
//! into a failed response. Fetch failures surface as in-band error
//! snapshots and are broadcast like normal data.

use std::sync::Arc;

use common::{ColumnValue, CustomColumn, SheetSnapshot, SheetTable, TableId};
use gateway::{Hub, ServerMessage, TableUpdate};
use metrics::counter;
use sheet_client::SheetClient;
use tracing::debug;

use crate::store::TableStore;

/// Fan-out side of every mutation handler.
#[derive(Clone)]
pub struct UpdateBridge {
    hub: Arc<Hub>,
    store: TableStore,
    sheets: SheetClient,
}

impl UpdateBridge {
    pub fn new(hub: Arc<Hub>, store: TableStore, sheets: SheetClient) -> Self {
        Self { hub, store, sheets }
    }

    /// A custom column was created.
    pub async fn column_added(&self, table: &SheetTable, column: &CustomColumn) {
        let snapshot = self.sheets.fetch_snapshot(&table.source_url).await;
        self.push(
            table.id,
            TableUpdate::ColumnAdded {
                column: column.clone(),
                snapshot,
            },
        );
    }

    /// Table metadata (name or source URL) changed.
    pub fn table_updated(&self, table: &SheetTable) {
        self.push(
            table.id,
            TableUpdate::TableUpdated {
                table: table.clone(),
            },
        );
    }

    /// The table is gone. Tells the subscribers, then drops the table's
    /// subscriber-set entry outright rather than letting it empty out.
    pub fn table_deleted(&self, table_id: TableId) {
        self.push(table_id, TableUpdate::TableDeleted);
        self.hub.drop_table(table_id);
    }

    /// The owner asked for a resync; the handler already fetched.
    pub fn data_refreshed(
        &self,
        table: &SheetTable,
        columns: &[CustomColumn],
        snapshot: &SheetSnapshot,
    ) {
        self.push(
            table.id,
            TableUpdate::DataRefreshed {
                table: table.clone(),
                columns: columns.to_vec(),
                snapshot: snapshot.clone(),
            },
        );
    }

    /// A custom column cell was created or overwritten.
    pub async fn column_value_updated(&self, table: &SheetTable, saved: &ColumnValue) {
        let columns = self.store.get_custom_columns(table.id);
        let snapshot = self.sheets.fetch_snapshot(&table.source_url).await;
        self.push(
            table.id,
            TableUpdate::ColumnValueUpdated {
                column_id: saved.column_id,
                row_index: saved.row_index,
                value: saved.value.clone(),
                columns,
                snapshot,
            },
        );
    }

    fn push(&self, table_id: TableId, update: TableUpdate) {
        counter!("bridge_updates_total").increment(1);
        debug!("Broadcasting update for table {}", table_id);
        self.hub
            .broadcast(table_id, &ServerMessage::table_update(table_id, update));
    }
}
