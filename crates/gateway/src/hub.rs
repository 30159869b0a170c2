//! Connection registry and subscription router.
//!
//! The hub owns both sides of the subscription bookkeeping: which
//! connections exist (and whether they answered the last liveness probe),
//! and which connections watch which table. Both maps live behind a single
//! lock so they can never diverge: a connection is in a table's subscriber
//! set exactly when the table id is in that connection's local set. The
//! raw maps are never exposed; everything goes through the operations
//! below.
//!
//! Liveness uses a flag-flip sweep: every probe interval the sweeper
//! terminates connections that did not answer the previous probe, then
//! flips the survivors to not-alive and pings them. A client that stays
//! silent for one full probe window is disconnected.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::Message;
use common::TableId;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{ClientConn, ConnId};
use crate::protocol::ServerMessage;

/// How often liveness probes are sent and missed probes are reaped.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(15);

struct ConnEntry {
    conn: Arc<ClientConn>,
    /// Cleared before each probe round, set again by the probe ack.
    alive: bool,
    /// Tables this connection watches.
    tables: HashSet<TableId>,
}

#[derive(Default)]
struct HubInner {
    conns: HashMap<ConnId, ConnEntry>,
    tables: HashMap<TableId, HashSet<ConnId>>,
}

/// Registry of connected clients and their table subscriptions.
pub struct Hub {
    inner: RwLock<HubInner>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
        }
    }

    /// Track a new connection, alive and with no subscriptions.
    pub fn register(&self, conn: Arc<ClientConn>) {
        let id = conn.id;
        let mut inner = self.inner.write().unwrap();
        inner.conns.insert(
            id,
            ConnEntry {
                conn,
                alive: true,
                tables: HashSet::new(),
            },
        );
        info!("Client {} registered", id);
    }

    /// Record a liveness-probe acknowledgment. Idempotent.
    pub fn mark_alive(&self, id: ConnId) {
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.conns.get_mut(&id) {
            entry.alive = true;
        }
    }

    /// Subscribe a connection to a table and ack the requester alone.
    ///
    /// No check that the id names an existing table: validation belongs to
    /// the HTTP layer, and a subscription to an id that never materializes
    /// simply never receives an update.
    pub fn subscribe(&self, id: ConnId, table_id: TableId) {
        let mut inner = self.inner.write().unwrap();
        if !inner.conns.contains_key(&id) {
            return;
        }
        inner.tables.entry(table_id).or_default().insert(id);
        if let Some(entry) = inner.conns.get_mut(&id) {
            entry.tables.insert(table_id);
            let ack = entry.conn.send(&ServerMessage::Subscribed {
                table_id,
                message: format!("subscribed to table {}", table_id),
            });
            if ack.is_err() {
                debug!("Failed to ack subscribe for {}", id);
            }
        }
        counter!("gateway_subscriptions_total").increment(1);
        debug!("Client {} subscribed to table {}", id, table_id);
    }

    /// Unsubscribe a connection from a table and ack the requester alone.
    ///
    /// Removing a pair that does not exist is a no-op, not an error.
    pub fn unsubscribe(&self, id: ConnId, table_id: TableId) {
        let mut inner = self.inner.write().unwrap();
        if !inner.conns.contains_key(&id) {
            return;
        }
        remove_subscriber(&mut inner.tables, table_id, id);
        if let Some(entry) = inner.conns.get_mut(&id) {
            entry.tables.remove(&table_id);
            let ack = entry.conn.send(&ServerMessage::Unsubscribed { table_id });
            if ack.is_err() {
                debug!("Failed to ack unsubscribe for {}", id);
            }
        }
        debug!("Client {} unsubscribed from table {}", id, table_id);
    }

    /// Stop tracking a connection and drop all its subscriptions.
    ///
    /// Called from both the explicit-close and forced-termination paths;
    /// the second call for the same id is a no-op.
    pub fn deregister(&self, id: ConnId) {
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.conns.remove(&id) {
            for table_id in &entry.tables {
                remove_subscriber(&mut inner.tables, *table_id, id);
            }
            info!("Client {} deregistered", id);
        }
    }

    /// Remove a table's subscriber-set entry entirely, keeping every
    /// former subscriber's local set consistent. Used on table deletion.
    pub fn drop_table(&self, table_id: TableId) {
        let mut inner = self.inner.write().unwrap();
        if let Some(subscribers) = inner.tables.remove(&table_id) {
            for id in subscribers {
                if let Some(entry) = inner.conns.get_mut(&id) {
                    entry.tables.remove(&table_id);
                }
            }
            debug!("Dropped subscriber set for table {}", table_id);
        }
    }

    /// Send a message to every subscriber of a table.
    ///
    /// A table with no current viewers is a normal state: absent or empty
    /// subscriber sets make this a silent no-op. Recipients whose socket
    /// task has already gone away are skipped, not removed; cleanup
    /// happens only through deregistration.
    pub fn broadcast(&self, table_id: TableId, msg: &ServerMessage) {
        let recipients: Vec<Arc<ClientConn>> = {
            let inner = self.inner.read().unwrap();
            match inner.tables.get(&table_id) {
                Some(subscribers) => subscribers
                    .iter()
                    .filter_map(|id| inner.conns.get(id).map(|e| e.conn.clone()))
                    .collect(),
                None => return,
            }
        };
        if recipients.is_empty() {
            return;
        }

        // Serialize once for the whole fan-out.
        let json = match serde_json::to_string(msg) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize broadcast message: {}", e);
                return;
            }
        };

        let mut delivered = 0;
        for conn in recipients {
            if !conn.is_open() {
                debug!("Skipping closed client {}", conn.id);
                continue;
            }
            match conn.send_raw(Message::Text(json.clone().into())) {
                Ok(()) => delivered += 1,
                Err(_) => debug!("Failed to send to client {}", conn.id),
            }
        }
        counter!("gateway_broadcasts_total").increment(1);
        counter!("gateway_messages_sent_total").increment(delivered);
        debug!(
            "Broadcast to table {} reached {} client(s)",
            table_id, delivered
        );
    }

    /// One probe round: reap connections that missed the previous probe,
    /// then flip the survivors to not-alive and ping them.
    ///
    /// Returns the number of connections terminated.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.write().unwrap();

        let dead: Vec<ConnId> = inner
            .conns
            .iter()
            .filter(|(_, entry)| !entry.alive)
            .map(|(id, _)| *id)
            .collect();

        for id in &dead {
            if let Some(entry) = inner.conns.remove(id) {
                for table_id in &entry.tables {
                    remove_subscriber(&mut inner.tables, *table_id, *id);
                }
                warn!("Client {} missed liveness probe, terminating", id);
                entry.conn.close();
            }
        }

        for entry in inner.conns.values_mut() {
            entry.alive = false;
            let _ = entry.conn.send_raw(Message::Ping(vec![].into()));
        }

        if !dead.is_empty() {
            counter!("gateway_reaped_connections_total").increment(dead.len() as u64);
        }
        dead.len()
    }

    /// Number of tracked connections.
    pub fn client_count(&self) -> usize {
        self.inner.read().unwrap().conns.len()
    }

    /// Number of tables with at least one subscriber.
    pub fn subscription_count(&self) -> usize {
        self.inner.read().unwrap().tables.len()
    }

    /// Spawn the recurring liveness sweeper.
    ///
    /// One task for the whole hub; the caller aborts the handle exactly
    /// once at shutdown.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let reaped = self.sweep();
                if reaped > 0 {
                    info!("Sweeper terminated {} unresponsive connection(s)", reaped);
                }
            }
        })
    }

    #[cfg(test)]
    fn subscribed_tables(&self, id: ConnId) -> Option<HashSet<TableId>> {
        self.inner
            .read()
            .unwrap()
            .conns
            .get(&id)
            .map(|e| e.tables.clone())
    }

    #[cfg(test)]
    fn table_subscribers(&self, table_id: TableId) -> Option<HashSet<ConnId>> {
        self.inner.read().unwrap().tables.get(&table_id).cloned()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop one subscriber from a table's set, pruning the entry when it
/// empties out.
fn remove_subscriber(
    tables: &mut HashMap<TableId, HashSet<ConnId>>,
    table_id: TableId,
    id: ConnId,
) {
    if let Some(set) = tables.get_mut(&table_id) {
        set.remove(&id);
        if set.is_empty() {
            tables.remove(&table_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TableUpdate;
    use serde_json::Value;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn connect(hub: &Hub) -> (Arc<ClientConn>, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(ClientConn::new(tx));
        hub.register(conn.clone());
        (conn, rx)
    }

    fn drain_json(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                out.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        out
    }

    fn has_close_frame(rx: &mut UnboundedReceiver<Message>) -> bool {
        let mut seen = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, Message::Close(_)) {
                seen = true;
            }
        }
        seen
    }

    #[test]
    fn subscription_symmetry() {
        let hub = Hub::new();
        let (a, _rx_a) = connect(&hub);
        let (b, _rx_b) = connect(&hub);

        hub.subscribe(a.id, 1);
        hub.subscribe(a.id, 2);
        hub.subscribe(b.id, 1);

        assert_eq!(
            hub.subscribed_tables(a.id).unwrap(),
            HashSet::from([1, 2])
        );
        assert!(hub.table_subscribers(1).unwrap().contains(&a.id));
        assert!(hub.table_subscribers(1).unwrap().contains(&b.id));
        assert!(hub.table_subscribers(2).unwrap().contains(&a.id));

        hub.unsubscribe(a.id, 1);
        assert_eq!(hub.subscribed_tables(a.id).unwrap(), HashSet::from([2]));
        assert!(!hub.table_subscribers(1).unwrap().contains(&a.id));

        hub.deregister(b.id);
        assert!(hub.table_subscribers(1).is_none());
    }

    #[test]
    fn empty_subscriber_sets_are_pruned() {
        let hub = Hub::new();
        let (a, _rx) = connect(&hub);

        hub.subscribe(a.id, 42);
        assert_eq!(hub.subscription_count(), 1);

        hub.unsubscribe(a.id, 42);
        assert_eq!(hub.subscription_count(), 0);
        assert!(hub.table_subscribers(42).is_none());
    }

    #[test]
    fn subscribe_acks_requester_only() {
        let hub = Hub::new();
        let (a, mut rx_a) = connect(&hub);
        let (_b, mut rx_b) = connect(&hub);

        hub.subscribe(a.id, 42);

        let acks = drain_json(&mut rx_a);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0]["type"], "subscribed");
        assert_eq!(acks[0]["tableId"], 42);
        assert!(drain_json(&mut rx_b).is_empty());
    }

    #[test]
    fn unsubscribe_of_absent_pair_is_noop() {
        let hub = Hub::new();
        let (a, mut rx_a) = connect(&hub);

        hub.unsubscribe(a.id, 99);

        let acks = drain_json(&mut rx_a);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0]["type"], "unsubscribed");
        assert_eq!(hub.subscription_count(), 0);
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let hub = Hub::new();
        let (a, mut rx_a) = connect(&hub);
        hub.subscribe(a.id, 1);
        drain_json(&mut rx_a);

        hub.broadcast(
            2,
            &ServerMessage::table_update(2, TableUpdate::TableDeleted),
        );

        // No delivery anywhere, table 1 untouched.
        assert!(drain_json(&mut rx_a).is_empty());
        assert!(hub.table_subscribers(1).unwrap().contains(&a.id));
    }

    #[test]
    fn broadcast_reaches_exactly_the_subscribers() {
        let hub = Hub::new();
        let (a, mut rx_a) = connect(&hub);
        let (b, mut rx_b) = connect(&hub);
        let (c, mut rx_c) = connect(&hub);

        hub.subscribe(a.id, 42);
        hub.subscribe(b.id, 42);
        hub.subscribe(c.id, 7);
        drain_json(&mut rx_a);
        drain_json(&mut rx_b);
        drain_json(&mut rx_c);

        hub.broadcast(
            42,
            &ServerMessage::table_update(42, TableUpdate::TableDeleted),
        );

        for rx in [&mut rx_a, &mut rx_b] {
            let got = drain_json(rx);
            assert_eq!(got.len(), 1);
            assert_eq!(got[0]["type"], "tableUpdate");
            assert_eq!(got[0]["tableId"], 42);
        }
        assert!(drain_json(&mut rx_c).is_empty());
    }

    #[test]
    fn broadcast_skips_closed_connection_without_removing_it() {
        let hub = Hub::new();
        let (a, mut rx_a) = connect(&hub);
        let (b, rx_b) = connect(&hub);
        hub.subscribe(a.id, 5);
        hub.subscribe(b.id, 5);
        drain_json(&mut rx_a);
        drop(rx_b);

        hub.broadcast(
            5,
            &ServerMessage::table_update(5, TableUpdate::TableDeleted),
        );

        assert_eq!(drain_json(&mut rx_a).len(), 1);
        // The closed connection is skipped, not cleaned up.
        assert!(hub.table_subscribers(5).unwrap().contains(&b.id));
        assert_eq!(hub.client_count(), 2);
    }

    #[test]
    fn sweep_terminates_after_one_missed_probe() {
        let hub = Hub::new();
        let (a, mut rx_a) = connect(&hub);
        hub.subscribe(a.id, 42);

        // First round: still alive from registration, gets flipped and probed.
        assert_eq!(hub.sweep(), 0);
        assert_eq!(hub.client_count(), 1);

        // No probe ack before the next round: terminated, subscriptions gone.
        assert_eq!(hub.sweep(), 1);
        assert_eq!(hub.client_count(), 0);
        assert!(hub.table_subscribers(42).is_none());
        assert!(has_close_frame(&mut rx_a));
    }

    #[test]
    fn probe_ack_keeps_connection_alive() {
        let hub = Hub::new();
        let (a, _rx_a) = connect(&hub);

        assert_eq!(hub.sweep(), 0);
        hub.mark_alive(a.id);
        assert_eq!(hub.sweep(), 0);
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn deregister_is_idempotent() {
        let hub = Hub::new();
        let (a, _rx_a) = connect(&hub);
        hub.subscribe(a.id, 3);

        hub.deregister(a.id);
        hub.deregister(a.id);

        assert_eq!(hub.client_count(), 0);
        assert_eq!(hub.subscription_count(), 0);
    }

    #[test]
    fn drop_table_clears_both_sides() {
        let hub = Hub::new();
        let (a, _rx_a) = connect(&hub);
        let (b, _rx_b) = connect(&hub);
        hub.subscribe(a.id, 42);
        hub.subscribe(a.id, 7);
        hub.subscribe(b.id, 42);

        hub.drop_table(42);

        assert!(hub.table_subscribers(42).is_none());
        assert_eq!(hub.subscribed_tables(a.id).unwrap(), HashSet::from([7]));
        assert_eq!(hub.subscribed_tables(b.id).unwrap(), HashSet::new());
        // Connections themselves stay registered.
        assert_eq!(hub.client_count(), 2);
    }
}
