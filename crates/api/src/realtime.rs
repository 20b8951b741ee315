use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use docline_domain::identity::UserIdentity;
use docline_domain::util::{format_ms_rfc3339, now_ms, uuid_v7_without_dashes};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

pub const ROOM_REVIEW_QUEUE: &str = "review-queue";

/// Depth of each connection's outbound queue. A client that stops draining
/// its socket fills the queue and is treated as disconnected rather than
/// buffering without bound.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Connections whose last ping is older than this are reported as stale in
/// `stats()` (several heartbeat intervals behind).
const STALE_PING_AFTER_MS: i64 = 90_000;

pub const EVENT_CONNECTION_ESTABLISHED: &str = "connection_established";
pub const EVENT_ROOM_SUBSCRIBED: &str = "room_subscribed";
pub const EVENT_ROOM_UNSUBSCRIBED: &str = "room_unsubscribed";
pub const EVENT_PONG: &str = "pong";
pub const EVENT_CONNECTION_STATS: &str = "connection_stats";

/// Wire envelope for every server-to-client realtime message.
#[derive(Clone, Debug, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: String,
}

impl EventEnvelope {
    pub fn new(event_type: &str, data: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            data,
            timestamp: format_ms_rfc3339(now_ms()),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub stale_connections: usize,
    pub rooms: HashMap<String, usize>,
}

pub type OutboundSender = mpsc::Sender<String>;

struct ConnectionEntry {
    sender: OutboundSender,
    identity: UserIdentity,
    rooms: HashSet<String>,
    #[allow(dead_code)]
    connected_at_ms: i64,
    last_ping_ms: i64,
}

#[derive(Default)]
struct RegistryIndex {
    connections: HashMap<String, ConnectionEntry>,
    users: HashMap<String, HashSet<String>>,
    rooms: HashMap<String, HashSet<String>>,
}

impl RegistryIndex {
    /// Removes a connection from every index. Idempotent: pruning an
    /// unknown id is a no-op.
    fn prune(&mut self, connection_id: &str) {
        let Some(entry) = self.connections.remove(connection_id) else {
            return;
        };
        if let Some(set) = self.users.get_mut(&entry.identity.user_id) {
            set.remove(connection_id);
            if set.is_empty() {
                self.users.remove(&entry.identity.user_id);
            }
        }
        for room in &entry.rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(connection_id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
    }
}

/// Tracks live realtime sessions, per-user connection sets, and room
/// memberships. Constructed once at startup and handed to every task that
/// needs it; the registry is the sole owner of connection state.
///
/// Delivery is a non-blocking `try_send` onto each connection's bounded
/// writer queue, so the index lock is only ever held for map mutation and
/// membership snapshots, never while a transport is draining. A failed
/// enqueue, whether the writer task is gone or its queue is full, is the
/// authoritative disconnect signal.
#[derive(Default)]
pub struct ConnectionRegistry {
    index: Mutex<RegistryIndex>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, identity: UserIdentity, sender: OutboundSender) -> String {
        let connection_id = uuid_v7_without_dashes();
        let now = now_ms();
        let mut index = self.index.lock().expect("registry lock");
        index
            .users
            .entry(identity.user_id.clone())
            .or_default()
            .insert(connection_id.clone());
        index.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                sender,
                identity,
                rooms: HashSet::new(),
                connected_at_ms: now,
                last_ping_ms: now,
            },
        );
        connection_id
    }

    pub fn disconnect(&self, connection_id: &str) {
        self.index
            .lock()
            .expect("registry lock")
            .prune(connection_id);
    }

    /// Idempotent; subscribing twice yields a single membership entry.
    /// Returns false for an unregistered connection.
    pub fn subscribe_to_room(&self, connection_id: &str, room: &str) -> bool {
        let mut index = self.index.lock().expect("registry lock");
        let Some(entry) = index.connections.get_mut(connection_id) else {
            return false;
        };
        entry.rooms.insert(room.to_string());
        index
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string());
        true
    }

    /// Idempotent; unsubscribing a non-member is a no-op.
    pub fn unsubscribe_from_room(&self, connection_id: &str, room: &str) {
        let mut index = self.index.lock().expect("registry lock");
        if let Some(entry) = index.connections.get_mut(connection_id) {
            entry.rooms.remove(room);
        }
        if let Some(members) = index.rooms.get_mut(room) {
            members.remove(connection_id);
            if members.is_empty() {
                index.rooms.remove(room);
            }
        }
    }

    pub fn touch_ping(&self, connection_id: &str) {
        let mut index = self.index.lock().expect("registry lock");
        if let Some(entry) = index.connections.get_mut(connection_id) {
            entry.last_ping_ms = now_ms();
        }
    }

    /// Direct delivery to one connection. A failed send prunes the
    /// connection from every index; callers must not address it again.
    pub fn send_personal_message(&self, connection_id: &str, envelope: &EventEnvelope) -> bool {
        let text = envelope.to_text();
        let mut index = self.index.lock().expect("registry lock");
        let Some(entry) = index.connections.get(connection_id) else {
            return false;
        };
        if entry.sender.try_send(text).is_ok() {
            true
        } else {
            index.prune(connection_id);
            false
        }
    }

    /// Delivers to every live connection of one user.
    pub fn send_to_user(&self, user_id: &str, envelope: &EventEnvelope) -> usize {
        let targets = {
            let index = self.index.lock().expect("registry lock");
            let Some(ids) = index.users.get(user_id) else {
                return 0;
            };
            snapshot_targets(&index, ids.iter())
        };
        self.fan_out(targets, envelope)
    }

    /// Room fan-out over a membership snapshot; one dead member is pruned
    /// without aborting delivery to the rest.
    pub fn broadcast_to_room(&self, room: &str, envelope: &EventEnvelope) -> usize {
        let targets = {
            let index = self.index.lock().expect("registry lock");
            let Some(members) = index.rooms.get(room) else {
                return 0;
            };
            snapshot_targets(&index, members.iter())
        };
        self.fan_out(targets, envelope)
    }

    pub fn broadcast_to_all(&self, envelope: &EventEnvelope) -> usize {
        let targets = {
            let index = self.index.lock().expect("registry lock");
            snapshot_targets(&index, index.connections.keys())
        };
        self.fan_out(targets, envelope)
    }

    /// Best-effort snapshot; counts may lag concurrent mutation.
    pub fn stats(&self) -> ConnectionStats {
        self.stats_at(now_ms())
    }

    fn stats_at(&self, now: i64) -> ConnectionStats {
        let index = self.index.lock().expect("registry lock");
        ConnectionStats {
            total_connections: index.connections.len(),
            unique_users: index.users.len(),
            stale_connections: index
                .connections
                .values()
                .filter(|entry| now - entry.last_ping_ms > STALE_PING_AFTER_MS)
                .count(),
            rooms: index
                .rooms
                .iter()
                .map(|(room, members)| (room.clone(), members.len()))
                .collect(),
        }
    }

    fn fan_out(&self, targets: Vec<(String, OutboundSender)>, envelope: &EventEnvelope) -> usize {
        let text = envelope.to_text();
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (connection_id, sender) in targets {
            if sender.try_send(text.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(connection_id);
            }
        }
        if !dead.is_empty() {
            let mut index = self.index.lock().expect("registry lock");
            for connection_id in &dead {
                index.prune(connection_id);
            }
        }
        delivered
    }
}

fn snapshot_targets<'a>(
    index: &RegistryIndex,
    ids: impl Iterator<Item = &'a String>,
) -> Vec<(String, OutboundSender)> {
    ids.filter_map(|id| {
        index
            .connections
            .get(id)
            .map(|entry| (id.clone(), entry.sender.clone()))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docline_domain::auth::Role;
    use serde_json::json;
    use tokio::sync::mpsc::Receiver;

    fn connect_user(
        registry: &ConnectionRegistry,
        user_id: &str,
    ) -> (String, Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let id = registry.connect(UserIdentity::with_user_id(user_id, Role::Reviewer), tx);
        (id, rx)
    }

    #[tokio::test]
    async fn broadcast_isolates_a_dead_member_and_prunes_it() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect_user(&registry, "alice");
        let (b, rx_b) = connect_user(&registry, "bob");
        let (c, mut rx_c) = connect_user(&registry, "cara");
        for id in [&a, &b, &c] {
            assert!(registry.subscribe_to_room(id, "triage"));
        }
        drop(rx_b); // bob's writer task is gone

        let delivered =
            registry.broadcast_to_room("triage", &EventEnvelope::new("queue_update", json!({})));
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.rooms.get("triage"), Some(&2));
        assert!(!registry.subscribe_to_room(&b, "triage"));
    }

    #[tokio::test]
    async fn room_subscription_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect_user(&registry, "alice");
        assert!(registry.subscribe_to_room(&a, "triage"));
        assert!(registry.subscribe_to_room(&a, "triage"));
        assert_eq!(registry.stats().rooms.get("triage"), Some(&1));

        let delivered =
            registry.broadcast_to_room("triage", &EventEnvelope::new("queue_update", json!({})));
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribing_a_non_member_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect_user(&registry, "alice");
        registry.unsubscribe_from_room(&a, "triage");
        assert!(registry.stats().rooms.is_empty());

        assert!(registry.subscribe_to_room(&a, "triage"));
        registry.unsubscribe_from_room(&a, "triage");
        // Empty rooms stop being addressable.
        assert!(registry.stats().rooms.is_empty());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_clears_memberships() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect_user(&registry, "alice");
        registry.subscribe_to_room(&a, "triage");
        registry.subscribe_to_room(&a, "alerts");

        registry.disconnect(&a);
        registry.disconnect(&a);
        registry.disconnect("never-registered");

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.unique_users, 0);
        assert!(stats.rooms.is_empty());
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_connection_of_that_user() {
        let registry = ConnectionRegistry::new();
        let (_tab1, mut rx1) = connect_user(&registry, "alice");
        let (_tab2, mut rx2) = connect_user(&registry, "alice");
        let (_other, mut rx3) = connect_user(&registry, "bob");

        let delivered =
            registry.send_to_user("alice", &EventEnvelope::new("review_assigned", json!({})));
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());

        assert_eq!(registry.stats().unique_users, 2);
    }

    #[tokio::test]
    async fn failed_personal_send_reports_disconnect() {
        let registry = ConnectionRegistry::new();
        let (a, rx_a) = connect_user(&registry, "alice");
        drop(rx_a);

        assert!(!registry.send_personal_message(&a, &EventEnvelope::new("pong", json!({}))));
        assert_eq!(registry.stats().total_connections, 0);
        // Second send addresses an already-pruned connection.
        assert!(!registry.send_personal_message(&a, &EventEnvelope::new("pong", json!({}))));
    }

    #[tokio::test]
    async fn full_outbound_queue_counts_as_disconnect() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let a = registry.connect(UserIdentity::with_user_id("alice", Role::Reviewer), tx);
        registry.subscribe_to_room(&a, "triage");

        // The receiver never drains, so one message fills the queue.
        assert!(registry.send_personal_message(&a, &EventEnvelope::new("pong", json!({}))));
        assert!(!registry.send_personal_message(&a, &EventEnvelope::new("pong", json!({}))));

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 0);
        assert!(stats.rooms.is_empty());
    }

    #[tokio::test]
    async fn stats_count_connections_with_stale_pings() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect_user(&registry, "alice");
        assert_eq!(registry.stats().stale_connections, 0);

        let later = now_ms() + STALE_PING_AFTER_MS + 1;
        assert_eq!(registry.stats_at(later).stale_connections, 1);

        registry.touch_ping(&a);
        assert_eq!(registry.stats().stale_connections, 0);
    }

    #[test]
    fn envelope_serializes_with_type_tag() {
        let envelope = EventEnvelope::new("system_alert", json!({"message": "maintenance"}));
        let value: Value = serde_json::from_str(&envelope.to_text()).expect("json");
        assert_eq!(value["type"], "system_alert");
        assert_eq!(value["data"]["message"], "maintenance");
        assert!(value["timestamp"].is_string());
    }
}
