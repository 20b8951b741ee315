use std::sync::Arc;

use serde_json::Value;

use crate::observability;
use crate::realtime::{ConnectionRegistry, EventEnvelope, ROOM_REVIEW_QUEUE};

/// Routes domain events onto the realtime layer. Review lifecycle events go
/// to the shared review queue room, targeted events go to a single user's
/// connections, and system alerts reach everyone. Delivery counts feed the
/// notification metric; a zero count just means nobody was listening.
#[derive(Clone)]
pub struct NotificationService {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn review_created(&self, data: Value) -> usize {
        self.to_review_queue("review_created", data)
    }

    pub fn review_completed(&self, data: Value) -> usize {
        self.to_review_queue("review_completed", data)
    }

    pub fn queue_update(&self, data: Value) -> usize {
        self.to_review_queue("queue_update", data)
    }

    pub fn review_assigned(&self, user_id: &str, data: Value) -> usize {
        self.to_user("review_assigned", user_id, data)
    }

    pub fn user_mentioned(&self, user_id: &str, data: Value) -> usize {
        self.to_user("user_mentioned", user_id, data)
    }

    pub fn system_alert(&self, data: Value) -> usize {
        let envelope = EventEnvelope::new("system_alert", data);
        let delivered = self.registry.broadcast_to_all(&envelope);
        observability::register_notification("system_alert", "all", delivered);
        delivered
    }

    fn to_review_queue(&self, event: &str, data: Value) -> usize {
        let envelope = EventEnvelope::new(event, data);
        let delivered = self.registry.broadcast_to_room(ROOM_REVIEW_QUEUE, &envelope);
        observability::register_notification(event, ROOM_REVIEW_QUEUE, delivered);
        delivered
    }

    fn to_user(&self, event: &str, user_id: &str, data: Value) -> usize {
        let envelope = EventEnvelope::new(event, data);
        let delivered = self.registry.send_to_user(user_id, &envelope);
        observability::register_notification(event, "user", delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docline_domain::auth::Role;
    use docline_domain::identity::UserIdentity;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn review_events_reach_the_queue_room_only() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = NotificationService::new(registry.clone());

        let (tx_in, mut rx_in) = mpsc::channel(8);
        let in_room = registry.connect(UserIdentity::with_user_id("rev", Role::Reviewer), tx_in);
        registry.subscribe_to_room(&in_room, ROOM_REVIEW_QUEUE);

        let (tx_out, mut rx_out) = mpsc::channel(8);
        registry.connect(UserIdentity::with_user_id("bystander", Role::Viewer), tx_out);

        let delivered = notifier.review_created(json!({"plan_id": "abc"}));
        assert_eq!(delivered, 1);
        assert!(rx_in.try_recv().is_ok());
        assert!(rx_out.try_recv().is_err());
    }

    #[tokio::test]
    async fn system_alert_reaches_everyone() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = NotificationService::new(registry.clone());

        let (tx_a, mut rx_a) = mpsc::channel(8);
        registry.connect(UserIdentity::with_user_id("a", Role::Viewer), tx_a);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        registry.connect(UserIdentity::with_user_id("b", Role::Admin), tx_b);

        let delivered = notifier.system_alert(json!({"message": "maintenance at 02:00"}));
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn targeted_events_only_reach_the_named_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = NotificationService::new(registry.clone());

        let (tx_a, mut rx_a) = mpsc::channel(8);
        registry.connect(UserIdentity::with_user_id("alice", Role::Reviewer), tx_a);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        registry.connect(UserIdentity::with_user_id("bob", Role::Reviewer), tx_b);

        assert_eq!(notifier.review_assigned("alice", json!({"plan_id": "p1"})), 1);
        assert_eq!(notifier.user_mentioned("nobody", json!({})), 0);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
