use std::sync::Arc;

use tracing::debug;

use chorus_db::Database;
use chorus_gateway::blocking;
use chorus_gateway::dispatcher::Dispatcher;
use chorus_types::ChatResult;
use chorus_types::events::GatewayEvent;
use chorus_types::models::{Notification, NotificationId, NotificationKind};

/// Turns domain events into a durable notification plus a live push.
///
/// Generic across kinds: callers suppress self-notifications before calling
/// [`NotificationFanout::create`].
#[derive(Clone)]
pub struct NotificationFanout {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl NotificationFanout {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Persists first, then pushes. The stored record is authoritative;
    /// the push is best-effort.
    pub async fn create(
        &self,
        target: &str,
        kind: NotificationKind,
        reference_id: Option<i64>,
        actor: &str,
        text: &str,
    ) -> ChatResult<Notification> {
        let db = self.db.clone();
        let (t, a, x) = (target.to_string(), actor.to_string(), text.to_string());
        let notification =
            blocking(move || db.insert_notification(&t, kind, reference_id, &a, &x)).await?;

        let sessions = self
            .dispatcher
            .deliver(target, &GatewayEvent::Notification(notification.clone()));
        debug!(
            "{} notification {} for {} pushed to {} sessions",
            kind, notification.id, target, sessions
        );

        Ok(notification)
    }

    pub async fn list(&self, target: &str) -> ChatResult<Vec<Notification>> {
        let db = self.db.clone();
        let target = target.to_string();
        blocking(move || db.list_notifications(&target)).await
    }

    pub async fn unread_count(&self, target: &str) -> ChatResult<u64> {
        let db = self.db.clone();
        let target = target.to_string();
        blocking(move || db.unread_notification_count(&target)).await
    }

    pub async fn mark_all_read(&self, target: &str) -> ChatResult<usize> {
        let db = self.db.clone();
        let target = target.to_string();
        blocking(move || db.mark_all_notifications_read(&target)).await
    }

    pub async fn mark_read(&self, target: &str, id: NotificationId) -> ChatResult<()> {
        let db = self.db.clone();
        let target = target.to_string();
        blocking(move || db.mark_notification_read(&target, id)).await
    }
}
