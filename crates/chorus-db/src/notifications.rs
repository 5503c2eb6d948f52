use chorus_types::models::{Notification, NotificationId, NotificationKind};
use chorus_types::{ChatError, ChatResult};

use crate::models::{NOTIFICATION_COLUMNS, NotificationRow};
use crate::{Database, DbResultExt, format_timestamp};

/// How many notifications a listing returns.
pub const NOTIFICATION_PAGE: u32 = 20;

impl Database {
    pub fn insert_notification(
        &self,
        target: &str,
        kind: NotificationKind,
        reference_id: Option<i64>,
        actor: &str,
        text: &str,
    ) -> ChatResult<Notification> {
        self.with_conn(|conn| {
            let created_at = self.next_timestamp()?;
            conn.execute(
                "INSERT INTO notifications (user_id, kind, reference_id, actor, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    target,
                    kind.as_str(),
                    reference_id,
                    actor,
                    text,
                    format_timestamp(&created_at)
                ],
            )
            .db()?;

            Ok(Notification {
                id: conn.last_insert_rowid(),
                target: target.to_string(),
                kind,
                reference_id,
                actor: actor.to_string(),
                text: text.to_string(),
                read: false,
                created_at,
            })
        })
    }

    /// Most recent notifications for `target`, newest first.
    pub fn list_notifications(&self, target: &str) -> ChatResult<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2"
                ))
                .db()?;
            let rows = stmt
                .query_map(rusqlite::params![target, NOTIFICATION_PAGE], NotificationRow::from_row)
                .db()?
                .collect::<Result<Vec<_>, _>>()
                .db()?;
            rows.into_iter().map(NotificationRow::into_notification).collect()
        })
    }

    pub fn unread_notification_count(&self, target: &str) -> ChatResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                    [target],
                    |row| row.get(0),
                )
                .db()?;
            Ok(count as u64)
        })
    }

    pub fn mark_all_notifications_read(&self, target: &str) -> ChatResult<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [target],
            )
            .db()
        })
    }

    /// Marks one notification read. Someone else's notification is reported
    /// as not found.
    pub fn mark_notification_read(&self, target: &str, id: NotificationId) -> ChatResult<()> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                    rusqlite::params![id, target],
                )
                .db()?;
            if updated == 0 {
                return Err(ChatError::not_found(format!("notification {}", id)));
            }
            Ok(())
        })
    }
}
