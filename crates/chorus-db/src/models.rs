//! Database row types. These map directly to SQLite rows.
//! Distinct from chorus-types models to keep the DB layer independent.

use chorus_types::ChatResult;
use chorus_types::models::{Message, Notification};
use rusqlite::Row;

use crate::parse_timestamp;

pub const MESSAGE_COLUMNS: &str =
    "id, sender, receiver, group_id, content, image_url, voice_url, is_read, created_at";

pub const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, reference_id, actor, message, is_read, created_at";

pub struct MessageRow {
    pub id: i64,
    pub sender: String,
    pub receiver: Option<String>,
    pub group_id: Option<i64>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub voice_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl MessageRow {
    /// Reads a row selected with [`MESSAGE_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender: row.get(1)?,
            receiver: row.get(2)?,
            group_id: row.get(3)?,
            content: row.get(4)?,
            image_url: row.get(5)?,
            voice_url: row.get(6)?,
            is_read: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub fn into_message(self) -> ChatResult<Message> {
        Ok(Message {
            id: self.id,
            sender: self.sender,
            receiver: self.receiver,
            group_id: self.group_id,
            content: self.content,
            image_url: self.image_url,
            voice_url: self.voice_url,
            read: self.is_read,
            created_at: parse_timestamp(&self.created_at)?,
            reactions: Vec::new(),
        })
    }
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub reference_id: Option<i64>,
    pub actor: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    /// Reads a row selected with [`NOTIFICATION_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            reference_id: row.get(3)?,
            actor: row.get(4)?,
            message: row.get(5)?,
            is_read: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    pub fn into_notification(self) -> ChatResult<Notification> {
        Ok(Notification {
            id: self.id,
            target: self.user_id,
            kind: self.kind.parse()?,
            reference_id: self.reference_id,
            actor: self.actor,
            text: self.message,
            read: self.is_read,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
