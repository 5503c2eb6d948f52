use chorus_types::ChatResult;
use rusqlite::Connection;
use tracing::info;

use crate::DbResultExt;

pub fn run(conn: &Connection) -> ChatResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chat_groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    INTEGER NOT NULL REFERENCES chat_groups(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            joined_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS blocks (
            blocker     TEXT NOT NULL,
            blocked     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (blocker, blocked)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender      TEXT NOT NULL,
            receiver    TEXT,
            group_id    INTEGER REFERENCES chat_groups(id),
            content     TEXT,
            image_url   TEXT,
            voice_url   TEXT,
            is_read     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            CHECK ((receiver IS NULL) <> (group_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender, receiver, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_receiver
            ON messages(receiver, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, created_at, id);

        CREATE TABLE IF NOT EXISTS message_reactions (
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            reaction    TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT NOT NULL,
            kind          TEXT NOT NULL,
            reference_id  INTEGER,
            actor         TEXT NOT NULL,
            message       TEXT NOT NULL,
            is_read       INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )
    .db()?;

    info!("Database migrations complete");
    Ok(())
}
