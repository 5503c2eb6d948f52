//! Group membership and block relations.
//!
//! Both are owned by other platform services; this store only reads them on
//! the send path. The write helpers exist for seeding and tests.

use chorus_types::models::{Group, GroupId};
use chorus_types::{ChatError, ChatResult};
use rusqlite::Connection;

use crate::{Database, DbResultExt};

impl Database {
    // -- Groups --

    pub fn create_group(&self, name: &str, members: &[&str]) -> ChatResult<Group> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().db()?;
            tx.execute("INSERT INTO chat_groups (name) VALUES (?1)", [name]).db()?;
            let id = tx.last_insert_rowid();
            for member in members {
                tx.execute(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                    rusqlite::params![id, member],
                )
                .db()?;
            }
            tx.commit().db()?;
            Ok(Group {
                id,
                name: name.to_string(),
            })
        })
    }

    pub fn add_member(&self, group_id: GroupId, identity: &str) -> ChatResult<()> {
        self.with_conn(|conn| {
            if !group_exists(conn, group_id)? {
                return Err(ChatError::not_found(format!("group {}", group_id)));
            }
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![group_id, identity],
            )
            .db()?;
            Ok(())
        })
    }

    pub fn remove_member(&self, group_id: GroupId, identity: &str) -> ChatResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                rusqlite::params![group_id, identity],
            )
            .db()?;
            Ok(())
        })
    }

    /// Current member set, read fresh on every call.
    pub fn members_of(&self, group_id: GroupId) -> ChatResult<Vec<String>> {
        self.with_conn(|conn| {
            if !group_exists(conn, group_id)? {
                return Err(ChatError::not_found(format!("group {}", group_id)));
            }
            let mut stmt = conn
                .prepare("SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY user_id")
                .db()?;
            let members = stmt
                .query_map([group_id], |row| row.get(0))
                .db()?
                .collect::<Result<Vec<String>, _>>()
                .db()?;
            Ok(members)
        })
    }

    pub fn is_member(&self, group_id: GroupId, identity: &str) -> ChatResult<bool> {
        self.with_conn(|conn| member_exists(conn, group_id, identity))
    }

    // -- Blocks --

    pub fn block(&self, blocker: &str, blocked: &str) -> ChatResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blocks (blocker, blocked) VALUES (?1, ?2)",
                (blocker, blocked),
            )
            .db()?;
            Ok(())
        })
    }

    pub fn unblock(&self, blocker: &str, blocked: &str) -> ChatResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM blocks WHERE blocker = ?1 AND blocked = ?2",
                (blocker, blocked),
            )
            .db()?;
            Ok(())
        })
    }

    /// True if either identity has blocked the other.
    pub fn is_blocked_between(&self, a: &str, b: &str) -> ChatResult<bool> {
        self.with_conn(|conn| blocked_between(conn, a, b))
    }
}

pub(crate) fn blocked_between(conn: &Connection, a: &str, b: &str) -> ChatResult<bool> {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM blocks
            WHERE (blocker = ?1 AND blocked = ?2) OR (blocker = ?2 AND blocked = ?1)
        )",
        (a, b),
        |row| row.get(0),
    )
    .db()
}

pub(crate) fn group_exists(conn: &Connection, group_id: GroupId) -> ChatResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chat_groups WHERE id = ?1)",
        [group_id],
        |row| row.get(0),
    )
    .db()
}

pub(crate) fn member_exists(conn: &Connection, group_id: GroupId, identity: &str) -> ChatResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2)",
        rusqlite::params![group_id, identity],
        |row| row.get(0),
    )
    .db()
}
