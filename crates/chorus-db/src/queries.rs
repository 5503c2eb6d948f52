use std::collections::HashMap;

use chorus_types::models::{
    Conversation, GroupId, Message, MessageBody, MessageId, Reaction, ThreadKey,
};
use chorus_types::{ChatError, ChatResult};
use rusqlite::Connection;
use tracing::debug;

use crate::models::{MESSAGE_COLUMNS, MessageRow};
use crate::roster::{blocked_between, group_exists, member_exists};
use crate::{Database, DbResultExt, format_timestamp};

/// Upper bound on a history page, whatever the caller asks for.
pub const MAX_PAGE_SIZE: u32 = 200;

impl Database {
    // -- Messages --

    /// Persists a direct message. Fails with `RelationshipBlocked` if either
    /// party blocked the other; nothing is written in that case.
    pub fn send_direct(&self, sender: &str, receiver: &str, body: MessageBody) -> ChatResult<Message> {
        let body = body.validated()?;

        self.with_conn(|conn| {
            if blocked_between(conn, sender, receiver)? {
                debug!("Direct send {} -> {} rejected: blocked", sender, receiver);
                return Err(ChatError::RelationshipBlocked);
            }

            let created_at = self.next_timestamp()?;
            let id = insert_message(conn, sender, Some(receiver), None, &body, &format_timestamp(&created_at))?;

            Ok(Message {
                id,
                sender: sender.to_string(),
                receiver: Some(receiver.to_string()),
                group_id: None,
                content: body.content,
                image_url: body.image_url,
                voice_url: body.voice_url,
                read: false,
                created_at,
                reactions: vec![],
            })
        })
    }

    /// Persists a group message after checking the sender against the
    /// current roster.
    pub fn send_group(&self, sender: &str, group_id: GroupId, body: MessageBody) -> ChatResult<Message> {
        let body = body.validated()?;

        self.with_conn(|conn| {
            if !group_exists(conn, group_id)? {
                return Err(ChatError::not_found(format!("group {}", group_id)));
            }
            if !member_exists(conn, group_id, sender)? {
                return Err(ChatError::NotAMember(group_id));
            }

            let created_at = self.next_timestamp()?;
            let id = insert_message(conn, sender, None, Some(group_id), &body, &format_timestamp(&created_at))?;

            Ok(Message {
                id,
                sender: sender.to_string(),
                receiver: None,
                group_id: Some(group_id),
                content: body.content,
                image_url: body.image_url,
                voice_url: body.voice_url,
                read: false,
                created_at,
                reactions: vec![],
            })
        })
    }

    pub fn get_message(&self, message_id: MessageId) -> ChatResult<Message> {
        self.with_conn(|conn| {
            let mut message = query_message(conn, message_id)?
                .ok_or_else(|| ChatError::not_found(format!("message {}", message_id)))?;
            message.reactions = query_reactions(conn, &[message_id])?;
            Ok(message)
        })
    }

    /// Flips the read flag on everything `peer` sent to `reader`.
    /// Returns the number of messages that were unread before the call.
    pub fn mark_read(&self, reader: &str, peer: &str) -> ChatResult<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE receiver = ?1 AND sender = ?2 AND group_id IS NULL AND is_read = 0",
                (reader, peer),
            )
            .db()
        })
    }

    /// One page of a thread, oldest first. Page 0 is the start of the thread.
    pub fn history(&self, thread: &ThreadKey, page: u32, page_size: u32) -> ChatResult<Vec<Message>> {
        let limit = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page) * i64::from(limit);

        self.with_conn(|conn| {
            let rows = match thread {
                ThreadKey::Direct { a, b } => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "SELECT {MESSAGE_COLUMNS} FROM messages
                             WHERE group_id IS NULL
                               AND ((sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1))
                             ORDER BY created_at ASC, id ASC
                             LIMIT ?3 OFFSET ?4"
                        ))
                        .db()?;
                    stmt.query_map(rusqlite::params![a, b, limit, offset], MessageRow::from_row)
                        .db()?
                        .collect::<Result<Vec<_>, _>>()
                        .db()?
                }
                ThreadKey::Group { group_id } => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "SELECT {MESSAGE_COLUMNS} FROM messages
                             WHERE group_id = ?1
                             ORDER BY created_at ASC, id ASC
                             LIMIT ?2 OFFSET ?3"
                        ))
                        .db()?;
                    stmt.query_map(rusqlite::params![group_id, limit, offset], MessageRow::from_row)
                        .db()?
                        .collect::<Result<Vec<_>, _>>()
                        .db()?
                }
            };

            let mut messages = rows
                .into_iter()
                .map(MessageRow::into_message)
                .collect::<ChatResult<Vec<_>>>()?;
            attach_reactions(conn, &mut messages)?;
            Ok(messages)
        })
    }

    /// Latest message per direct peer, newest conversation first.
    ///
    /// Single pass over every direct message touching `identity`, newest
    /// first: the first message seen for a peer is its latest one. Unread
    /// counts are accumulated in the same pass.
    pub fn inbox(&self, identity: &str) -> ChatResult<Vec<Conversation>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE group_id IS NULL AND (sender = ?1 OR receiver = ?1)
                     ORDER BY created_at DESC, id DESC"
                ))
                .db()?;
            let rows = stmt.query_map([identity], MessageRow::from_row).db()?;

            let mut conversations: Vec<Conversation> = Vec::new();
            let mut by_peer: HashMap<String, usize> = HashMap::new();

            for row in rows {
                let message = row.db()?.into_message()?;
                let Some(peer) = message.peer_of(identity).map(str::to_string) else {
                    continue;
                };
                let unread = message.receiver.as_deref() == Some(identity) && !message.read;

                let idx = match by_peer.get(&peer) {
                    Some(&idx) => idx,
                    None => {
                        by_peer.insert(peer.clone(), conversations.len());
                        conversations.push(Conversation {
                            peer,
                            last_message: message,
                            unread: 0,
                        });
                        conversations.len() - 1
                    }
                };
                if unread {
                    conversations[idx].unread += 1;
                }
            }

            Ok(conversations)
        })
    }

    // -- Reactions --

    /// Sets `identity`'s reaction on a message, replacing any earlier label.
    /// Only participants of the message's thread may react.
    pub fn react(&self, message_id: MessageId, identity: &str, label: &str) -> ChatResult<(ThreadKey, Reaction)> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ChatError::InvalidContent("reaction label is empty".into()));
        }

        self.with_conn(|conn| {
            let message = query_message(conn, message_id)?
                .ok_or_else(|| ChatError::not_found(format!("message {}", message_id)))?;

            let thread = message.thread_key();
            match &thread {
                ThreadKey::Direct { .. } if !thread.involves(identity) => {
                    return Err(ChatError::NotAParticipant(message_id));
                }
                ThreadKey::Group { group_id } if !member_exists(conn, *group_id, identity)? => {
                    return Err(ChatError::NotAMember(*group_id));
                }
                _ => {}
            }

            let updated_at = self.next_timestamp()?;
            conn.execute(
                "INSERT INTO message_reactions (message_id, user_id, reaction, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(message_id, user_id)
                 DO UPDATE SET reaction = excluded.reaction, updated_at = excluded.updated_at",
                rusqlite::params![message_id, identity, label, format_timestamp(&updated_at)],
            )
            .db()?;

            Ok((
                thread,
                Reaction {
                    message_id,
                    user: identity.to_string(),
                    label: label.to_string(),
                },
            ))
        })
    }
}

fn insert_message(
    conn: &Connection,
    sender: &str,
    receiver: Option<&str>,
    group_id: Option<GroupId>,
    body: &MessageBody,
    created_at: &str,
) -> ChatResult<MessageId> {
    conn.execute(
        "INSERT INTO messages (sender, receiver, group_id, content, image_url, voice_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            sender,
            receiver,
            group_id,
            body.content,
            body.image_url,
            body.voice_url,
            created_at
        ],
    )
    .db()?;
    Ok(conn.last_insert_rowid())
}

fn query_message(conn: &Connection, message_id: MessageId) -> ChatResult<Option<Message>> {
    let row = conn
        .query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            [message_id],
            MessageRow::from_row,
        )
        .optional()?;
    row.map(MessageRow::into_message).transpose()
}

fn query_reactions(conn: &Connection, message_ids: &[MessageId]) -> ChatResult<Vec<Reaction>> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, user_id, reaction FROM message_reactions
         WHERE message_id IN ({})
         ORDER BY message_id, user_id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql).db()?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(message_ids), |row| {
            Ok(Reaction {
                message_id: row.get(0)?,
                user: row.get(1)?,
                label: row.get(2)?,
            })
        })
        .db()?
        .collect::<Result<Vec<_>, _>>()
        .db()?;

    Ok(rows)
}

fn attach_reactions(conn: &Connection, messages: &mut [Message]) -> ChatResult<()> {
    let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
    let mut by_message: HashMap<MessageId, Vec<Reaction>> = HashMap::new();
    for reaction in query_reactions(conn, &ids)? {
        by_message.entry(reaction.message_id).or_default().push(reaction);
    }
    for message in messages {
        message.reactions = by_message.remove(&message.id).unwrap_or_default();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn text(s: &str) -> MessageBody {
        MessageBody::text(s)
    }

    #[test]
    fn direct_send_is_persisted_unread() {
        let db = db();
        let msg = db.send_direct("alice", "bob", text("hi")).unwrap();

        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.receiver.as_deref(), Some("bob"));
        assert_eq!(msg.group_id, None);
        assert_eq!(msg.content.as_deref(), Some("hi"));
        assert!(!msg.read);

        let history = db.history(&ThreadKey::direct("bob", "alice"), 0, 50).unwrap();
        assert_eq!(history, vec![msg]);
    }

    #[test]
    fn empty_body_writes_nothing() {
        let db = db();
        let err = db.send_direct("alice", "bob", MessageBody::default()).unwrap_err();
        assert!(matches!(err, ChatError::InvalidContent(_)));
        assert!(db.history(&ThreadKey::direct("alice", "bob"), 0, 50).unwrap().is_empty());
    }

    #[test]
    fn blocks_reject_both_directions() {
        let db = db();
        db.block("bob", "alice").unwrap();

        assert_eq!(
            db.send_direct("alice", "bob", text("hi")).unwrap_err(),
            ChatError::RelationshipBlocked
        );
        assert_eq!(
            db.send_direct("bob", "alice", text("hi")).unwrap_err(),
            ChatError::RelationshipBlocked
        );
        assert!(db.history(&ThreadKey::direct("alice", "bob"), 0, 50).unwrap().is_empty());

        db.unblock("bob", "alice").unwrap();
        assert!(db.send_direct("alice", "bob", text("hi")).is_ok());
    }

    #[test]
    fn group_send_requires_membership() {
        let db = db();
        let group = db.create_group("climbers", &["alice", "bob", "carol"]).unwrap();

        let msg = db.send_group("alice", group.id, text("hi all")).unwrap();
        assert_eq!(msg.group_id, Some(group.id));
        assert_eq!(msg.receiver, None);

        assert_eq!(
            db.send_group("mallory", group.id, text("hey")).unwrap_err(),
            ChatError::NotAMember(group.id)
        );
        assert!(matches!(
            db.send_group("alice", group.id + 100, text("hey")),
            Err(ChatError::NotFound(_))
        ));

        let history = db.history(&ThreadKey::group(group.id), 0, 50).unwrap();
        assert_eq!(history, vec![msg]);
    }

    #[test]
    fn history_is_ordered_and_paginated() {
        let db = db();
        let mut sent = Vec::new();
        for i in 0..7 {
            let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            sent.push(db.send_direct(from, to, text(&format!("m{}", i))).unwrap());
        }
        // Unrelated thread must not leak in
        db.send_direct("alice", "carol", text("other")).unwrap();

        let thread = ThreadKey::direct("alice", "bob");
        let mut all = Vec::new();
        for page in 0..3 {
            all.extend(db.history(&thread, page, 3).unwrap());
        }
        assert_eq!(all.len(), 7);
        assert_eq!(all, sent);
        assert!(
            all.windows(2)
                .all(|w| (w[0].created_at, w[0].id) < (w[1].created_at, w[1].id))
        );
        assert!(db.history(&thread, 3, 3).unwrap().is_empty());

        let ids: HashSet<_> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn page_size_is_clamped() {
        let db = db();
        db.send_direct("alice", "bob", text("a")).unwrap();
        db.send_direct("alice", "bob", text("b")).unwrap();
        assert_eq!(db.history(&ThreadKey::direct("alice", "bob"), 0, 0).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_is_idempotent_and_one_directional() {
        let db = db();
        db.send_direct("alice", "bob", text("1")).unwrap();
        db.send_direct("alice", "bob", text("2")).unwrap();
        db.send_direct("bob", "alice", text("3")).unwrap();

        assert_eq!(db.mark_read("bob", "alice").unwrap(), 2);
        let after_once = db.history(&ThreadKey::direct("alice", "bob"), 0, 50).unwrap();
        assert_eq!(db.mark_read("bob", "alice").unwrap(), 0);
        let after_twice = db.history(&ThreadKey::direct("alice", "bob"), 0, 50).unwrap();
        assert_eq!(after_once, after_twice);

        let read: Vec<bool> = after_twice.iter().map(|m| m.read).collect();
        assert_eq!(read, vec![true, true, false]);
    }

    #[test]
    fn inbox_keeps_latest_message_per_peer() {
        let db = db();
        db.send_direct("alice", "bob", text("old bob")).unwrap();
        db.send_direct("carol", "alice", text("carol 1")).unwrap();
        let latest_bob = db.send_direct("bob", "alice", text("new bob")).unwrap();
        let latest_carol = db.send_direct("carol", "alice", text("carol 2")).unwrap();
        let group = db.create_group("g", &["alice", "bob"]).unwrap();
        db.send_group("bob", group.id, text("group noise")).unwrap();

        let inbox = db.inbox("alice").unwrap();
        let peers: Vec<&str> = inbox.iter().map(|c| c.peer.as_str()).collect();
        assert_eq!(peers, vec!["carol", "bob"]);
        assert_eq!(inbox[0].last_message.id, latest_carol.id);
        assert_eq!(inbox[0].unread, 2);
        assert_eq!(inbox[1].last_message.id, latest_bob.id);
        assert_eq!(inbox[1].unread, 1);

        db.mark_read("alice", "carol").unwrap();
        assert_eq!(db.inbox("alice").unwrap()[0].unread, 0);
    }

    #[test]
    fn second_reaction_replaces_the_first() {
        let db = db();
        let msg = db.send_direct("alice", "bob", text("hi")).unwrap();

        db.react(msg.id, "bob", "LIKE").unwrap();
        let (thread, reaction) = db.react(msg.id, "bob", "LOVE").unwrap();
        assert_eq!(thread, ThreadKey::direct("alice", "bob"));
        assert_eq!(reaction.label, "LOVE");

        let fetched = db.get_message(msg.id).unwrap();
        assert_eq!(
            fetched.reactions,
            vec![Reaction {
                message_id: msg.id,
                user: "bob".into(),
                label: "LOVE".into(),
            }]
        );
    }

    #[test]
    fn reactions_are_limited_to_participants() {
        let db = db();
        let msg = db.send_direct("alice", "bob", text("hi")).unwrap();
        let err = db.react(msg.id, "carol", "LIKE").unwrap_err();
        assert_eq!(err, ChatError::NotAParticipant(msg.id));
        assert!(!err.to_string().contains("group"));
        assert!(matches!(db.react(msg.id + 1, "bob", "LIKE"), Err(ChatError::NotFound(_))));
        assert!(matches!(db.react(msg.id, "bob", "  "), Err(ChatError::InvalidContent(_))));

        let group = db.create_group("g", &["alice", "bob"]).unwrap();
        let gmsg = db.send_group("alice", group.id, text("yo")).unwrap();
        assert!(db.react(gmsg.id, "bob", "LAUGH").is_ok());
        assert_eq!(
            db.react(gmsg.id, "carol", "LAUGH").unwrap_err(),
            ChatError::NotAMember(group.id)
        );
    }
}
