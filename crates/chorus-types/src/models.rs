use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

pub type MessageId = i64;
pub type GroupId = i64;
pub type NotificationId = i64;

/// Scope of every ordering query: an unordered identity pair or a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadKey {
    Direct { a: String, b: String },
    Group { group_id: GroupId },
}

impl ThreadKey {
    /// Builds a direct key; the pair is stored sorted so {a, b} == {b, a}.
    pub fn direct(x: &str, y: &str) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self::Direct {
            a: a.to_string(),
            b: b.to_string(),
        }
    }

    pub fn group(group_id: GroupId) -> Self {
        Self::Group { group_id }
    }

    pub fn involves(&self, identity: &str) -> bool {
        match self {
            Self::Direct { a, b } => a == identity || b == identity,
            Self::Group { .. } => false,
        }
    }
}

/// Either a single identity or a group, used for typing indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    User(String),
    Group(GroupId),
}

/// Content of a send. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub voice_url: Option<String>,
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Normalizes blank fields to `None` and rejects a body with nothing in it.
    pub fn validated(self) -> ChatResult<Self> {
        fn keep(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }

        let body = Self {
            content: keep(self.content),
            image_url: keep(self.image_url),
            voice_url: keep(self.voice_url),
        };

        if body.content.is_none() && body.image_url.is_none() && body.voice_url.is_none() {
            return Err(ChatError::InvalidContent(
                "message needs text, an image or a voice clip".into(),
            ));
        }
        Ok(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: MessageId,
    pub user: String,
    pub label: String,
}

/// A persisted message. Exactly one of `receiver` / `group_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub receiver: Option<String>,
    pub group_id: Option<GroupId>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub voice_url: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn thread_key(&self) -> ThreadKey {
        match (&self.receiver, self.group_id) {
            (_, Some(group_id)) => ThreadKey::group(group_id),
            (Some(receiver), None) => ThreadKey::direct(&self.sender, receiver),
            // Rows are written with one of the two set; treat a bare row as a note-to-self.
            (None, None) => ThreadKey::direct(&self.sender, &self.sender),
        }
    }

    /// The other party of a direct message, seen from `identity`.
    pub fn peer_of(&self, identity: &str) -> Option<&str> {
        let receiver = self.receiver.as_deref()?;
        if self.sender == identity {
            Some(receiver)
        } else if receiver == identity {
            Some(self.sender.as_str())
        } else {
            None
        }
    }
}

/// One inbox row: the latest message exchanged with `peer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub peer: String,
    pub last_message: Message,
    pub unread: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Message,
    Like,
    Comment,
    Follow,
    GroupInvite,
    GroupJoinRequest,
    GroupJoinApproved,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::Like => "LIKE",
            Self::Comment => "COMMENT",
            Self::Follow => "FOLLOW",
            Self::GroupInvite => "GROUP_INVITE",
            Self::GroupJoinRequest => "GROUP_JOIN_REQUEST",
            Self::GroupJoinApproved => "GROUP_JOIN_APPROVED",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "MESSAGE" => Self::Message,
            "LIKE" => Self::Like,
            "COMMENT" => Self::Comment,
            "FOLLOW" => Self::Follow,
            "GROUP_INVITE" => Self::GroupInvite,
            "GROUP_JOIN_REQUEST" => Self::GroupJoinRequest,
            "GROUP_JOIN_APPROVED" => Self::GroupJoinApproved,
            other => {
                return Err(ChatError::InvalidContent(format!(
                    "unknown notification kind {other}"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub target: String,
    pub kind: NotificationKind,
    pub reference_id: Option<i64>,
    pub actor: String,
    pub text: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
