use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ErrorKind};
use crate::models::{GroupId, Message, MessageBody, MessageId, Notification, Target, ThreadKey};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEvent {
    /// Server confirms the connection is bound to `identity`
    Ready { identity: String },

    /// A message was persisted in a thread this session takes part in
    Message(Message),

    /// `from` is typing, either to this identity or in `group_id`
    Typing {
        from: String,
        group_id: Option<GroupId>,
    },

    /// `reader` has read every message this identity sent them
    Read { reader: String },

    /// A reaction was set or replaced on a message
    Reaction {
        message_id: MessageId,
        thread: ThreadKey,
        user: String,
        label: String,
    },

    /// A notification was created for this identity
    Notification(Notification),

    /// A command from this session was rejected
    Error { kind: ErrorKind, message: String },
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "READY",
            Self::Message(_) => "MESSAGE",
            Self::Typing { .. } => "TYPING",
            Self::Read { .. } => "READ",
            Self::Reaction { .. } => "REACTION",
            Self::Notification(_) => "NOTIFICATION",
            Self::Error { .. } => "ERROR",
        }
    }

    pub fn error(err: &ChatError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.public_message(),
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayCommand {
    SendDirect {
        to: String,
        #[serde(flatten)]
        body: MessageBody,
    },

    SendGroup {
        group_id: GroupId,
        #[serde(flatten)]
        body: MessageBody,
    },

    Typing { target: Target },

    MarkRead { peer: String },

    React { message_id: MessageId, label: String },
}
