use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by the store, the gateway and the HTTP layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("relationship blocked")]
    RelationshipBlocked,

    #[error("not a member of group {0}")]
    NotAMember(i64),

    #[error("not a participant of the conversation holding message {0}")]
    NotAParticipant(i64),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Wire name of a [`ChatError`], carried by gateway `ERROR` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthError,
    RelationshipBlocked,
    NotAMember,
    NotFound,
    InvalidContent,
    Internal,
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RelationshipBlocked => ErrorKind::RelationshipBlocked,
            Self::NotAMember(_) | Self::NotAParticipant(_) => ErrorKind::NotAMember,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Auth(_) => ErrorKind::AuthError,
            Self::InvalidContent(_) => ErrorKind::InvalidContent,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show a client. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
