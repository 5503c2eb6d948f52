use serde::{Deserialize, Serialize};

use crate::models::NotificationKind;

// -- JWT Claims --

/// Bearer token claims. `sub` is the verified identity string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    pub label: String,
}

// -- Read state --

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Notifications --

/// Raised by other platform services (likes, comments, follows, invites).
/// The actor is the authenticated caller.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNotificationRequest {
    pub target: String,
    pub kind: NotificationKind,
    #[serde(default)]
    pub reference_id: Option<i64>,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: u64,
}

// -- Media --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub size: u64,
}
