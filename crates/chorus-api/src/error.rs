use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use chorus_types::ChatError;

/// HTTP face of [`ChatError`].
#[derive(Debug)]
pub struct ApiError(pub ChatError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ChatError::RelationshipBlocked
            | ChatError::NotAMember(_)
            | ChatError::NotAParticipant(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Auth(_) => StatusCode::UNAUTHORIZED,
            ChatError::InvalidContent(_) => StatusCode::BAD_REQUEST,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ChatError::Storage(detail) = &self.0 {
            error!("Request failed in storage: {}", detail);
        }

        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.public_message(),
        }));
        (self.status(), body).into_response()
    }
}
