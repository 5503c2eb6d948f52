use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use chorus_types::api::ReactRequest;
use chorus_types::models::MessageId;

use crate::error::ApiResult;
use crate::middleware::Identity;
use crate::state::AppState;

/// Sets the caller's reaction on a message; a repeat call replaces the label.
pub async fn react(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(Identity(identity)): Extension<Identity>,
    Json(req): Json<ReactRequest>,
) -> ApiResult<impl IntoResponse> {
    let reaction = state.chat.react(&identity, message_id, &req.label).await?;
    Ok(Json(reaction))
}
