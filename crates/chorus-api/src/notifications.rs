use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

use chorus_types::api::{CreateNotificationRequest, MarkReadResponse, UnreadCountResponse};
use chorus_types::models::NotificationId;

use crate::error::ApiResult;
use crate::middleware::Identity;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.notifications.list(&identity).await?))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let count = state.notifications.unread_count(&identity).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.notifications.mark_all_read(&identity).await?;
    Ok(Json(MarkReadResponse { updated }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    state.notifications.mark_read(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Entry point for other platform services (likes, comments, follows,
/// invites). The caller is the actor; notifying yourself is a no-op.
///
/// Meant for trusted services only: any bearer may raise any kind with any
/// text for any target, so deployments keep this route off the public edge.
pub async fn create(
    State(state): State<AppState>,
    Extension(Identity(identity)): Extension<Identity>,
    Json(req): Json<CreateNotificationRequest>,
) -> ApiResult<Response> {
    if req.target == identity {
        debug!("Suppressed self-notification {} for {}", req.kind, identity);
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let notification = state
        .notifications
        .create(&req.target, req.kind, req.reference_id, &identity, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(notification)).into_response())
}
