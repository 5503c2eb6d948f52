use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use chorus_types::api::MarkReadResponse;
use chorus_types::models::{GroupId, MessageBody, Target};

use crate::error::ApiResult;
use crate::middleware::Identity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

fn default_size() -> u32 {
    50
}

pub async fn send_direct(
    State(state): State<AppState>,
    Path(peer): Path<String>,
    Extension(Identity(identity)): Extension<Identity>,
    Json(body): Json<MessageBody>,
) -> ApiResult<impl IntoResponse> {
    let message = state.chat.send_direct(&identity, &peer, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn direct_history(
    State(state): State<AppState>,
    Path(peer): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let messages = state
        .chat
        .history(&identity, Target::User(peer), query.page, query.size)
        .await?;
    Ok(Json(messages))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(peer): Path<String>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.chat.mark_read(&identity, &peer).await?;
    Ok(Json(MarkReadResponse { updated }))
}

pub async fn send_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    Extension(Identity(identity)): Extension<Identity>,
    Json(body): Json<MessageBody>,
) -> ApiResult<impl IntoResponse> {
    let message = state.chat.send_group(&identity, group_id, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn group_history(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    Query(query): Query<HistoryQuery>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let messages = state
        .chat
        .history(&identity, Target::Group(group_id), query.page, query.size)
        .await?;
    Ok(Json(messages))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(Identity(identity)): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.chat.inbox(&identity).await?))
}
