use std::path::PathBuf;

use async_trait::async_trait;
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use uuid::Uuid;

use chorus_types::api::UploadResponse;
use chorus_types::{ChatError, ChatResult};

use crate::error::ApiResult;
use crate::state::AppState;

/// 50 MB upload limit for image and voice attachments
pub const MAX_MEDIA_SIZE: usize = 50 * 1024 * 1024;

/// Bytes in, stable URL out.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, bytes: Bytes) -> ChatResult<String>;
    async fn load(&self, id: &str) -> ChatResult<Vec<u8>>;
}

/// Single-node store: one file per upload under `root`, named by a v4 uuid.
pub struct LocalMediaStore {
    root: PathBuf,
    public_base: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn io_error(what: &str, e: std::io::Error) -> ChatError {
        error!("Media {} failed: {}", what, e);
        ChatError::Storage(format!("media {}: {}", what, e))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, bytes: Bytes) -> ChatResult<String> {
        if bytes.is_empty() {
            return Err(ChatError::InvalidContent("empty upload".into()));
        }
        if bytes.len() > MAX_MEDIA_SIZE {
            return Err(ChatError::InvalidContent(format!(
                "upload exceeds {} bytes",
                MAX_MEDIA_SIZE
            )));
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::io_error("directory create", e))?;

        let id = Uuid::new_v4().to_string();
        let mut file = tokio::fs::File::create(self.root.join(&id))
            .await
            .map_err(|e| Self::io_error("create", e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| Self::io_error("write", e))?;
        file.flush().await.map_err(|e| Self::io_error("flush", e))?;

        debug!("Stored media {} ({} bytes)", id, bytes.len());
        Ok(format!("{}/media/{}", self.public_base, id))
    }

    async fn load(&self, id: &str) -> ChatResult<Vec<u8>> {
        // Only uuids ever reach the filesystem
        let id: Uuid = id
            .parse()
            .map_err(|_| ChatError::not_found(format!("media {}", id)))?;

        match tokio::fs::read(self.root.join(id.to_string())).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ChatError::not_found(format!("media {}", id)))
            }
            Err(e) => Err(Self::io_error("read", e)),
        }
    }
}

/// POST /media: raw bytes (application/octet-stream), returns { url, size }.
pub async fn upload_media(
    State(state): State<AppState>,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let size = bytes.len() as u64;
    let url = state.media.store(bytes).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { url, size })))
}

/// GET /media/{id}: returns the stored blob.
pub async fn download_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.media.load(&id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}
