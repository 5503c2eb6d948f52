pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod fanout;
pub mod registry;

use chorus_types::{ChatError, ChatResult};

/// Runs a blocking store call off the async runtime.
pub async fn blocking<F, T>(f: F) -> ChatResult<T>
where
    F: FnOnce() -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChatError::Storage(format!("spawn_blocking join error: {}", e)))?
}
