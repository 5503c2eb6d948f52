use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use chorus_types::api::Claims;
use chorus_types::{ChatError, ChatResult};

/// Maps a bearer credential to a stable identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn resolve_identity(&self, token: &str) -> ChatResult<String>;
}

/// HS256 JWT verifier; signature and expiry are checked, `sub` is the identity.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn resolve_identity(&self, token: &str) -> ChatResult<String> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            ChatError::Auth(format!("invalid token: {}", e))
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(ChatError::Auth("token has no subject".into()));
        }
        Ok(data.claims.sub)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> ChatResult<&str> {
    let header = header.ok_or_else(|| ChatError::Auth("missing Authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ChatError::Auth("malformed Authorization header".into()))
}

/// Full header-to-identity path used at connect time and by HTTP middleware.
pub async fn authenticate(verifier: &dyn IdentityVerifier, header: Option<&str>) -> ChatResult<String> {
    let token = bearer_token(header)?;
    verifier.resolve_identity(token).await
}
