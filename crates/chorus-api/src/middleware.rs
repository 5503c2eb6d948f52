use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use chorus_gateway::auth::authenticate;

use crate::error::ApiError;
use crate::state::AppState;

/// The verified caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct Identity(pub String);

/// Extract and validate the bearer token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let identity = authenticate(state.verifier.as_ref(), auth_header.as_deref()).await?;

    req.extensions_mut().insert(Identity(identity));
    Ok(next.run(req).await)
}
