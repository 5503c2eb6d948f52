mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chorus_api::media::LocalMediaStore;
use chorus_api::routes;
use chorus_api::state::{AppState, AppStateInner};
use chorus_gateway::auth::{JwtVerifier, authenticate};
use chorus_gateway::connection::{self, CommandHandler};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(chorus_db::Database::open(&config.db_path)?);

    // Shared state
    let state = AppStateInner::new(
        db,
        Arc::new(JwtVerifier::new(&config.jwt_secret)),
        Arc::new(LocalMediaStore::new(&config.media_dir, &config.public_url)),
    );

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = routes::router(state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Chorus server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Browsers cannot set headers on the upgrade request, so `?token=` is
/// accepted as the same credential.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| query.token.map(|t| format!("Bearer {}", t)));

    let auth = authenticate(state.verifier.as_ref(), credential.as_deref()).await;
    let dispatcher = state.dispatcher.clone();
    let handler: Arc<dyn CommandHandler> = state.chat.clone();

    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, handler, auth))
}
