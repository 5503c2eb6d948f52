use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

use crate::media::{self, MAX_MEDIA_SIZE};
use crate::messages;
use crate::middleware::require_auth;
use crate::notifications;
use crate::reactions;
use crate::state::AppState;

/// HTTP surface. The WebSocket gateway is mounted by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/media/{id}", get(media::download_media))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/chat/inbox", get(messages::inbox))
        .route(
            "/chat/direct/{peer}",
            get(messages::direct_history).post(messages::send_direct),
        )
        .route("/chat/direct/{peer}/read", post(messages::mark_read))
        .route(
            "/chat/groups/{group_id}",
            get(messages::group_history).post(messages::send_group),
        )
        .route("/chat/messages/{message_id}/reactions", post(reactions::react))
        .route(
            "/media",
            post(media::upload_media).layer(DefaultBodyLimit::max(MAX_MEDIA_SIZE)),
        )
        .route(
            "/notifications",
            get(notifications::list).post(notifications::create),
        )
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use chorus_db::Database;
    use chorus_gateway::auth::JwtVerifier;
    use chorus_types::api::Claims;

    use super::*;
    use crate::media::LocalMediaStore;
    use crate::state::AppStateInner;

    const SECRET: &str = "route-test-secret";

    struct TestApp {
        app: Router,
        db: Arc<Database>,
        _media_dir: tempfile::TempDir,
    }

    fn setup() -> TestApp {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let media_dir = tempfile::tempdir().unwrap();
        let media = LocalMediaStore::new(media_dir.path(), "http://chorus.test");
        let state = AppStateInner::new(
            db.clone(),
            Arc::new(JwtVerifier::new(SECRET)),
            Arc::new(media),
        );
        TestApp {
            app: router(state),
            db,
            _media_dir: media_dir,
        }
    }

    fn token(identity: &str) -> String {
        let claims = Claims {
            sub: identity.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        identity: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(identity) = identity {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token(identity)));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let t = setup();
        let (status, _) = call(&t.app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_token() {
        let t = setup();
        let (status, body) = call(&t.app, Method::GET, "/chat/inbox", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "AUTH_ERROR");
    }

    #[tokio::test]
    async fn direct_send_shows_up_in_both_histories_and_inbox() {
        let t = setup();
        let (status, sent) = call(
            &t.app,
            Method::POST,
            "/chat/direct/bob",
            Some("alice"),
            Some(json!({ "content": "hello bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["sender"], "alice");
        assert_eq!(sent["receiver"], "bob");

        let (_, bob_view) = call(&t.app, Method::GET, "/chat/direct/alice", Some("bob"), None).await;
        let (_, alice_view) = call(&t.app, Method::GET, "/chat/direct/bob", Some("alice"), None).await;
        assert_eq!(bob_view, alice_view);
        assert_eq!(bob_view.as_array().unwrap().len(), 1);

        let (status, inbox) = call(&t.app, Method::GET, "/chat/inbox", Some("bob"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(inbox[0]["peer"], "alice");
        assert_eq!(inbox[0]["unread"], 1);
    }

    #[tokio::test]
    async fn mark_read_reports_rows_flipped() {
        let t = setup();
        for text in ["one", "two"] {
            call(
                &t.app,
                Method::POST,
                "/chat/direct/bob",
                Some("alice"),
                Some(json!({ "content": text })),
            )
            .await;
        }

        let (_, first) = call(&t.app, Method::POST, "/chat/direct/alice/read", Some("bob"), None).await;
        let (_, second) = call(&t.app, Method::POST, "/chat/direct/alice/read", Some("bob"), None).await;
        assert_eq!(first["updated"], 2);
        assert_eq!(second["updated"], 0);
    }

    #[tokio::test]
    async fn blocked_send_is_forbidden() {
        let t = setup();
        t.db.block("bob", "alice").unwrap();

        let (status, body) = call(
            &t.app,
            Method::POST,
            "/chat/direct/bob",
            Some("alice"),
            Some(json!({ "content": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "RELATIONSHIP_BLOCKED");
    }

    #[tokio::test]
    async fn empty_message_is_a_bad_request() {
        let t = setup();
        let (status, body) = call(
            &t.app,
            Method::POST,
            "/chat/direct/bob",
            Some("alice"),
            Some(json!({ "content": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_CONTENT");
    }

    #[tokio::test]
    async fn group_routes_enforce_membership() {
        let t = setup();
        let group = t.db.create_group("climbers", &["alice", "bob"]).unwrap();
        let uri = format!("/chat/groups/{}", group.id);

        let (status, _) = call(&t.app, Method::POST, &uri, Some("alice"), Some(json!({ "content": "send" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&t.app, Method::GET, &uri, Some("mallory"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "NOT_A_MEMBER");

        let (status, _) = call(&t.app, Method::GET, "/chat/groups/999", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_paging_uses_query_params() {
        let t = setup();
        for i in 0..5 {
            call(
                &t.app,
                Method::POST,
                "/chat/direct/bob",
                Some("alice"),
                Some(json!({ "content": format!("m{}", i) })),
            )
            .await;
        }

        let (_, page) = call(&t.app, Method::GET, "/chat/direct/bob?page=1&size=2", Some("alice"), None).await;
        let contents: Vec<&str> = page
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn reaction_route_upserts_label() {
        let t = setup();
        let (_, sent) = call(
            &t.app,
            Method::POST,
            "/chat/direct/bob",
            Some("alice"),
            Some(json!({ "content": "react to me" })),
        )
        .await;
        let uri = format!("/chat/messages/{}/reactions", sent["id"]);

        call(&t.app, Method::POST, &uri, Some("bob"), Some(json!({ "label": "like" }))).await;
        let (status, reaction) =
            call(&t.app, Method::POST, &uri, Some("bob"), Some(json!({ "label": "love" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reaction["label"], "love");

        let (_, history) = call(&t.app, Method::GET, "/chat/direct/alice", Some("bob"), None).await;
        assert_eq!(history[0]["reactions"].as_array().unwrap().len(), 1);

        let (status, _) =
            call(&t.app, Method::POST, &uri, Some("mallory"), Some(json!({ "label": "like" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn direct_send_creates_a_readable_notification() {
        let t = setup();
        call(
            &t.app,
            Method::POST,
            "/chat/direct/bob",
            Some("alice"),
            Some(json!({ "content": "ping" })),
        )
        .await;

        let (_, count) = call(&t.app, Method::GET, "/notifications/unread-count", Some("bob"), None).await;
        assert_eq!(count["count"], 1);

        let (_, list) = call(&t.app, Method::GET, "/notifications", Some("bob"), None).await;
        assert_eq!(list[0]["kind"], "MESSAGE");
        assert_eq!(list[0]["text"], "alice sent you a message");

        let uri = format!("/notifications/{}/read", list[0]["id"]);
        let (status, _) = call(&t.app, Method::POST, &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&t.app, Method::POST, &uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, count) = call(&t.app, Method::GET, "/notifications/unread-count", Some("bob"), None).await;
        assert_eq!(count["count"], 0);
    }

    #[tokio::test]
    async fn external_notifications_suppress_self_target() {
        let t = setup();
        let (status, _) = call(
            &t.app,
            Method::POST,
            "/notifications",
            Some("alice"),
            Some(json!({ "target": "alice", "kind": "LIKE", "reference_id": 4, "text": "liked" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, created) = call(
            &t.app,
            Method::POST,
            "/notifications",
            Some("alice"),
            Some(json!({ "target": "bob", "kind": "FOLLOW", "text": "alice followed you" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["actor"], "alice");

        let (_, updated) = call(&t.app, Method::POST, "/notifications/read", Some("bob"), None).await;
        assert_eq!(updated["updated"], 1);
    }

    #[tokio::test]
    async fn media_upload_then_public_download() {
        let t = setup();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/media")
            .header(header::AUTHORIZATION, format!("Bearer {}", token("alice")))
            .body(Body::from("png-bytes"))
            .unwrap();
        let res = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let uploaded: Value = serde_json::from_slice(&bytes).unwrap();
        let url = uploaded["url"].as_str().unwrap();
        let path = url.strip_prefix("http://chorus.test").unwrap();

        let res = t
            .app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"png-bytes");
    }
}
