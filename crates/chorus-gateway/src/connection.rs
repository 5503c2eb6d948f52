use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chorus_types::events::{GatewayCommand, GatewayEvent};
use chorus_types::{ChatError, ChatResult};

use crate::dispatcher::Dispatcher;
use crate::registry::Payload;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Application side of the gateway: executes commands from bound sessions.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, identity: &str, command: GatewayCommand) -> ChatResult<()>;
}

/// Drives one WebSocket connection.
///
/// `auth` is the outcome of the connect-time credential check. On success the
/// identity is bound in the registry until the socket closes. On failure the
/// socket stays open but is never bound, and every command is answered with
/// an `AUTH_ERROR`.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    handler: Arc<dyn CommandHandler>,
    auth: ChatResult<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Payload>();

    let identity = match auth {
        Ok(identity) => Some(identity),
        Err(e) => {
            warn!("Gateway connection left unauthenticated: {}", e);
            push(&tx, &GatewayEvent::error(&e));
            None
        }
    };

    let conn_id = identity.as_deref().map(|identity| {
        let conn_id = dispatcher.registry().bind(identity, tx.clone());
        info!("{} connected to gateway ({})", identity, conn_id);
        push(
            &tx,
            &GatewayEvent::Ready {
                identity: identity.to_string(),
            },
        );
        conn_id
    });

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued payloads -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                payload = rx.recv() => {
                    let Some(payload) = payload else { break };
                    if sender.send(Message::Text(payload.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let cmd = match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(cmd) => cmd,
                        Err(e) => {
                            warn!(
                                "{} bad command: {} -- raw: {}",
                                recv_identity.as_deref().unwrap_or("<unauthenticated>"),
                                e,
                                text.chars().take(200).collect::<String>()
                            );
                            continue;
                        }
                    };

                    let result = match recv_identity.as_deref() {
                        Some(identity) => handler.handle(identity, cmd).await,
                        None => Err(ChatError::Auth("connection is not authenticated".into())),
                    };
                    if let Err(e) = result {
                        debug!("Command rejected: {}", e);
                        push(&tx, &GatewayEvent::error(&e));
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let (Some(identity), Some(conn_id)) = (identity.as_deref(), conn_id) {
        dispatcher.registry().unbind(identity, conn_id);
        info!("{} disconnected from gateway ({})", identity, conn_id);
    }
}

/// Queue an event for this connection only.
fn push(tx: &mpsc::UnboundedSender<Payload>, event: &GatewayEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = tx.send(Payload::from(json));
        }
        Err(e) => warn!("Failed to serialize {} event: {}", event.kind(), e),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use axum::{
        Router,
        extract::{State, WebSocketUpgrade},
        http::{HeaderMap, header},
        response::IntoResponse,
        routing::get,
    };
    use serde_json::{Value, json};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    use super::*;
    use crate::auth::{IdentityVerifier, authenticate};
    use crate::registry::SessionRegistry;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Accepts `<identity>-token`, rejects everything else.
    struct TokenTable;

    #[async_trait]
    impl IdentityVerifier for TokenTable {
        async fn resolve_identity(&self, token: &str) -> ChatResult<String> {
            token
                .strip_suffix("-token")
                .map(str::to_string)
                .ok_or_else(|| ChatError::Auth("unknown token".into()))
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandHandler for RecordingHandler {
        async fn handle(&self, identity: &str, _command: GatewayCommand) -> ChatResult<()> {
            self.seen.lock().unwrap().push(identity.to_string());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct TestGateway {
        dispatcher: Dispatcher,
        handler: Arc<dyn CommandHandler>,
    }

    async fn upgrade(
        State(gateway): State<TestGateway>,
        headers: HeaderMap,
        ws: WebSocketUpgrade,
    ) -> impl IntoResponse {
        let credential = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let auth = authenticate(&TokenTable, credential.as_deref()).await;
        ws.on_upgrade(move |socket| {
            handle_connection(socket, gateway.dispatcher, gateway.handler, auth)
        })
    }

    async fn spawn_gateway() -> (SocketAddr, Dispatcher, Arc<RecordingHandler>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dispatcher = Dispatcher::new(SessionRegistry::new());
        let handler = Arc::new(RecordingHandler::default());
        let app = Router::new()
            .route("/gateway", get(upgrade))
            .with_state(TestGateway {
                dispatcher: dispatcher.clone(),
                handler: handler.clone(),
            });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, dispatcher, handler)
    }

    async fn connect(addr: SocketAddr, token: Option<&str>) -> Client {
        let mut req = format!("ws://{}/gateway", addr).into_client_request().unwrap();
        if let Some(token) = token {
            req.headers_mut().insert(
                tungstenite::http::header::AUTHORIZATION,
                format!("Bearer {}", token).parse().unwrap(),
            );
        }
        let (ws, _) = tokio_tungstenite::connect_async(req).await.unwrap();
        ws
    }

    async fn next_event(ws: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("no event within 5s")
                .unwrap()
                .unwrap();
            if let tungstenite::Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn send_command(ws: &mut Client, command: Value) {
        ws.send(tungstenite::Message::Text(command.to_string().into()))
            .await
            .unwrap();
    }

    async fn wait_until(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    fn mark_read() -> Value {
        json!({ "type": "MARK_READ", "data": { "peer": "bob" } })
    }

    #[tokio::test]
    async fn bad_token_is_never_bound_and_commands_get_auth_errors() {
        let (addr, dispatcher, handler) = spawn_gateway().await;
        let mut ws = connect(addr, Some("forged")).await;

        let greeting = next_event(&mut ws).await;
        assert_eq!(greeting["type"], "ERROR");
        assert_eq!(greeting["data"]["kind"], "AUTH_ERROR");

        send_command(&mut ws, mark_read()).await;
        let reply = next_event(&mut ws).await;
        assert_eq!(reply["type"], "ERROR");
        assert_eq!(reply["data"]["kind"], "AUTH_ERROR");

        assert_eq!(dispatcher.registry().online_count(), 0);
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_header_is_treated_like_a_bad_token() {
        let (addr, dispatcher, _) = spawn_gateway().await;
        let mut ws = connect(addr, None).await;

        assert_eq!(next_event(&mut ws).await["data"]["kind"], "AUTH_ERROR");
        assert_eq!(dispatcher.registry().online_count(), 0);
    }

    #[tokio::test]
    async fn good_token_gets_ready_and_receives_deliveries() {
        let (addr, dispatcher, handler) = spawn_gateway().await;
        let mut ws = connect(addr, Some("alice-token")).await;

        let ready = next_event(&mut ws).await;
        assert_eq!(ready["type"], "READY");
        assert_eq!(ready["data"]["identity"], "alice");
        assert_eq!(dispatcher.registry().connections_for("alice").len(), 1);

        let reached = dispatcher.deliver(
            "alice",
            &GatewayEvent::Read {
                reader: "bob".into(),
            },
        );
        assert_eq!(reached, 1);
        let event = next_event(&mut ws).await;
        assert_eq!(event["type"], "READ");
        assert_eq!(event["data"]["reader"], "bob");

        send_command(&mut ws, mark_read()).await;
        wait_until(|| handler.seen.lock().unwrap().len() == 1).await;
        assert_eq!(handler.seen.lock().unwrap()[0], "alice");
    }

    #[tokio::test]
    async fn closing_one_socket_unbinds_only_that_connection() {
        let (addr, dispatcher, _) = spawn_gateway().await;
        let mut phone = connect(addr, Some("alice-token")).await;
        let mut laptop = connect(addr, Some("alice-token")).await;
        assert_eq!(next_event(&mut phone).await["type"], "READY");
        assert_eq!(next_event(&mut laptop).await["type"], "READY");
        assert_eq!(dispatcher.registry().connections_for("alice").len(), 2);

        phone.close(None).await.unwrap();
        let registry = dispatcher.registry().clone();
        wait_until(|| registry.connections_for("alice").len() == 1).await;

        laptop.close(None).await.unwrap();
        wait_until(|| registry.online_count() == 0).await;
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let (addr, _, handler) = spawn_gateway().await;
        let mut ws = connect(addr, Some("alice-token")).await;
        assert_eq!(next_event(&mut ws).await["type"], "READY");

        ws.send(tungstenite::Message::Text("not json".into()))
            .await
            .unwrap();
        send_command(&mut ws, mark_read()).await;

        wait_until(|| handler.seen.lock().unwrap().len() == 1).await;
    }
}
