//! End-to-end tests for the realtime relay.
//!
//! These tests run the gateway on an ephemeral port and drive it with real
//! WebSocket clients: chat frames are relayed to every authorized
//! connection in sender order, `eventCreated` notifications fan out exactly
//! once per connection, rejected handshakes never exchange a frame, and
//! disconnecting removes a connection from the broadcast pool.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use eventplat_server::auth::Claims;
use eventplat_server::config::Config;
use eventplat_server::routes::{create_router, AppState};

const JWT_SECRET: &str = "relay-test-secret";
const NOTIFIER_TOKEN: &str = "relay-test-hook-token";

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Test Helpers
// ============================================================================

fn auth_config() -> Config {
    Config {
        jwt_secret: Some(JWT_SECRET.to_string()),
        notifier_token: Some(NOTIFIER_TOKEN.to_string()),
        port: 0,
        unsafe_no_auth: false,
    }
}

/// Signs a session token expiring `lifetime_secs` from now.
fn session_token(sub: &str, lifetime_secs: i64) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        email: None,
        exp: (Utc::now().timestamp() + lifetime_secs) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Spawns the gateway on a random available port.
async fn spawn_server(state: AppState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(10)).await;

    (addr, handle)
}

/// Opens a WebSocket connection presenting the given session token.
async fn connect(addr: SocketAddr, token: &str) -> Result<WsClient, tungstenite::Error> {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request.headers_mut().insert(
        "Cookie",
        HeaderValue::from_str(&format!("token={token}")).unwrap(),
    );

    connect_async(request).await.map(|(ws, _)| ws)
}

/// Receives the next text frame as JSON, failing after one second.
async fn recv_json(client: &mut WsClient) -> serde_json::Value {
    let deadline = Duration::from_secs(1);
    loop {
        let frame = timeout(deadline, client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("websocket error");

        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("frame is not valid JSON");
        }
    }
}

/// Asserts that no text frame arrives within 200ms.
async fn assert_silent(client: &mut WsClient) {
    let result = timeout(Duration::from_millis(200), client.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

/// Polls until `cond` holds, failing after one second.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within one second");
}

fn chat_frame(body: &str) -> Message {
    Message::Text(
        serde_json::json!({"event": "message", "data": body})
            .to_string()
            .into(),
    )
}

// ============================================================================
// Chat relay
// ============================================================================

#[tokio::test]
async fn chat_message_is_relayed_to_all_clients() {
    let state = AppState::new(auth_config());
    let registry = state.registry.clone();
    let (addr, server) = spawn_server(state).await;

    let mut alice = connect(addr, &session_token("alice", 3600)).await.unwrap();
    let mut bob = connect(addr, &session_token("bob", 3600)).await.unwrap();
    wait_until(|| registry.len() == 2).await;

    alice.send(chat_frame("hi")).await.unwrap();

    let received = recv_json(&mut bob).await;
    assert_eq!(received["event"], "message");
    assert_eq!(received["data"], "hi");

    // The sender gets its own message back as well.
    let echoed = recv_json(&mut alice).await;
    assert_eq!(echoed["data"], "hi");

    server.abort();
}

#[tokio::test]
async fn chat_messages_arrive_in_sender_order() {
    let state = AppState::new(auth_config());
    let registry = state.registry.clone();
    let (addr, server) = spawn_server(state).await;

    let mut alice = connect(addr, &session_token("alice", 3600)).await.unwrap();
    let mut bob = connect(addr, &session_token("bob", 3600)).await.unwrap();
    wait_until(|| registry.len() == 2).await;

    for body in ["first", "second", "third"] {
        alice.send(chat_frame(body)).await.unwrap();
    }

    for expected in ["first", "second", "third"] {
        let received = recv_json(&mut bob).await;
        assert_eq!(received["data"], expected);
    }

    server.abort();
}

// ============================================================================
// Event creation fan-out
// ============================================================================

#[tokio::test]
async fn event_created_fans_out_exactly_once_per_client() {
    let state = AppState::new(auth_config());
    let registry = state.registry.clone();
    // A second router over the same state stands in for the CRUD layer's
    // HTTP call; it shares the broadcaster with the served router.
    let ingest_app = create_router(state.clone());
    let (addr, server) = spawn_server(state).await;

    let mut alice = connect(addr, &session_token("alice", 3600)).await.unwrap();
    let mut bob = connect(addr, &session_token("bob", 3600)).await.unwrap();
    wait_until(|| registry.len() == 2).await;

    let body = serde_json::json!({
        "id": "1",
        "title": "Meetup",
        "description": "Monthly community meetup",
        "location": "Berlin",
        "createdBy": "user-1",
    });

    let response = ingest_app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events")
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {NOTIFIER_TOKEN}"))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);

    for client in [&mut alice, &mut bob] {
        let received = recv_json(client).await;
        assert_eq!(received["event"], "eventCreated");
        assert_eq!(received["data"]["id"], "1");
        assert_eq!(received["data"]["title"], "Meetup");
        assert_eq!(received["data"]["createdBy"], "user-1");
    }

    // Exactly once: nothing further arrives on either connection.
    assert_silent(&mut alice).await;
    assert_silent(&mut bob).await;

    server.abort();
}

// ============================================================================
// Handshake rejection
// ============================================================================

#[tokio::test]
async fn expired_token_is_rejected_before_any_exchange() {
    let state = AppState::new(auth_config());
    let registry = state.registry.clone();
    let broadcaster = state.broadcaster.clone();
    let (addr, server) = spawn_server(state).await;

    let result = connect(addr, &session_token("alice", -3600)).await;

    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP 401 rejection, got {other:?}"),
    }

    // The rejected handshake never touched the broadcast pool.
    assert!(registry.is_empty());
    assert_eq!(broadcaster.subscriber_count(), 0);

    server.abort();
}

// ============================================================================
// Disconnect semantics
// ============================================================================

#[tokio::test]
async fn disconnect_removes_connection_from_pool() {
    let state = AppState::new(auth_config());
    let registry = state.registry.clone();
    let broadcaster = state.broadcaster.clone();
    let (addr, server) = spawn_server(state).await;

    let mut alice = connect(addr, &session_token("alice", 3600)).await.unwrap();
    let mut bob = connect(addr, &session_token("bob", 3600)).await.unwrap();
    wait_until(|| registry.len() == 2).await;

    alice.close(None).await.unwrap();
    wait_until(|| registry.len() == 1).await;
    wait_until(|| broadcaster.subscriber_count() == 1).await;

    // Broadcasts now reach only the remaining connection.
    bob.send(chat_frame("still here")).await.unwrap();
    let received = recv_json(&mut bob).await;
    assert_eq!(received["data"], "still here");

    server.abort();
}

#[tokio::test]
async fn undecodable_frames_are_dropped_not_relayed() {
    let state = AppState::new(auth_config());
    let registry = state.registry.clone();
    let (addr, server) = spawn_server(state).await;

    let mut alice = connect(addr, &session_token("alice", 3600)).await.unwrap();
    let mut bob = connect(addr, &session_token("bob", 3600)).await.unwrap();
    wait_until(|| registry.len() == 2).await;

    // Not an envelope; the gateway must drop it without closing anyone.
    alice
        .send(Message::Text("this is not json".to_string().into()))
        .await
        .unwrap();
    assert_silent(&mut bob).await;

    // The connection survives and can still relay.
    alice.send(chat_frame("after garbage")).await.unwrap();
    let received = recv_json(&mut bob).await;
    assert_eq!(received["data"], "after garbage");

    server.abort();
}
