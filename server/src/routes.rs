//! HTTP route handlers for the EventPlat gateway.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /ws` - WebSocket endpoint for browser clients
//! - `POST /events` - Ingestion endpoint for the CRUD layer
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`]: configuration,
//! the token verifier, the broadcaster, the connection registry (broadcast
//! pool), the inbound flood controller, and the event notifier.
//!
//! The WebSocket handshake verifies the session token **before** the
//! protocol upgrade; a connection that fails verification never joins the
//! broadcast pool and never exchanges a frame. All verification failures
//! collapse into one uniform `401` so clients cannot probe which check
//! failed.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE},
        HeaderMap, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{token_from_cookie, verify_notifier_token, TokenVerifier, SESSION_COOKIE};
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::notifier::EventNotifier;
use crate::rate_limit::{MessageRateLimiter, RateLimitResult};
use crate::registry::{ConnectionId, ConnectionInfo, ConnectionRegistry};
use crate::types::{Envelope, EventSummary};

// ============================================================================
// Constants
// ============================================================================

/// Maximum body size for the ingestion endpoint (64 KB).
const MAX_BODY_SIZE: usize = 64 * 1024;

/// User id recorded for connections admitted in unsafe (no-auth) mode.
const ANONYMOUS_USER: &str = "anonymous";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Wrapped in cheap clones for each request handler; all members are
/// reference-counted internally.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Session token verifier. `None` only in unsafe (no-auth) mode.
    pub verifier: Option<TokenVerifier>,

    /// Envelope fan-out hub.
    pub broadcaster: Broadcaster,

    /// The broadcast pool: all currently authorized connections.
    pub registry: ConnectionRegistry,

    /// Per-connection inbound flood control.
    pub rate_limiter: MessageRateLimiter,

    /// Producer for `eventCreated` notifications.
    pub notifier: EventNotifier,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_components(config, Broadcaster::new(), MessageRateLimiter::default())
    }

    /// Creates application state with custom broadcaster and rate limiter.
    ///
    /// Useful for tests or when custom capacity/rate limits are needed.
    #[must_use]
    pub fn with_components(
        config: Config,
        broadcaster: Broadcaster,
        rate_limiter: MessageRateLimiter,
    ) -> Self {
        let verifier = config.jwt_secret.as_deref().map(TokenVerifier::new);
        let notifier = EventNotifier::new(broadcaster.clone());

        Self {
            config: Arc::new(config),
            verifier,
            broadcaster,
            registry: ConnectionRegistry::new(),
            rate_limiter,
            notifier,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("broadcaster", &self.broadcaster)
            .field("registry", &self.registry)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// The router carries a CORS layer mirroring the request origin with
/// credentials allowed (the browser app runs on another origin and sends
/// the session cookie) and an HTTP trace layer.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/events", post(post_events))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/ws", get(get_ws))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Error Response Types
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// The uniform rejection for any credential failure.
///
/// Deliberately carries no detail: the failure subtype (missing, malformed,
/// expired, bad signature) is logged server-side only.
fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("unauthorized")),
    )
        .into_response()
}

// ============================================================================
// GET /ws - WebSocket Endpoint
// ============================================================================

/// GET /ws - WebSocket endpoint for browser clients.
///
/// # Authentication
///
/// Unless unsafe mode is enabled, the session token must be present in the
/// `token` cookie and verify against the shared secret. Verification runs
/// before the upgrade; a rejected handshake never exchanges a frame and
/// never touches the broadcast pool.
///
/// # Responses
///
/// - `101 Switching Protocols` - Admitted
/// - `401 Unauthorized` - Any credential failure (undifferentiated)
async fn get_ws(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    let user_id = if state.config.unsafe_no_auth {
        ANONYMOUS_USER.to_string()
    } else {
        let Some(verifier) = state.verifier.as_ref() else {
            error!("Session secret not configured but auth is enabled");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("server configuration error")),
            )
                .into_response();
        };

        let token = headers
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|cookies| token_from_cookie(cookies, SESSION_COOKIE));

        let Some(token) = token else {
            debug!("WebSocket handshake without session cookie");
            return unauthorized();
        };

        match verifier.verify(token) {
            Ok(claims) => claims.sub,
            Err(err) => {
                debug!(error = %err, "WebSocket handshake rejected");
                return unauthorized();
            }
        }
    };

    info!(user_id = %user_id, "WebSocket client authorized");

    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id))
}

/// Runs an admitted WebSocket connection until it closes.
///
/// Joins the broadcast pool, forwards every broadcast envelope to the peer,
/// and rebroadcasts the peer's inbound `message`/`eventCreated` frames to
/// everyone (originator included).
async fn handle_connection(socket: axum::extract::ws::WebSocket, state: AppState, user_id: String) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};

    let connection_id = ConnectionId::new();
    let mut envelope_rx = state.broadcaster.subscribe();
    state
        .registry
        .add(connection_id, ConnectionInfo::new(user_id.clone()));

    info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket client connected"
    );

    let (mut sender, mut receiver) = socket.split();

    // Forward broadcast envelopes to this peer. A failed send means the
    // peer is unreachable; that ends only this connection.
    let forward_task = tokio::spawn(async move {
        loop {
            match envelope_rx.recv().await {
                Ok(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if let Err(err) = sender.send(Message::Text(json.into())).await {
                            debug!(error = %err, "Failed to deliver envelope to client");
                            break;
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to serialize envelope");
                    }
                },
                Err(RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Client lagged, envelopes skipped");
                }
                Err(RecvError::Closed) => {
                    debug!("Broadcaster closed");
                    break;
                }
            }
        }
    });

    // Inbound loop: relay well-formed named frames, drop everything else.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let RateLimitResult::Limited { retry_after_secs } =
                    state.rate_limiter.check(connection_id).await
                {
                    warn!(
                        connection_id = %connection_id,
                        retry_after_secs,
                        "Inbound frame dropped: rate limited"
                    );
                    continue;
                }

                match serde_json::from_str::<Envelope>(text.as_str()) {
                    Ok(envelope) => {
                        trace!(
                            connection_id = %connection_id,
                            event = envelope.event_name(),
                            "Relaying client frame"
                        );
                        state.broadcaster.broadcast(envelope);
                    }
                    Err(err) => {
                        debug!(
                            connection_id = %connection_id,
                            error = %err,
                            "Ignoring undecodable frame"
                        );
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!(connection_id = %connection_id, "Client sent close frame");
                break;
            }
            Ok(Message::Ping(data)) => {
                // axum answers pongs automatically
                trace!(data_len = data.len(), "Received ping");
            }
            Ok(_) => {
                // Binary and pong frames are not part of the protocol
            }
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "WebSocket error");
                break;
            }
        }
    }

    forward_task.abort();
    state.registry.remove(connection_id);
    state.rate_limiter.remove(connection_id).await;

    info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket client disconnected"
    );
}

// ============================================================================
// POST /events - Event Creation Ingestion
// ============================================================================

/// POST /events - ingestion boundary for the CRUD layer.
///
/// Called after an event record has been durably created. The body is the
/// event summary, broadcast verbatim to all connected clients as
/// `eventCreated`. Delivery is fire-and-forget: the response does not
/// reflect how many clients (if any) received the notification.
///
/// # Authentication
///
/// Unless unsafe mode is enabled, requests must carry
/// `Authorization: Bearer <notifier token>`; the token is compared in
/// constant time.
///
/// # Responses
///
/// - `202 Accepted` - Summary handed to the notifier
/// - `400 Bad Request` - Body is not a valid event summary
/// - `401 Unauthorized` - Missing or invalid bearer token
async fn post_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.config.unsafe_no_auth {
        let Some(expected) = state.config.notifier_token.as_deref() else {
            error!("Notifier token not configured but auth is enabled");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("server configuration error")),
            )
                .into_response();
        };

        let provided = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        let Some(provided) = provided else {
            debug!("Ingestion request without bearer token");
            return unauthorized();
        };

        if let Err(err) = verify_notifier_token(provided, expected) {
            warn!(error = %err, "Ingestion request with invalid bearer token");
            return unauthorized();
        }
    }

    let summary: EventSummary = match serde_json::from_slice(&body) {
        Ok(summary) => summary,
        Err(err) => {
            debug!(error = %err, "Failed to parse event summary");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(format!("invalid event summary: {err}"))),
            )
                .into_response();
        }
    };

    state.notifier.event_created(summary);

    StatusCode::ACCEPTED.into_response()
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of connections currently in the broadcast pool.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed();

    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.registry.len(),
        uptime_seconds: uptime.as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
