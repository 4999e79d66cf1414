//! # PulseBot Gateway
//!
//! Thin HTTP/WebSocket facade for the `webchat` channel. The gateway is a
//! plain channel adapter: it writes `user_input` rows onto the message log
//! and forwards rows targeted at `channel:webchat` back out. All agent
//! behavior stays on the stream side.
//!
//! Routes:
//! - `GET /healthz` — liveness.
//! - `POST /v1/messages` — append one user message; returns the row id.
//! - `GET /ws?session_id=…` — bidirectional bridge: client frames become
//!   `user_input` rows, log rows for the session come back as JSON frames.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use pulsebot_core::message::MessageRecord;
use pulsebot_core::stream::{SeekTo, TailFilter};
use pulsebot_core::StreamStore;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANNEL: &str = "webchat";

#[derive(Clone)]
pub struct GatewayState {
    store: Arc<dyn StreamStore>,
}

pub fn router(store: Arc<dyn StreamStore>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/messages", post(post_message))
        .route("/ws", get(ws_upgrade))
        .with_state(GatewayState { store })
}

/// Bind and serve until the task is aborted.
pub async fn serve(
    store: Arc<dyn StreamStore>,
    host: &str,
    port: u16,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(host, port, "Gateway listening");
    axum::serve(listener, router(store)).await
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    /// Omitted → a fresh session is started.
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    pub text: String,
}

async fn post_message(
    State(state): State<GatewayState>,
    Json(body): Json<PostMessageBody>,
) -> impl IntoResponse {
    let session_id = body
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let record = MessageRecord::user_input(CHANNEL, &session_id, &body.text)
        .with_user_id(body.user_id.unwrap_or_default());

    match state.store.append_message(record).await {
        Ok(id) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({"id": id, "session_id": session_id})),
        ),
        Err(e) => {
            warn!(error = %e, "Failed to append user message");
            (
                axum::http::StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(default)]
    session_id: Option<String>,

    #[serde(default)]
    user_id: Option<String>,
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let session_id = query
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_id = query.user_id.unwrap_or_default();
    upgrade.on_upgrade(move |socket| ws_session(state, socket, session_id, user_id))
}

async fn ws_session(state: GatewayState, socket: WebSocket, session_id: String, user_id: String) {
    info!(session_id, "WebSocket session opened");
    let (mut sink, mut source) = socket.split();

    // Log → socket: everything routed at the webchat channel for this
    // session.
    let store = state.store.clone();
    let outbound_session = session_id.clone();
    let mut forward = tokio::spawn(async move {
        let mut tail = match store
            .tail_messages(TailFilter::channel(CHANNEL), SeekTo::Latest)
            .await
        {
            Ok(tail) => tail,
            Err(e) => {
                warn!(error = %e, "Failed to open channel tail for WebSocket");
                return;
            }
        };

        while let Some(item) = tail.recv().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Channel tail lost, closing WebSocket");
                    return;
                }
            };
            if record.session_id != outbound_session {
                continue;
            }
            let frame = serde_json::json!({
                "id": record.id,
                "message_type": record.message_type,
                "content": record.content_json(),
                "timestamp": record.timestamp,
            });
            if sink.send(WsMessage::text(frame.to_string())).await.is_err() {
                return;
            }
        }
    });

    // Socket → log: text frames become user_input rows.
    let store = state.store.clone();
    let inbound_session = session_id.clone();
    let mut ingest = tokio::spawn(async move {
        while let Some(Ok(message)) = source.next().await {
            let WsMessage::Text(text) = message else {
                continue;
            };

            // Accept `{"text": …}` payloads or bare text.
            let content = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("text").and_then(|t| t.as_str()).map(String::from))
                .unwrap_or_else(|| text.to_string());
            if content.trim().is_empty() {
                continue;
            }

            debug!(session_id = %inbound_session, "WebSocket user input");
            let record = MessageRecord::user_input(CHANNEL, &inbound_session, content)
                .with_user_id(user_id.clone());
            if let Err(e) = store.append_message(record).await {
                warn!(error = %e, "Failed to append WebSocket user input");
                return;
            }
        }
    });

    // Either direction ending tears down the session.
    tokio::select! {
        _ = &mut forward => ingest.abort(),
        _ = &mut ingest => forward.abort(),
    }
    info!(session_id, "WebSocket session closed");
}
