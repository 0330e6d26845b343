//! HTTP + WebSocket surface: the external contract the core satisfies. Each connection attaches
//! to an existing session or creates a new one by id against `SessionManager`, then runs a
//! `tokio::select!` loop selecting between inbound client frames and the session actor's outbound
//! broadcast channel, fanning one PTY out to N attached clients.

use std::net::SocketAddr;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{ConnectInfo, Path, Query, State},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::manager::SessionManager;
use crate::motd::render_motd;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{OutboundMessage, SessionHandle};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>tty-relay</title></head>
<body>
<p>tty-relay is running. Connect a terminal front-end to <code>/ws</code>.</p>
</body>
</html>
"#;

pub fn router(manager: SessionManager) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/session/:id", get(index))
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions))
        .route("/ws", get(ws_new))
        .route("/ws/:session_id", get(ws_attach))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_sessions(
    State(manager): State<SessionManager>,
) -> Json<Vec<crate::session::SessionStats>> {
    Json(manager.list_stats().await)
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(default)]
    cols: u16,
    #[serde(default)]
    rows: u16,
    #[serde(default)]
    cmd: String,
}

async fn ws_new(
    ws: WebSocketUpgrade,
    State(manager): State<SessionManager>,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, manager, None, query, addr))
}

async fn ws_attach(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(manager): State<SessionManager>,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, manager, Some(session_id), query, addr))
}

async fn handle_socket(
    mut socket: WebSocket,
    manager: SessionManager,
    session_id: Option<String>,
    query: WsQuery,
    addr: SocketAddr,
) {
    let existing = match &session_id {
        Some(id) => manager.get_session(id),
        None => None,
    };

    let (handle, is_new) = match existing {
        Some(handle) => (handle, false),
        None => match manager.create_session(query.cols, query.rows, &query.cmd) {
            Ok(handle) => (handle, true),
            Err(e) => {
                warn!(error = %e, "failed to create session for websocket upgrade");
                let _ = socket.close().await;
                return;
            }
        },
    };

    let Some((client_id, mut outbound_rx)) = handle.attach().await else {
        warn!(session_id = %handle.id, "session actor gone before attach completed");
        let _ = socket.close().await;
        return;
    };

    info!(session_id = %handle.id, %addr, is_new, "websocket client attached");

    let session_frame = serde_json::to_string(&ServerMessage::Session {
        id: handle.id.clone(),
    })
    .expect("session message always serializes");
    if socket.send(Message::Text(session_frame)).await.is_err() {
        handle.detach(client_id).await;
        manager.reap_if_eligible(&handle.id).await;
        return;
    }

    if is_new {
        let settings = manager.settings();
        let motd = render_motd(
            &settings.host,
            settings.port,
            true,
            Some(&addr.to_string()),
            &settings.motd_art,
        );
        if socket.send(Message::Binary(motd)).await.is_err() {
            handle.detach(client_id).await;
            manager.reap_if_eligible(&handle.id).await;
            return;
        }
    }

    // Bidirectional streaming. The first item already queued in `outbound_rx` is the
    // history-replay frame the actor sent as part of attach, so it naturally lands right after
    // the session/MOTD frames above, preserving the handshake order.
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => handle.write(data).await,
                    Some(Ok(Message::Text(text))) => {
                        handle_control_message(&mut socket, &handle, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id = %handle.id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(OutboundMessage::Binary(data)) => {
                        if socket.send(Message::Binary(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Some(OutboundMessage::Text(text)) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(OutboundMessage::Close) | None => break,
                }
            }
        }
    }

    handle.detach(client_id).await;
    manager.reap_if_eligible(&handle.id).await;
    debug!(session_id = %handle.id, "websocket connection closed");
}

/// Client → server text frame: `{"type":"resize",...}` or `{"type":"ping"}`. Malformed JSON or
/// unknown types are logged at WARN and ignored.
async fn handle_control_message(socket: &mut WebSocket, handle: &SessionHandle, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Resize { cols, rows }) => handle.resize(cols, rows).await,
        Ok(ClientMessage::Ping) => {
            let pong =
                serde_json::to_string(&ServerMessage::Pong).expect("pong always serializes");
            let _ = socket.send(Message::Text(pong)).await;
        }
        Err(e) => {
            warn!(session_id = %handle.id, error = %e, raw = %text, "malformed control message, ignoring");
        }
    }
}
