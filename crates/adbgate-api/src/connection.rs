//! WebSocket handlers for the single-target and admin endpoints
//!
//! Handles the upgrade and then pumps frames from the socket into a
//! [`Session`], one at a time and in arrival order.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::server::AppState;
use crate::session::{AdminSession, Session, TargetResolution, TargetSession};
use crate::websocket::send_close_normal;

/// Upgrade `GET /adb` into a single-target session
pub async fn adb_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let session = TargetSession::single_target(state.registry, state.staging_dir);
        run_session(socket, session)
    })
}

/// Upgrade `GET /admin/adb` into an admin session
pub async fn admin_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let session = AdminSession::admin(state.cache, state.staging_dir);
        run_session(socket, session)
    })
}

/// Drive one session until the client goes away
async fn run_session<R: TargetResolution>(socket: WebSocket, mut session: Session<R>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    session.on_open();

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                session.on_text_frame(text.as_str(), &mut ws_sender).await;
            }
            // axum reassembles fragmented messages, so every frame is final
            Ok(Message::Binary(data)) => {
                session.on_binary_frame(&data, true, &mut ws_sender).await;
            }
            Ok(Message::Ping(data)) => {
                let _ = ws_sender.send(Message::Pong(data)).await;
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                debug!(
                    connection_id = %session.id(),
                    reason = ?frame.as_ref().map(|f| f.reason.as_str()),
                    "Client closed connection"
                );
                break;
            }
            Err(e) => {
                warn!(connection_id = %session.id(), error = %e, "WebSocket error");
                break;
            }
        }
    }

    session.on_close().await;
    send_close_normal(&mut ws_sender, "Session closed").await;
}
