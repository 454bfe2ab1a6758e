//! `GET /streams/{sessionId}`: attaches a WebSocket listener to a session
//! minted by a stream operation.
//!
//! The session is claimed before the upgrade completes. A refused claim still
//! upgrades, then closes immediately with code 4004 so browser clients see a
//! reason instead of a failed handshake. Once the server is draining, attaches
//! get the same going-away close that drain sends to existing listeners.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use ::metrics::gauge;
use opencall_core::ClockSource;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::AppState;
use crate::network::{HealthState, SHUTDOWN_REASON};
use crate::stream::{Broadcaster, ListenerId, OutboundFrame};

/// Close code for an unknown, claimed, or expired session.
pub const SESSION_REFUSED: u16 = 4004;

const ACTIVE_LISTENERS: &str = "opencall_stream_listeners";

pub async fn stream_upgrade_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if draining(&state) {
        debug!(session = %session_id, "stream attach refused while draining");
        return ws.on_upgrade(going_away);
    }

    let now = state.services.clock.now_secs();
    match state.services.sessions.claim(&session_id, now) {
        Ok(session) => {
            let broadcaster = Arc::clone(&state.services.broadcaster);
            let (handle, rx) = broadcaster.register(&session);
            let id = handle.id;
            // The broadcaster keeps the only sender; dropping ours lets the
            // mailbox close when the listener is pruned.
            drop(handle);
            // Drain flips the state before emptying the broadcaster, so a
            // listener registered after that sweep sees `draining` here.
            if draining(&state) {
                broadcaster.remove(id);
                return ws.on_upgrade(going_away);
            }
            info!(session = %session.session_id, filter = session.filter.as_str(), "stream attached");
            gauge!(ACTIVE_LISTENERS).set(count_as_f64(&broadcaster));
            ws.on_upgrade(move |socket| run_listener(socket, broadcaster, id, rx))
        }
        Err(err) => {
            debug!(session = %session_id, error = %err, "stream attach refused");
            ws.on_upgrade(refuse)
        }
    }
}

fn draining(state: &AppState) -> bool {
    matches!(
        state.shutdown.health_state(),
        HealthState::Draining | HealthState::Stopped
    )
}

async fn going_away(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: SHUTDOWN_REASON.into(),
        })))
        .await;
}

/// Expired sessions get the same reason as unknown ones.
async fn refuse(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: SESSION_REFUSED,
            reason: "Stream session not found".into(),
        })))
        .await;
}

async fn run_listener(
    mut socket: WebSocket,
    broadcaster: Arc<Broadcaster>,
    id: ListenerId,
    mut rx: mpsc::Receiver<OutboundFrame>,
) {
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(OutboundFrame::Event(json)) => {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Close(reason)) => {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: reason.unwrap_or_default().into(),
                        })))
                        .await;
                    break;
                }
                // Pruned after its mailbox overflowed.
                None => {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "listener fell behind".into(),
                        })))
                        .await;
                    break;
                }
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                // Listeners are receive-only; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }

    broadcaster.remove(id);
    gauge!(ACTIVE_LISTENERS).set(count_as_f64(&broadcaster));
    debug!(listener = id.0, "stream detached");
}

#[allow(clippy::cast_precision_loss)]
fn count_as_f64(broadcaster: &Broadcaster) -> f64 {
    broadcaster.count() as f64
}
