use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRef, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::ADMIN_ROOM;
use crate::{auth::jwt::JwtKeys, state::AppState, users::repo_types::User};

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum ClientFrame {
    Join {
        room: String,
        #[serde(default)]
        token: Option<String>,
    },
    Leave {
        room: String,
    },
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let keys = JwtKeys::from_ref(&state);
    let mut events = state.notifier.subscribe();
    let (mut sink, mut stream) = socket.split();
    let mut rooms: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) => {
                        let reply = handle_frame(&keys, &mut rooms, &text);
                        if let Some(reply) = reply {
                            if sink.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            outgoing = events.recv() => {
                match outgoing {
                    Ok(event) if rooms.contains(&event.room) => {
                        let Ok(text) = serde_json::to_string(event.as_ref()) else { continue };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "socket lagging; dropped events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    debug!(rooms = rooms.len(), "socket closed");
}

/// Applies one client frame and returns the acknowledgement to send back.
fn handle_frame(keys: &JwtKeys, rooms: &mut HashSet<String>, text: &str) -> Option<String> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => return Some(ack("error", "", "unrecognized frame")),
    };

    match frame {
        ClientFrame::Join { room, token } => match authorize_join(keys, &room, token.as_deref()) {
            Ok(()) => {
                info!(room = %room, "socket joined room");
                rooms.insert(room.clone());
                Some(ack("joined", &room, "ok"))
            }
            Err(reason) => Some(ack("error", &room, reason)),
        },
        ClientFrame::Leave { room } => {
            rooms.remove(&room);
            Some(ack("left", &room, "ok"))
        }
    }
}

/// `admin` needs an admin token; any other room is a user id and needs that
/// user's token.
pub(crate) fn authorize_join(
    keys: &JwtKeys,
    room: &str,
    token: Option<&str>,
) -> Result<(), &'static str> {
    let token = token.ok_or("token required")?;
    let claims = keys.verify(token).map_err(|_| "invalid or expired token")?;

    if room == ADMIN_ROOM {
        return if claims.role == User::ROLE_ADMIN {
            Ok(())
        } else {
            Err("admin only")
        };
    }
    if claims.sub.to_string() == room {
        Ok(())
    } else {
        Err("not your room")
    }
}

fn ack(event: &str, room: &str, message: &str) -> String {
    serde_json::json!({ "event": event, "room": room, "message": message }).to_string()
}
