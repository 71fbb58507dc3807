//! WebSocket handler for the Axum Daifugo server.
//!
//! Each connection follows this lifecycle:
//!
//! 1. Client sends `join {room, name}`; the room is created on demand
//!    or the seat reclaimed if the name matches a ghost.
//! 2. Subsequent messages are processed against that room's engine,
//!    serialized by the room lock.
//! 3. On disconnect the seat is ghosted (or the room torn down by the
//!    registry's lifecycle rules).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use daifugo_core::engine::{EngineError, RoomEngine};
use daifugo_core::protocol::{ClientMessage, MAX_PLAY_CARDS, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::room::{PlayerRx, Room, RoomRegistry, schedule_bot};

/// Drive a single WebSocket connection.
pub async fn handle_socket(socket: WebSocket, registry: Arc<RoomRegistry>) {
    let (ws_sink, mut ws_stream) = socket.split();
    let ws_sink = Arc::new(Mutex::new(ws_sink));

    // ── Lobby: wait for a join before entering the game loop ─────────
    let (room_id, name, mut rx, room_arc): (String, String, PlayerRx, Arc<Mutex<Room>>) = loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        send_one(&ws_sink, &error(format!("Invalid message: {e}"))).await;
                        continue;
                    }
                };
                match msg {
                    ClientMessage::Join { room, name } => {
                        match registry.join(&room, &name).await {
                            Ok((rx, rarc)) => break (room, name, rx, rarc),
                            Err(e) => send_one(&ws_sink, &error(e)).await,
                        }
                    }
                    _ => {
                        send_one(&ws_sink, &error("Join a room first".to_string())).await;
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => return,
            _ => continue,
        }
    };

    // ── Write task: drain the per-player channel onto the socket ─────
    let write_sink = Arc::clone(&ws_sink);
    let mut write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            let mut sink = write_sink.lock().await;
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        // Channel closed server-side (room expired or dissolved):
        // close the socket too.
        let mut sink = write_sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    });

    // ── Game loop ─────────────────────────────────────────────────────
    loop {
        tokio::select! {
            _ = &mut write_handle => break,
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let msg: ClientMessage = match serde_json::from_str(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            send_one(&ws_sink, &error(format!("Invalid message: {e}"))).await;
                            continue;
                        }
                    };
                    process_client_message(msg, &name, &room_id, &registry, &room_arc).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                _ => continue,
            }
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────
    write_handle.abort();
    registry.disconnect(&room_id, &name).await;
    tracing::info!(room = %room_id, player = %name, "Connection closed");
}

/// Process one message within an established room session.
async fn process_client_message(
    msg: ClientMessage,
    name: &str,
    room_id: &str,
    registry: &Arc<RoomRegistry>,
    room_arc: &Arc<Mutex<Room>>,
) {
    match msg {
        ClientMessage::Join { .. } => {
            let room = room_arc.lock().await;
            room.send_to_player(name, &error("Already in a room".to_string()));
        }

        ClientMessage::Start | ClientMessage::Reset => {
            apply_action(room_arc, name, |eng| eng.start(name)).await;
        }

        ClientMessage::Play { cards } => {
            if cards.is_empty() || cards.len() > MAX_PLAY_CARDS {
                let room = room_arc.lock().await;
                room.send_to_player(
                    name,
                    &error(format!("A play must carry 1-{MAX_PLAY_CARDS} cards")),
                );
                return;
            }
            apply_action(room_arc, name, |eng| eng.play(name, &cards)).await;
        }

        ClientMessage::Pass => {
            apply_action(room_arc, name, |eng| eng.pass(name)).await;
        }

        ClientMessage::Dissolve => {
            if let Err(e) = registry.dissolve(room_id, name).await {
                let room = room_arc.lock().await;
                room.send_to_player(name, &error(e));
            }
        }
    }
}

/// Run an engine action under the room lock.
///
/// Accepted actions refresh the activity stamp, invalidate pending bot
/// tasks, broadcast the new state, and hand the turn to the bot driver
/// if a bot is up next. Rejections only message the caller.
async fn apply_action<F>(room_arc: &Arc<Mutex<Room>>, name: &str, action: F)
where
    F: FnOnce(&mut RoomEngine) -> Result<(), EngineError>,
{
    let mut room = room_arc.lock().await;
    if room.closed || room.dissolving {
        room.send_to_player(name, &error("Room is shutting down".to_string()));
        return;
    }
    match action(&mut room.engine) {
        Ok(()) => {
            room.bump_turn();
            room.touch();
            room.broadcast_state();
            schedule_bot(room_arc, &room);
        }
        Err(e) => {
            tracing::debug!(
                room = room.engine.room_id(),
                player = name,
                error = %e,
                "Action rejected"
            );
            room.send_to_player(name, &error(e.to_string()));
        }
    }
}

fn error(message: String) -> ServerMessage {
    ServerMessage::Error { message }
}

/// Send a single message directly on the raw sink (used during the
/// lobby phase, before the per-player channel exists).
async fn send_one(
    sink: &Arc<Mutex<futures_util::stream::SplitSink<WebSocket, Message>>>,
    msg: &ServerMessage,
) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut s = sink.lock().await;
        let _ = s.send(Message::Text(json.into())).await;
    }
}
