//! Room registry and lifecycle for the multi-room server.
//!
//! Each room wraps an independent [`RoomEngine`] plus the set of live
//! connections, each with its own [`mpsc`] sender for targeted delivery
//! (every player receives a personally redacted snapshot, so there is
//! no broadcast fan-out of private hands).
//!
//! Lifecycle policy: rooms are created lazily on first join; a room
//! whose human seats are all disconnected outside a dissolution is
//! deleted immediately, and a periodic sweep removes rooms idle for
//! more than [`IDLE_TIMEOUT`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use daifugo_core::bot::{self, BotMove, FieldView};
use daifugo_core::engine::{EngineConfig, JoinOutcome, RoomEngine};
use daifugo_core::protocol::{
    CardInfo, ServerMessage, card_to_info, validate_player_name, validate_room_id,
};
use tokio::sync::{Mutex, RwLock, mpsc};

/// How often the registry scans for idle rooms.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Idle time after which a room is expired by the sweep.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Think-time delay before a deferred bot action fires.
pub const BOT_THINK_DELAY: Duration = Duration::from_millis(500);

/// Handle to a per-player outbound channel.
///
/// The WebSocket write loop drains this receiver and forwards messages
/// as text frames.
pub type PlayerTx = mpsc::UnboundedSender<ServerMessage>;
pub type PlayerRx = mpsc::UnboundedReceiver<ServerMessage>;

/// A single game room: rules engine plus connection plumbing.
pub struct Room {
    pub engine: RoomEngine,
    /// Per-player outbound senders keyed by player name.
    pub player_senders: HashMap<String, PlayerTx>,
    /// Bumped on every accepted action; invalidates stale deferred
    /// bot tasks.
    pub turn_counter: Arc<AtomicU64>,
    /// Refreshed by accepted human actions; drives inactivity expiry.
    pub last_active: Instant,
    /// Host requested dissolution; waiting for every seat to exit.
    pub dissolving: bool,
    pub expected_exits: usize,
    pub exit_count: usize,
    /// The room has been removed from the registry; late tasks must
    /// not act on it.
    pub closed: bool,
}

impl Room {
    fn new(room_id: &str) -> Self {
        Self {
            engine: RoomEngine::new(room_id, EngineConfig::default()),
            player_senders: HashMap::new(),
            turn_counter: Arc::new(AtomicU64::new(0)),
            last_active: Instant::now(),
            dissolving: false,
            expected_exits: 0,
            exit_count: 0,
            closed: false,
        }
    }

    /// Send a message to one player. Send failure is ignored — the
    /// player may have just disconnected.
    pub fn send_to_player(&self, name: &str, msg: &ServerMessage) {
        if let Some(tx) = self.player_senders.get(name) {
            let _ = tx.send(msg.clone());
        }
    }

    /// Send a message to every connected player.
    pub fn broadcast(&self, msg: &ServerMessage) {
        for tx in self.player_senders.values() {
            let _ = tx.send(msg.clone());
        }
    }

    /// Send each connected player their own redacted state snapshot.
    pub fn broadcast_state(&self) {
        let is_final = self.engine.is_final();
        for (name, tx) in &self.player_senders {
            let snap = self.engine.snapshot_for(Some(name.as_str()));
            let msg = if is_final {
                ServerMessage::Final(snap)
            } else {
                ServerMessage::Update(snap)
            };
            let _ = tx.send(msg);
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Invalidate pending deferred tasks; returns the new turn stamp.
    pub fn bump_turn(&self) -> u64 {
        self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Manages all active rooms.
///
/// The outer `RwLock` allows concurrent lookups while creation and
/// removal take exclusive access; each room is individually
/// `Mutex`-protected so independent rooms never contend and all actions
/// within one room are serialized.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_room(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }

    pub async fn list_rooms(&self) -> Vec<String> {
        let rooms = self.rooms.read().await;
        rooms.keys().cloned().collect()
    }

    /// Join (or create) a room, or reclaim a disconnected seat.
    ///
    /// Returns the player's receive channel and the room handle so the
    /// caller can wire up the WebSocket write loop.
    pub async fn join(
        &self,
        room_id: &str,
        name: &str,
    ) -> Result<(PlayerRx, Arc<Mutex<Room>>), String> {
        validate_room_id(room_id)?;
        validate_player_name(name)?;

        // The write lock covers the uniqueness scan, room creation and
        // the seat insertion below, so two simultaneous joins can never
        // both claim one name. No other path awaits this lock while
        // holding a room lock, so the nested room locks cannot deadlock.
        let mut rooms = self.rooms.write().await;

        // Names are unique across all rooms, so a reconnecting player
        // can never be confused with a seat elsewhere.
        for (rid, room_arc) in rooms.iter() {
            if rid == room_id {
                continue;
            }
            let room = room_arc.lock().await;
            if room.engine.has_player(name) {
                return Err(format!("Name '{name}' is already in use in another room"));
            }
        }

        let room_arc = Arc::clone(rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::info!(room = room_id, "Room created");
            Arc::new(Mutex::new(Room::new(room_id)))
        }));

        let mut room = room_arc.lock().await;
        if room.closed || room.dissolving {
            return Err("Room is shutting down".to_string());
        }

        let outcome = room.engine.join(name).map_err(|e| e.to_string())?;
        let (tx, rx) = mpsc::unbounded_channel();
        room.player_senders.insert(name.to_string(), tx);
        room.touch();
        match outcome {
            JoinOutcome::Reconnected => {
                tracing::info!(room = room_id, player = name, "Ghost seat reclaimed");
            }
            JoinOutcome::Seated => {
                tracing::info!(room = room_id, player = name, "Player joined");
            }
        }
        // Everyone, the newcomer included, gets the fresh state; a
        // reconnecting player recovers their hand from this snapshot.
        room.broadcast_state();
        drop(room);

        Ok((rx, room_arc))
    }

    /// Handle a closed connection: keep the seat as a ghost, advance
    /// the dissolution protocol, or delete an abandoned room.
    pub async fn disconnect(&self, room_id: &str, name: &str) {
        let Some(room_arc) = self.get_room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        room.player_senders.remove(name);
        if !room.engine.disconnect(name) {
            return;
        }
        tracing::info!(room = room_id, player = name, "Player disconnected");

        if room.dissolving {
            room.exit_count += 1;
            tracing::info!(
                room = room_id,
                exits = room.exit_count,
                expected = room.expected_exits,
                "Dissolution exit counted"
            );
            if room.exit_count >= room.expected_exits {
                room.closed = true;
                drop(room);
                self.remove(room_id).await;
                tracing::info!(room = room_id, "Room fully deleted after all exits");
            }
            return;
        }

        if room.engine.all_disconnected() {
            // No grace window: an abandoned room goes away at once.
            room.closed = true;
            drop(room);
            self.remove(room_id).await;
            tracing::info!(room = room_id, "Room auto-deleted (all seats disconnected)");
        } else {
            room.touch();
            room.broadcast_state();
        }
    }

    /// Host-initiated dissolution: notify everyone, then wait for each
    /// live connection to exit before deleting the room.
    pub async fn dissolve(&self, room_id: &str, caller: &str) -> Result<(), String> {
        let Some(room_arc) = self.get_room(room_id).await else {
            return Err("Room no longer exists".to_string());
        };
        let mut room = room_arc.lock().await;
        if !room.engine.is_host(caller) {
            return Err("Only the host can dissolve the room".to_string());
        }
        if room.dissolving {
            return Ok(());
        }
        room.dissolving = true;
        // Only live connections can produce exits; ghosts and bots
        // never will.
        room.expected_exits = room.player_senders.len();
        room.exit_count = 0;
        room.broadcast(&ServerMessage::RoomDeleted);
        tracing::info!(
            room = room_id,
            expected = room.expected_exits,
            "Room dissolving, waiting for exits"
        );
        Ok(())
    }

    /// Expire rooms idle past [`IDLE_TIMEOUT`]: notify, close their
    /// channels (which closes the sockets), and delete.
    pub async fn sweep_idle(&self) {
        let expired: Vec<(String, Arc<Mutex<Room>>)> = {
            let rooms = self.rooms.read().await;
            let mut out = Vec::new();
            for (rid, room_arc) in rooms.iter() {
                let room = room_arc.lock().await;
                if room.last_active.elapsed() > IDLE_TIMEOUT {
                    out.push((rid.clone(), Arc::clone(room_arc)));
                }
            }
            out
        };

        for (room_id, room_arc) in expired {
            let mut room = room_arc.lock().await;
            room.broadcast(&ServerMessage::RoomDeleted);
            // Dropping the senders ends each write loop, which closes
            // the corresponding socket.
            room.player_senders.clear();
            room.closed = true;
            drop(room);
            self.remove(&room_id).await;
            tracing::info!(room = %room_id, "Room removed by inactivity timeout");
        }
    }

    async fn remove(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms.remove(room_id);
    }
}

// ─── Bot turns ───────────────────────────────────────────────────────────

/// If the seat on turn is a bot, spawn the deferred bot-turn driver.
///
/// Must be called with the room lock held (the `room` guard proves it).
pub fn schedule_bot(room_arc: &Arc<Mutex<Room>>, room: &Room) {
    if room.engine.current_bot().is_none() {
        return;
    }
    let expected = room.turn_counter.load(Ordering::SeqCst);
    let room_arc = Arc::clone(room_arc);
    tokio::spawn(async move {
        run_bot_turns(room_arc, expected).await;
    });
}

/// Drive consecutive bot turns, one think-delay apart.
///
/// Every iteration re-validates against the live room: the turn stamp
/// must be unchanged, the room must still exist, and it must still be
/// that bot's turn — a reconnect, dissolution, or expiry during the
/// delay makes the task a no-op.
pub async fn run_bot_turns(room_arc: Arc<Mutex<Room>>, mut expected: u64) {
    loop {
        tokio::time::sleep(BOT_THINK_DELAY).await;

        let mut room = room_arc.lock().await;
        if room.closed || room.dissolving {
            return;
        }
        if room.turn_counter.load(Ordering::SeqCst) != expected {
            return;
        }
        let Some(bot_name) = room.engine.current_bot().map(str::to_string) else {
            return;
        };
        let Some(hand) = room.engine.player(&bot_name).map(|p| p.hand.clone()) else {
            return;
        };

        let view = FieldView {
            count: room.engine.field_count(),
            rank: room.engine.field_rank(),
            revolution: room.engine.revolution(),
        };
        let result = match bot::choose_move(&hand, &view) {
            BotMove::Play(cards) => {
                let infos: Vec<CardInfo> = cards.iter().map(card_to_info).collect();
                room.engine.play(&bot_name, &infos)
            }
            BotMove::Pass => room.engine.pass(&bot_name),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    room = room.engine.room_id(),
                    bot = %bot_name,
                    "Bot acted"
                );
                expected = room.bump_turn();
                room.broadcast_state();
                if room.engine.current_bot().is_none() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(
                    room = room.engine.room_id(),
                    bot = %bot_name,
                    error = %e,
                    "Bot move rejected, stalling"
                );
                return;
            }
        }
    }
}
