//! The room rules state machine.
//!
//! [`RoomEngine`] owns one room's seats, turn pointer, field and
//! revolution flag, and validates every action before mutating anything
//! — a rejected action leaves the state exactly as it was. It is
//! transport-agnostic: connection handles live in the server layer,
//! which only feeds the engine player names and card descriptors.

use thiserror::Error;

use crate::cards::{self, Card, JOKER_ORDER};
use crate::protocol::{
    CardInfo, FieldInfo, LastMove, MoveKind, RankEntry, RankTitle, SeatInfo, SpecialEvent,
    StateSnapshot, card_to_info,
};

/// Every game is topped up to this many seats with bots.
pub const SEAT_COUNT: usize = 4;

/// Why an action was rejected. Rejections never change room state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("a player with that name is already connected")]
    DuplicateSeat,
    #[error("the game is in progress, no new seats")]
    GameInProgress,
    #[error("only the host can do that")]
    NotHost,
    #[error("the game has already started")]
    AlreadyStarted,
    #[error("no game is in progress")]
    NotInProgress,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("not your turn")]
    NotYourTurn,
    #[error("you must play at least one card")]
    EmptyPlay,
    #[error("card is not in your hand")]
    CardNotInHand,
    #[error("all cards in a play must share one rank")]
    MixedRanks,
    #[error("play must match the field size")]
    WrongCount,
    #[error("play does not beat the field")]
    DoesNotBeat,
    #[error("cannot pass on an open field")]
    PassOnOpenField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    InProgress,
    Finished,
}

/// Result of a successful `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new seat was appended.
    Seated,
    /// A disconnected seat was reclaimed; hand and finished flag intact.
    Reconnected,
}

/// One seat in the room.
#[derive(Debug, Clone)]
pub struct Player {
    pub name: String,
    pub connected: bool,
    pub is_bot: bool,
    pub hand: Vec<Card>,
    pub finished: bool,
    /// Sequence in which this player emptied their hand; drives ranking.
    pub finish_order: Option<usize>,
    pub rank_title: Option<RankTitle>,
}

impl Player {
    fn human(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connected: true,
            is_bot: false,
            hand: Vec::new(),
            finished: false,
            finish_order: None,
            rank_title: None,
        }
    }

    fn bot(name: String) -> Self {
        Self {
            name,
            connected: false,
            is_bot: true,
            hand: Vec::new(),
            finished: false,
            finish_order: None,
            rank_title: None,
        }
    }
}

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub seat_count: usize,
    /// Demote the previous game's Tycoon to Beggar if they fail to
    /// repeat ("fall from grace").
    pub demote_dethroned: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seat_count: SEAT_COUNT,
            demote_dethroned: true,
        }
    }
}

/// Does a play of effective rank `play_rank` beat the current field?
///
/// The joker compares as [`JOKER_ORDER`] in both orientations: it beats
/// any non-joker field and can itself never be beaten.
pub fn beats(play_rank: u8, field_rank: Option<u8>, revolution: bool) -> bool {
    match field_rank {
        None => true,
        Some(JOKER_ORDER) => false,
        Some(_) if play_rank == JOKER_ORDER => true,
        Some(prev) => {
            if revolution {
                play_rank < prev
            } else {
                play_rank > prev
            }
        }
    }
}

/// The rules state machine for one room.
pub struct RoomEngine {
    room_id: String,
    players: Vec<Player>,
    phase: Phase,
    turn_index: usize,
    field: Vec<Card>,
    field_rank: Option<u8>,
    field_count: usize,
    last_player_index: Option<usize>,
    pass_streak: usize,
    revolution: bool,
    /// Winner of the previous game, for the demotion rule.
    last_champion: Option<String>,
    last_move: Option<LastMove>,
    finish_counter: usize,
    config: EngineConfig,
}

impl RoomEngine {
    pub fn new(room_id: &str, config: EngineConfig) -> Self {
        Self {
            room_id: room_id.to_string(),
            players: Vec::new(),
            phase: Phase::Waiting,
            turn_index: 0,
            field: Vec::new(),
            field_rank: None,
            field_count: 0,
            last_player_index: None,
            pass_streak: 0,
            revolution: false,
            last_champion: None,
            last_move: None,
            finish_counter: 0,
            config,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    pub fn has_player(&self, name: &str) -> bool {
        self.player(name).is_some()
    }

    pub fn is_host(&self, name: &str) -> bool {
        self.players.first().is_some_and(|p| p.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn field_rank(&self) -> Option<u8> {
        self.field_rank
    }

    pub fn revolution(&self) -> bool {
        self.revolution
    }

    /// Name of the bot whose turn it is, if any.
    pub fn current_bot(&self) -> Option<&str> {
        if self.phase != Phase::InProgress {
            return None;
        }
        self.players
            .get(self.turn_index)
            .filter(|p| p.is_bot && !p.finished)
            .map(|p| p.name.as_str())
    }

    /// The final snapshot (with ranking) is broadcast once the game is over.
    pub fn is_final(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// True when no human seat holds a live connection.
    pub fn all_disconnected(&self) -> bool {
        self.players.iter().all(|p| p.is_bot || !p.connected)
    }

    // ── Seat management ───────────────────────────────────────────────

    /// Seat a new player, or rebind a disconnected seat of the same name.
    ///
    /// Bot seats are never reclaimable; a name clash with a bot is a
    /// duplicate like any connected seat.
    pub fn join(&mut self, name: &str) -> Result<JoinOutcome, EngineError> {
        if let Some(p) = self.players.iter_mut().find(|p| p.name == name) {
            if p.is_bot || p.connected {
                return Err(EngineError::DuplicateSeat);
            }
            p.connected = true;
            return Ok(JoinOutcome::Reconnected);
        }
        if self.phase == Phase::InProgress {
            return Err(EngineError::GameInProgress);
        }
        self.players.push(Player::human(name));
        Ok(JoinOutcome::Seated)
    }

    /// Mark a human seat as disconnected, keeping its hand and flags
    /// (the "ghost" awaiting reconnection). Returns false for unknown
    /// names and bots.
    pub fn disconnect(&mut self, name: &str) -> bool {
        match self
            .players
            .iter_mut()
            .find(|p| p.name == name && !p.is_bot)
        {
            Some(p) => {
                p.connected = false;
                true
            }
            None => false,
        }
    }

    // ── Game start ────────────────────────────────────────────────────

    /// Deal a fresh game. Host-only; also serves as `reset` after a
    /// finished game.
    pub fn start(&mut self, caller: &str) -> Result<(), EngineError> {
        if !self.is_host(caller) {
            return Err(EngineError::NotHost);
        }
        if self.phase == Phase::InProgress {
            return Err(EngineError::AlreadyStarted);
        }

        for p in &mut self.players {
            p.hand.clear();
            p.finished = false;
            p.finish_order = None;
            p.rank_title = None;
        }
        self.fill_bots();

        // Round-robin deal from seat 0; 53 cards split unevenly.
        let n = self.players.len();
        for (i, card) in cards::shuffled_deck().into_iter().enumerate() {
            self.players[i % n].hand.push(card);
        }
        for p in &mut self.players {
            p.hand.sort_by_key(Card::order_value);
        }

        self.clear_field();
        self.revolution = false;
        self.last_player_index = None;
        self.last_move = None;
        self.finish_counter = 0;
        self.turn_index = 0;
        self.phase = Phase::InProgress;
        Ok(())
    }

    fn fill_bots(&mut self) {
        let mut n = 1;
        while self.players.len() < self.config.seat_count {
            let name = format!("bot-{n}");
            n += 1;
            if self.has_player(&name) {
                continue;
            }
            self.players.push(Player::bot(name));
        }
    }

    // ── Actions ───────────────────────────────────────────────────────

    /// Play one or more cards. Validates fully before any mutation.
    pub fn play(&mut self, caller: &str, cards: &[CardInfo]) -> Result<(), EngineError> {
        if self.phase != Phase::InProgress {
            return Err(EngineError::NotInProgress);
        }
        let seat = self.seat_of(caller).ok_or(EngineError::UnknownPlayer)?;
        if seat != self.turn_index || self.players[seat].finished {
            return Err(EngineError::NotYourTurn);
        }
        if cards.is_empty() {
            return Err(EngineError::EmptyPlay);
        }

        // Resolve each descriptor to a distinct physical card in hand.
        let hand = &self.players[seat].hand;
        let mut claimed = vec![false; hand.len()];
        let mut picked = Vec::with_capacity(cards.len());
        for info in cards {
            let want = info.as_card().ok_or(EngineError::CardNotInHand)?;
            let idx = (0..hand.len())
                .find(|&i| !claimed[i] && hand[i] == want)
                .ok_or(EngineError::CardNotInHand)?;
            claimed[idx] = true;
            picked.push(idx);
        }
        let played: Vec<Card> = picked.iter().map(|&i| hand[i]).collect();

        // All non-jokers must share one rank.
        let mut shared_rank = None;
        for c in &played {
            if let Card::Standard { rank, .. } = c {
                match shared_rank {
                    None => shared_rank = Some(*rank),
                    Some(r) if r == *rank => {}
                    Some(_) => return Err(EngineError::MixedRanks),
                }
            }
        }

        // Any joker lifts the whole play to the unbeatable top value.
        let play_rank = if played.iter().any(Card::is_joker) {
            JOKER_ORDER
        } else {
            shared_rank.unwrap_or(JOKER_ORDER)
        };

        if !self.field.is_empty() {
            if played.len() != self.field_count {
                return Err(EngineError::WrongCount);
            }
            if !beats(play_rank, self.field_rank, self.revolution) {
                return Err(EngineError::DoesNotBeat);
            }
        }

        // Validation complete — mutate.
        picked.sort_unstable_by(|a, b| b.cmp(a));
        for i in picked {
            self.players[seat].hand.remove(i);
        }

        self.field = played.clone();
        self.field_count = played.len();
        self.field_rank = Some(play_rank);
        self.last_player_index = Some(seat);
        self.pass_streak = 0;

        let mut special = Vec::new();

        // Clearing play: field empties and the turn stays put.
        let clears = played.iter().any(Card::is_clearing);
        if clears {
            self.clear_field();
            special.push(SpecialEvent::EightClear);
        }

        // Four or more of one rank (jokers may pad the set) toggles the
        // comparison direction.
        let toggles = played.len() >= 4 && played.iter().any(|c| !c.is_joker());
        if toggles {
            self.revolution = !self.revolution;
            special.push(SpecialEvent::Revolution);
        }

        let finished_now = self.players[seat].hand.is_empty();
        if finished_now {
            self.mark_finished(seat);
        }

        self.last_move = Some(LastMove {
            player: caller.to_string(),
            kind: MoveKind::Play,
            cards: Some(played.iter().map(card_to_info).collect()),
            special,
        });

        if self.active_count() <= 1 {
            self.end_game();
            return Ok(());
        }

        if !clears || finished_now {
            self.turn_index = self.next_active(self.turn_index);
        }
        Ok(())
    }

    /// Pass on a live field. Enough consecutive passes flush the field
    /// and return the turn to its owner.
    pub fn pass(&mut self, caller: &str) -> Result<(), EngineError> {
        if self.phase != Phase::InProgress {
            return Err(EngineError::NotInProgress);
        }
        let seat = self.seat_of(caller).ok_or(EngineError::UnknownPlayer)?;
        if seat != self.turn_index || self.players[seat].finished {
            return Err(EngineError::NotYourTurn);
        }
        if self.field.is_empty() {
            return Err(EngineError::PassOnOpenField);
        }

        self.pass_streak += 1;

        // Everyone but the field's owner must pass; if the owner has
        // already finished, the whole table must.
        let active = self.active_count();
        let owner_active = self
            .last_player_index
            .is_some_and(|i| !self.players[i].finished);
        let needed = if owner_active { active - 1 } else { active };

        let mut special = Vec::new();
        if self.pass_streak >= needed {
            let owner = self.last_player_index;
            self.clear_field();
            self.turn_index = match owner {
                Some(i) if !self.players[i].finished => i,
                Some(i) => self.next_active(i),
                None => self.next_active(self.turn_index),
            };
            special.push(SpecialEvent::Flush);
        } else {
            self.turn_index = self.next_active(self.turn_index);
        }

        self.last_move = Some(LastMove {
            player: caller.to_string(),
            kind: MoveKind::Pass,
            cards: None,
            special,
        });
        Ok(())
    }

    // ── End of game ───────────────────────────────────────────────────

    fn end_game(&mut self) {
        if let Some(last) = self.players.iter().position(|p| !p.finished) {
            self.mark_finished(last);
        }

        // Rank by finish sequence: earliest out is best.
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        order.sort_by_key(|&i| self.players[i].finish_order.unwrap_or(usize::MAX));
        let n = order.len();
        for (pos, &i) in order.iter().enumerate() {
            let title = if pos == 0 {
                RankTitle::Tycoon
            } else if pos == 1 && n >= 4 {
                RankTitle::Rich
            } else if pos + 2 == n && n >= 4 {
                RankTitle::Poor
            } else if pos + 1 == n {
                RankTitle::Beggar
            } else {
                RankTitle::Commoner
            };
            self.players[i].rank_title = Some(title);
        }

        // Fall from grace: last game's Tycoon who fails to repeat drops
        // straight to Beggar.
        if self.config.demote_dethroned
            && let Some(champ) = self.last_champion.clone()
            && let Some(p) = self.players.iter_mut().find(|p| p.name == champ)
            && p.rank_title != Some(RankTitle::Tycoon)
        {
            p.rank_title = Some(RankTitle::Beggar);
        }

        self.last_champion = order.first().map(|&i| self.players[i].name.clone());
        self.phase = Phase::Finished;
    }

    // ── Helpers ───────────────────────────────────────────────────────

    fn seat_of(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.name == name)
    }

    fn active_count(&self) -> usize {
        self.players.iter().filter(|p| !p.finished).count()
    }

    /// Next non-finished seat strictly after `from`, wrapping.
    fn next_active(&self, from: usize) -> usize {
        let n = self.players.len();
        let mut i = from;
        loop {
            i = (i + 1) % n;
            if !self.players[i].finished || i == from {
                return i;
            }
        }
    }

    fn clear_field(&mut self) {
        self.field.clear();
        self.field_rank = None;
        self.field_count = 0;
        self.pass_streak = 0;
    }

    fn mark_finished(&mut self, seat: usize) {
        let order = self.finish_counter;
        self.finish_counter += 1;
        let p = &mut self.players[seat];
        p.finished = true;
        p.finish_order = Some(order);
    }

    // ── Snapshots ─────────────────────────────────────────────────────

    /// Build the state snapshot as seen by `viewer` (their own hand is
    /// included; everyone else sees only card counts).
    pub fn snapshot_for(&self, viewer: Option<&str>) -> StateSnapshot {
        StateSnapshot {
            room: self.room_id.clone(),
            started: self.phase == Phase::InProgress,
            players: self
                .players
                .iter()
                .map(|p| SeatInfo {
                    name: p.name.clone(),
                    cards_count: p.hand.len(),
                    finished: p.finished,
                    connected: p.connected || p.is_bot,
                })
                .collect(),
            field: FieldInfo {
                cards: self.field.iter().map(card_to_info).collect(),
            },
            current_turn: (self.phase == Phase::InProgress)
                .then(|| self.players[self.turn_index].name.clone()),
            revolution: self.revolution,
            ranking: self.is_final().then(|| {
                self.players
                    .iter()
                    .map(|p| RankEntry {
                        name: p.name.clone(),
                        title: p.rank_title.unwrap_or(RankTitle::Commoner),
                    })
                    .collect()
            }),
            last_move: self.last_move.clone(),
            your_hand: viewer
                .and_then(|v| self.player(v))
                .map(|p| p.hand.iter().map(card_to_info).collect()),
        }
    }
}
