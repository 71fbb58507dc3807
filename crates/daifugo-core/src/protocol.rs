//! Wire protocol: JSON messages exchanged over the WebSocket.
//!
//! Every message carries a `type` discriminator. Snapshots are sent
//! individually to each connected player so `yourHand` never leaks to
//! anyone else.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cards::{Card, MAX_RANK, MIN_RANK, Suit};

/// Suit field of a wire card descriptor; `joker` is the sentinel for
/// the rankless joker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuitCode {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
    Joker,
}

/// Serializable card descriptor.
///
/// `rank` is absent for the joker and ignored when `suit` is `joker`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInfo {
    pub suit: SuitCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u8>,
}

impl CardInfo {
    /// Resolve the descriptor to a concrete card, if well-formed.
    pub fn as_card(&self) -> Option<Card> {
        match self.suit {
            SuitCode::Joker => Some(Card::Joker),
            code => {
                let suit = match code {
                    SuitCode::Clubs => Suit::Clubs,
                    SuitCode::Diamonds => Suit::Diamonds,
                    SuitCode::Hearts => Suit::Hearts,
                    SuitCode::Spades => Suit::Spades,
                    SuitCode::Joker => unreachable!(),
                };
                let rank = self.rank?;
                if (MIN_RANK..=MAX_RANK).contains(&rank) {
                    Some(Card::Standard { suit, rank })
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for CardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.suit, self.rank) {
            (SuitCode::Joker, _) => write!(f, "Joker"),
            (suit, Some(rank)) => {
                let sym = match suit {
                    SuitCode::Clubs => "♣",
                    SuitCode::Diamonds => "♦",
                    SuitCode::Hearts => "♥",
                    SuitCode::Spades => "♠",
                    SuitCode::Joker => unreachable!(),
                };
                write!(f, "{sym}{}", Card::rank_label(rank))
            }
            (_, None) => write!(f, "?"),
        }
    }
}

/// Convert an engine card to its wire descriptor.
pub fn card_to_info(card: &Card) -> CardInfo {
    match card {
        Card::Standard { suit, rank } => CardInfo {
            suit: match suit {
                Suit::Clubs => SuitCode::Clubs,
                Suit::Diamonds => SuitCode::Diamonds,
                Suit::Hearts => SuitCode::Hearts,
                Suit::Spades => SuitCode::Spades,
            },
            rank: Some(*rank),
        },
        Card::Joker => CardInfo {
            suit: SuitCode::Joker,
            rank: None,
        },
    }
}

/// Final-ranking title, best to worst.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RankTitle {
    Tycoon,
    Rich,
    Commoner,
    Poor,
    Beggar,
}

impl RankTitle {
    pub fn label(self) -> &'static str {
        match self {
            RankTitle::Tycoon => "Tycoon",
            RankTitle::Rich => "Rich",
            RankTitle::Commoner => "Commoner",
            RankTitle::Poor => "Poor",
            RankTitle::Beggar => "Beggar",
        }
    }
}

/// One entry of the final ranking broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankEntry {
    pub name: String,
    pub title: RankTitle,
}

/// Per-seat public info in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatInfo {
    pub name: String,
    pub cards_count: usize,
    pub finished: bool,
    pub connected: bool,
}

/// The cards currently on the table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FieldInfo {
    pub cards: Vec<CardInfo>,
}

/// What kind of action the last mover took.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    Play,
    Pass,
}

/// Special effects attached to the last move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialEvent {
    /// A play containing the clearing rank emptied the field.
    EightClear,
    /// The play toggled the comparison direction.
    Revolution,
    /// Consecutive passes flushed the field.
    Flush,
}

/// Description of the most recent accepted action, for UI display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMove {
    pub player: String,
    #[serde(rename = "move")]
    pub kind: MoveKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<CardInfo>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special: Vec<SpecialEvent>,
}

/// Full room state as seen by one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub room: String,
    pub started: bool,
    pub players: Vec<SeatInfo>,
    pub field: FieldInfo,
    pub current_turn: Option<String>,
    pub revolution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking: Option<Vec<RankEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<LastMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_hand: Option<Vec<CardInfo>>,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Enter (or create) a room, or reclaim a disconnected seat.
    Join { room: String, name: String },

    /// Start the game (host only, not while a game is running).
    Start,

    /// Restart after a finished game (host only; same effect as start).
    Reset,

    /// Play one or more cards from your hand.
    Play { cards: Vec<CardInfo> },

    /// Pass on the current field.
    Pass,

    /// Dissolve the room (host only).
    Dissolve,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Mid-game state snapshot.
    Update(StateSnapshot),

    /// End-of-game snapshot carrying the final ranking.
    Final(StateSnapshot),

    /// The room was dissolved or expired.
    RoomDeleted,

    /// Malformed input or rejected action.
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Maximum cards a single `play` message may carry.
pub const MAX_PLAY_CARDS: usize = 5;

/// Validate a room ID: 1–32 characters from `[A-Za-z0-9_-]`.
pub fn validate_room_id(id: &str) -> Result<(), String> {
    if id.is_empty() || id.len() > 32 {
        return Err("Room ID must be 1-32 characters".to_string());
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Room ID may only contain letters, digits, '_' and '-'".to_string());
    }
    Ok(())
}

/// Validate a player name: non-empty, at most 16 characters, no control
/// characters, not whitespace-only.
pub fn validate_player_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.chars().count() > 16 {
        return Err("Name must be 1-16 characters".to_string());
    }
    if name.chars().any(|c| c.is_control()) {
        return Err("Name must not contain control characters".to_string());
    }
    if name.chars().all(|c| c.is_whitespace()) {
        return Err("Name must not be blank".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_room_ids() {
        assert!(validate_room_id("r1").is_ok());
        assert!(validate_room_id("Room_42-b").is_ok());
        assert!(validate_room_id(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn invalid_room_ids() {
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id(&"a".repeat(33)).is_err());
        assert!(validate_room_id("hello world").is_err());
        assert!(validate_room_id("部屋").is_err());
    }

    #[test]
    fn valid_player_names() {
        assert!(validate_player_name("alice").is_ok());
        assert!(validate_player_name("プレイヤー1").is_ok());
        assert!(validate_player_name(&"x".repeat(16)).is_ok());
    }

    #[test]
    fn invalid_player_names() {
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name(&"x".repeat(17)).is_err());
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name("a\x01b").is_err());
    }

    #[test]
    fn client_message_json_shape() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","room":"r1","name":"alice"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Join { ref room, ref name }
            if room == "r1" && name == "alice"));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"play","cards":[{"suit":"clubs","rank":3},{"suit":"joker"}]}"#,
        )
        .unwrap();
        let ClientMessage::Play { cards } = msg else {
            panic!("expected play");
        };
        assert_eq!(cards.len(), 2);
        assert_eq!(
            cards[0].as_card(),
            Some(Card::Standard {
                suit: Suit::Clubs,
                rank: 3
            })
        );
        assert_eq!(cards[1].as_card(), Some(Card::Joker));
    }

    #[test]
    fn server_message_type_tags() {
        let json = serde_json::to_string(&ServerMessage::RoomDeleted).unwrap();
        assert_eq!(json, r#"{"type":"room-deleted"}"#);

        let snapshot = StateSnapshot {
            room: "r1".to_string(),
            started: false,
            players: vec![],
            field: FieldInfo::default(),
            current_turn: None,
            revolution: false,
            ranking: None,
            last_move: None,
            your_hand: None,
        };
        let json = serde_json::to_string(&ServerMessage::Update(snapshot)).unwrap();
        assert!(json.starts_with(r#"{"type":"update""#));
        assert!(json.contains(r#""currentTurn":null"#));
    }

    #[test]
    fn malformed_card_descriptors_do_not_resolve() {
        let no_rank = CardInfo {
            suit: SuitCode::Clubs,
            rank: None,
        };
        assert_eq!(no_rank.as_card(), None);

        let bad_rank = CardInfo {
            suit: SuitCode::Hearts,
            rank: Some(16),
        };
        assert_eq!(bad_rank.as_card(), None);

        let two = CardInfo {
            suit: SuitCode::Hearts,
            rank: Some(2),
        };
        assert_eq!(two.as_card(), None);
    }
}
