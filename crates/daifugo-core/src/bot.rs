//! Bot decision policy for unattended seats.
//!
//! Pure and deterministic given a hand and a field view; the server is
//! responsible for deferring and re-validating the move before applying
//! it (the room may have changed during the think delay).

use std::collections::BTreeMap;

use crate::cards::{Card, JOKER_ORDER};
use crate::engine::beats;

/// What the bot can see of the table.
#[derive(Debug, Clone, Copy)]
pub struct FieldView {
    /// Cards per play required to beat the field; 0 = open field.
    pub count: usize,
    /// Effective rank of the live field, if any.
    pub rank: Option<u8>,
    pub revolution: bool,
}

/// The bot's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotMove {
    Play(Vec<Card>),
    Pass,
}

/// Decide a move for a bot holding `hand` against `field`.
///
/// Open field: the single lowest non-joker, else the lone joker.
/// Otherwise: the lowest rank group big enough to match the field that
/// legally beats it, falling back to a lone joker for single-card
/// fields, falling back to a pass.
pub fn choose_move(hand: &[Card], field: &FieldView) -> BotMove {
    if field.count == 0 {
        let lowest = hand
            .iter()
            .filter(|c| !c.is_joker())
            .min_by_key(|c| c.order_value())
            .or_else(|| hand.first());
        return match lowest {
            Some(card) => BotMove::Play(vec![*card]),
            None => BotMove::Pass,
        };
    }

    // Group non-jokers by rank; BTreeMap iteration gives lowest first.
    let mut groups: BTreeMap<u8, Vec<Card>> = BTreeMap::new();
    for card in hand {
        if let Card::Standard { rank, .. } = card {
            groups.entry(*rank).or_default().push(*card);
        }
    }

    for (rank, cards) in &groups {
        if cards.len() >= field.count && beats(*rank, field.rank, field.revolution) {
            return BotMove::Play(cards[..field.count].to_vec());
        }
    }

    if field.count == 1
        && hand.iter().any(Card::is_joker)
        && beats(JOKER_ORDER, field.rank, field.revolution)
    {
        return BotMove::Play(vec![Card::Joker]);
    }

    BotMove::Pass
}
