//! Card and deck types for the shedding game.
//!
//! Ranks run 3..=15 where 11=J, 12=Q, 13=K, 14=A and 15=2 — play
//! strength, not face value, drives the ordering. The joker carries no
//! rank of its own but compares as [`JOKER_ORDER`], above everything.

use rand::rng;
use rand::seq::SliceRandom;
use std::fmt;

/// Lowest playable rank (the 3).
pub const MIN_RANK: u8 = 3;
/// Highest standard rank (the 2, strongest non-joker card).
pub const MAX_RANK: u8 = 15;
/// Comparison value of the joker: above every standard rank.
pub const JOKER_ORDER: u8 = 16;
/// Rank whose play immediately clears the field (the 8).
pub const CLEARING_RANK: u8 = 8;

/// One of the four standard suits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    /// All suits in deck-construction order.
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];

    pub fn symbol(&self) -> &'static str {
        match self {
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Hearts => "♥",
            Suit::Spades => "♠",
        }
    }
}

/// A single card: one of the 52 suited cards or the lone joker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Card {
    Standard { suit: Suit, rank: u8 },
    Joker,
}

impl Card {
    /// Comparison value used for ordering plays and sorting hands.
    pub fn order_value(&self) -> u8 {
        match self {
            Card::Standard { rank, .. } => *rank,
            Card::Joker => JOKER_ORDER,
        }
    }

    pub fn is_joker(&self) -> bool {
        matches!(self, Card::Joker)
    }

    /// Whether this card triggers the field-clearing special.
    pub fn is_clearing(&self) -> bool {
        matches!(self, Card::Standard { rank, .. } if *rank == CLEARING_RANK)
    }

    /// Rank label as shown to players ("3".."10", "J", "Q", "K", "A", "2").
    pub fn rank_label(rank: u8) -> String {
        match rank {
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            14 => "A".to_string(),
            15 => "2".to_string(),
            r => r.to_string(),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Card::Standard { suit, rank } => {
                write!(f, "{}{}", suit.symbol(), Card::rank_label(*rank))
            }
            Card::Joker => write!(f, "Joker"),
        }
    }
}

/// Build the full 53-card deck (52 suited cards + 1 joker), unshuffled.
pub fn full_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(53);
    for suit in Suit::ALL {
        for rank in MIN_RANK..=MAX_RANK {
            deck.push(Card::Standard { suit, rank });
        }
    }
    deck.push(Card::Joker);
    deck
}

/// Build the full deck and shuffle it in place.
pub fn shuffled_deck() -> Vec<Card> {
    let mut deck = full_deck();
    let mut rng = rng();
    deck.shuffle(&mut rng);
    deck
}
