use std::{fmt, str::FromStr};

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::BeloteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Suit {
    #[serde(rename = "C")]
    Clubs,
    #[serde(rename = "D")]
    Diamonds,
    #[serde(rename = "H")]
    Hearts,
    #[serde(rename = "S")]
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];

    pub fn code(&self) -> char {
        match self {
            Suit::Clubs => 'C',
            Suit::Diamonds => 'D',
            Suit::Hearts => 'H',
            Suit::Spades => 'S',
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Suit::Clubs => '♣',
            Suit::Diamonds => '♦',
            Suit::Hearts => '♥',
            Suit::Spades => '♠',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Suit::Clubs => "clubs",
            Suit::Diamonds => "diamonds",
            Suit::Hearts => "hearts",
            Suit::Spades => "spades",
        }
    }

    fn from_code(c: char) -> Option<Suit> {
        Suit::ALL
            .into_iter()
            .find(|s| s.code() == c.to_ascii_uppercase())
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Suit {
    type Err = BeloteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let suit = match (chars.next(), chars.next()) {
            (Some(c), None) => Suit::from_code(c),
            _ => Suit::ALL
                .into_iter()
                .find(|suit| suit.name().eq_ignore_ascii_case(s)),
        };
        suit.ok_or_else(|| BeloteError::InvalidSuit(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 8] = [
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }

    fn from_code(code: &str) -> Option<Rank> {
        match code.to_ascii_uppercase().as_str() {
            "T" => Some(Rank::Ten),
            upper => Rank::ALL.into_iter().find(|r| r.code() == upper),
        }
    }

    /// Strength when the rank belongs to the trump suit: J 9 A 10 K Q 8 7.
    pub fn trump_strength(&self) -> u8 {
        match self {
            Rank::Jack => 8,
            Rank::Nine => 7,
            Rank::Ace => 6,
            Rank::Ten => 5,
            Rank::King => 4,
            Rank::Queen => 3,
            Rank::Eight => 2,
            Rank::Seven => 1,
        }
    }

    /// Strength in a plain suit: A 10 K Q J 9 8 7.
    pub fn plain_strength(&self) -> u8 {
        match self {
            Rank::Ace => 8,
            Rank::Ten => 7,
            Rank::King => 6,
            Rank::Queen => 5,
            Rank::Jack => 4,
            Rank::Nine => 3,
            Rank::Eight => 2,
            Rank::Seven => 1,
        }
    }

    pub fn trump_points(&self) -> u32 {
        match self {
            Rank::Jack => 20,
            Rank::Nine => 14,
            Rank::Ace => 11,
            Rank::Ten => 10,
            Rank::King => 4,
            Rank::Queen => 3,
            Rank::Eight | Rank::Seven => 0,
        }
    }

    pub fn plain_points(&self) -> u32 {
        match self {
            Rank::Ace => 11,
            Rank::Ten => 10,
            Rank::King => 4,
            Rank::Queen => 3,
            Rank::Jack => 2,
            Rank::Nine | Rank::Eight | Rank::Seven => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    pub fn is_trump(&self, trump: Suit) -> bool {
        self.suit == trump
    }

    pub fn points(&self, trump: Suit) -> u32 {
        if self.is_trump(trump) {
            self.rank.trump_points()
        } else {
            self.rank.plain_points()
        }
    }

    pub fn strength(&self, trump: Suit) -> u8 {
        if self.is_trump(trump) {
            self.rank.trump_strength()
        } else {
            self.rank.plain_strength()
        }
    }

    pub fn code(&self) -> String {
        format!("{}{}", self.rank.code(), self.suit.code())
    }

    pub fn label(&self) -> String {
        format!("{}{}", self.rank.code(), self.suit.symbol())
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl FromStr for Card {
    type Err = BeloteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || BeloteError::InvalidCard(s.to_string());
        let suit_char = s.chars().last().ok_or_else(invalid)?;
        let rank_part = &s[..s.len() - suit_char.len_utf8()];
        let rank = Rank::from_code(rank_part).ok_or_else(invalid)?;
        let suit = Suit::from_code(suit_char).ok_or_else(invalid)?;
        Ok(Card::new(rank, suit))
    }
}

impl TryFrom<String> for Card {
    type Error = BeloteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Card> for String {
    fn from(card: Card) -> Self {
        card.code()
    }
}

/// The 32-card deck in suit-major order.
pub fn deck() -> Vec<Card> {
    Suit::ALL
        .into_iter()
        .flat_map(|suit| Rank::ALL.into_iter().map(move |rank| Card::new(rank, suit)))
        .collect()
}

pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut cards = deck();
    cards.shuffle(rng);
    cards
}

/// Hand ordering for display: by suit, then by strength given the trump.
pub fn sort_hand(hand: &mut [Card], trump: Option<Suit>) {
    hand.sort_by(|a, b| {
        a.suit.cmp(&b.suit).then_with(|| {
            let strength = |c: &Card| match trump {
                Some(t) => c.strength(t),
                None => c.rank.plain_strength(),
            };
            strength(b).cmp(&strength(a))
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_codes_parse() {
        assert_eq!("JH".parse::<Card>().unwrap(), Card::new(Rank::Jack, Suit::Hearts));
        assert_eq!("10s".parse::<Card>().unwrap(), Card::new(Rank::Ten, Suit::Spades));
        assert_eq!("TD".parse::<Card>().unwrap(), Card::new(Rank::Ten, Suit::Diamonds));
        assert!("6H".parse::<Card>().is_err());
        assert!("J".parse::<Card>().is_err());
        assert!("".parse::<Card>().is_err());
        assert_eq!(Card::new(Rank::Ten, Suit::Clubs).to_string(), "10C");
    }

    #[test]
    fn deck_is_complete() {
        let cards = deck();
        assert_eq!(cards.len(), 32);
        let trump_total: u32 = cards
            .iter()
            .filter(|c| c.suit == Suit::Hearts)
            .map(|c| c.points(Suit::Hearts))
            .sum();
        let plain_total: u32 = cards
            .iter()
            .filter(|c| c.suit == Suit::Spades)
            .map(|c| c.points(Suit::Hearts))
            .sum();
        assert_eq!(trump_total, 62);
        assert_eq!(plain_total, 30);
        // 62 + 3 * 30 + 10 for the last trick
        assert_eq!(trump_total + 3 * plain_total + 10, 162);
    }

    #[test]
    fn cards_serialize_as_codes() {
        let json = serde_json::to_string(&Card::new(Rank::Queen, Suit::Clubs)).unwrap();
        assert_eq!(json, "\"QC\"");
        let card: Card = serde_json::from_str("\"9D\"").unwrap();
        assert_eq!(card, Card::new(Rank::Nine, Suit::Diamonds));
    }
}
