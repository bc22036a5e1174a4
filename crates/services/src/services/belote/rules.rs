use std::fmt;

use super::card::{Card, Suit};

pub type Seat = usize;

pub fn partner(seat: Seat) -> Seat {
    (seat + 2) % 4
}

pub fn team_of(seat: Seat) -> usize {
    seat % 2
}

/// The constraint that produced a set of legal cards; used to explain why a
/// card was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Free,
    FollowSuit(Suit),
    HigherTrump,
    Trump,
    Overtrump,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Free => f.write_str("any card may be played"),
            Constraint::FollowSuit(suit) => write!(f, "you must follow {suit}"),
            Constraint::HigherTrump => f.write_str("you must play a higher trump"),
            Constraint::Trump => f.write_str("you must trump"),
            Constraint::Overtrump => f.write_str("you must overtrump"),
        }
    }
}

/// Seat currently winning a (possibly partial) trick.
pub fn trick_winner(trick: &[(Seat, Card)], trump: Suit) -> Option<Seat> {
    let (_, lead) = trick.first()?;
    let led = lead.suit;
    trick
        .iter()
        .max_by_key(|(_, card)| {
            if card.is_trump(trump) {
                (2, card.rank.trump_strength())
            } else if card.suit == led {
                (1, card.rank.plain_strength())
            } else {
                (0, 0)
            }
        })
        .map(|(seat, _)| *seat)
}

pub fn trick_points(trick: &[(Seat, Card)], trump: Suit) -> u32 {
    trick.iter().map(|(_, card)| card.points(trump)).sum()
}

fn highest_trump(trick: &[(Seat, Card)], trump: Suit) -> Option<u8> {
    trick
        .iter()
        .filter(|(_, c)| c.is_trump(trump))
        .map(|(_, c)| c.rank.trump_strength())
        .max()
}

/// Cards `seat` may play from `hand` onto `trick`.
pub fn legal_moves(hand: &[Card], trick: &[(Seat, Card)], trump: Suit, seat: Seat) -> (Constraint, Vec<Card>) {
    let Some((_, lead)) = trick.first() else {
        return (Constraint::Free, hand.to_vec());
    };
    let led = lead.suit;
    let trumps: Vec<Card> = hand.iter().copied().filter(|c| c.is_trump(trump)).collect();
    let beats_trick = |cards: &[Card]| -> Vec<Card> {
        let top = highest_trump(trick, trump).unwrap_or(0);
        cards
            .iter()
            .copied()
            .filter(|c| c.rank.trump_strength() > top)
            .collect()
    };

    if led == trump {
        if trumps.is_empty() {
            return (Constraint::Free, hand.to_vec());
        }
        let higher = beats_trick(&trumps);
        return if higher.is_empty() {
            (Constraint::FollowSuit(trump), trumps)
        } else {
            (Constraint::HigherTrump, higher)
        };
    }

    let following: Vec<Card> = hand.iter().copied().filter(|c| c.suit == led).collect();
    if !following.is_empty() {
        return (Constraint::FollowSuit(led), following);
    }

    let partner_winning = trick_winner(trick, trump) == Some(partner(seat));
    if partner_winning || trumps.is_empty() {
        return (Constraint::Free, hand.to_vec());
    }

    if highest_trump(trick, trump).is_some() {
        let higher = beats_trick(&trumps);
        if !higher.is_empty() {
            return (Constraint::Overtrump, higher);
        }
    }
    (Constraint::Trump, trumps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(codes: &[&str]) -> Vec<Card> {
        codes.iter().map(|c| c.parse().unwrap()).collect()
    }

    fn trick(plays: &[(Seat, &str)]) -> Vec<(Seat, Card)> {
        plays.iter().map(|(s, c)| (*s, c.parse().unwrap())).collect()
    }

    #[test]
    fn trump_beats_led_suit() {
        let t = trick(&[(0, "AS"), (1, "10S"), (2, "7H"), (3, "KS")]);
        assert_eq!(trick_winner(&t, Suit::Hearts), Some(2));
        assert_eq!(trick_winner(&t, Suit::Clubs), Some(0));
    }

    #[test]
    fn trump_order_puts_jack_and_nine_first() {
        let t = trick(&[(0, "AH"), (1, "9H"), (2, "10H"), (3, "JH")]);
        assert_eq!(trick_winner(&t, Suit::Hearts), Some(3));
        let t = trick(&[(0, "AH"), (1, "9H"), (2, "10H")]);
        assert_eq!(trick_winner(&t, Suit::Hearts), Some(1));
        assert_eq!(trick_points(&t, Suit::Hearts), 35);
    }

    #[test]
    fn discards_never_win() {
        let t = trick(&[(1, "7D"), (2, "AC"), (3, "8D")]);
        assert_eq!(trick_winner(&t, Suit::Spades), Some(3));
    }

    #[test]
    fn must_follow_suit() {
        let hand = cards(&["7S", "KS", "JH", "AD"]);
        let t = trick(&[(0, "AS")]);
        let (rule, legal) = legal_moves(&hand, &t, Suit::Hearts, 1);
        assert_eq!(rule, Constraint::FollowSuit(Suit::Spades));
        assert_eq!(legal, cards(&["7S", "KS"]));
    }

    #[test]
    fn must_trump_when_void() {
        let hand = cards(&["7H", "JH", "AD"]);
        let t = trick(&[(0, "AS")]);
        let (rule, legal) = legal_moves(&hand, &t, Suit::Hearts, 1);
        assert_eq!(rule, Constraint::Trump);
        assert_eq!(legal, cards(&["7H", "JH"]));
    }

    #[test]
    fn free_when_partner_is_winning() {
        let hand = cards(&["7H", "AD"]);
        let t = trick(&[(0, "AS"), (1, "7S")]);
        let (rule, legal) = legal_moves(&hand, &t, Suit::Hearts, 2);
        assert_eq!(rule, Constraint::Free);
        assert_eq!(legal.len(), 2);
    }

    #[test]
    fn must_overtrump_an_opponent() {
        let hand = cards(&["7H", "9H", "AD"]);
        let t = trick(&[(0, "AS"), (1, "AH")]);
        let (rule, legal) = legal_moves(&hand, &t, Suit::Hearts, 2);
        assert_eq!(rule, Constraint::Overtrump);
        assert_eq!(legal, cards(&["9H"]));
    }

    #[test]
    fn undertrumps_when_unable_to_overtrump() {
        let hand = cards(&["7H", "8H", "AD"]);
        let t = trick(&[(0, "AS"), (1, "JH")]);
        let (rule, legal) = legal_moves(&hand, &t, Suit::Hearts, 2);
        assert_eq!(rule, Constraint::Trump);
        assert_eq!(legal, cards(&["7H", "8H"]));
    }

    #[test]
    fn trump_lead_requires_higher_trump() {
        let hand = cards(&["7H", "JH", "AD"]);
        let t = trick(&[(0, "9H")]);
        let (rule, legal) = legal_moves(&hand, &t, Suit::Hearts, 1);
        assert_eq!(rule, Constraint::HigherTrump);
        assert_eq!(legal, cards(&["JH"]));

        let hand = cards(&["7H", "8H", "AD"]);
        let (rule, legal) = legal_moves(&hand, &t, Suit::Hearts, 1);
        assert_eq!(rule, Constraint::FollowSuit(Suit::Hearts));
        assert_eq!(legal, cards(&["7H", "8H"]));
    }
}
