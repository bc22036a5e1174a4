use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    BeloteError,
    card::{Card, Rank, Suit, shuffled_deck, sort_hand},
    rules::{Seat, legal_moves, team_of, trick_points, trick_winner},
};

pub const SEATS: usize = 4;
pub const TRICKS_PER_DEAL: u8 = 8;
pub const TOTAL_POINTS: u32 = 162;
pub const CAPOT_POINTS: u32 = 252;
pub const LAST_TRICK_BONUS: u32 = 10;
pub const BELOTE_BONUS: u32 = 20;
/// The taking team must score strictly more than this.
pub const CONTRACT_THRESHOLD: u32 = 81;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Waiting,
    Bidding,
    Playing,
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Bidding => "bidding",
            Phase::Playing => "playing",
            Phase::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bid {
    /// First round: accept the turned card's suit.
    Take,
    Pass,
    /// Second round: name another suit.
    Suit(Suit),
}

impl Bid {
    pub fn parse(action: &str, suit: Option<&str>) -> Result<Self, BeloteError> {
        match action.trim() {
            "take" => Ok(Bid::Take),
            "pass" => Ok(Bid::Pass),
            "suit" => {
                let suit = suit
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(BeloteError::InvalidBid("a suit must be named"))?;
                Ok(Bid::Suit(suit.parse()?))
            }
            other => Err(BeloteError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidOutcome {
    Continue,
    SecondRound,
    Taken { seat: Seat, trump: Suit },
    Redealt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Continue,
    TrickWon { winner: Seat, points: u32 },
    Finished(DealResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealResult {
    /// Final score per team, bonuses included.
    pub scores: [u32; 2],
    /// Card points per team including the last-trick bonus.
    pub card_points: [u32; 2],
    pub taker_team: usize,
    pub contract_made: bool,
    pub capot: Option<usize>,
    pub belote_team: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedTrick {
    pub cards: Vec<(Seat, Card)>,
    pub winner: Seat,
}

/// Full state of one deal, persisted as a SoliDB document between requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Game {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub players: [Option<String>; SEATS],
    #[serde(default)]
    pub dealer: Seat,
    #[serde(default)]
    pub hands: [Vec<Card>; SEATS],
    #[serde(default)]
    pub stock: Vec<Card>,
    #[serde(default)]
    pub turned: Option<Card>,
    #[serde(default)]
    pub bid_round: u8,
    #[serde(default)]
    pub passes: u8,
    #[serde(default)]
    pub turn: Seat,
    #[serde(default)]
    pub trump: Option<Suit>,
    #[serde(default)]
    pub taker: Option<Seat>,
    #[serde(default)]
    pub belote_team: Option<usize>,
    #[serde(default)]
    pub trick: Vec<(Seat, Card)>,
    #[serde(default)]
    pub last_trick: Option<PlayedTrick>,
    #[serde(default)]
    pub tricks_won: [u8; 2],
    #[serde(default)]
    pub card_points: [u32; 2],
    #[serde(default)]
    pub redeals: u32,
    #[serde(default)]
    pub result: Option<DealResult>,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seat_of(&self, user: &str) -> Option<Seat> {
        self.players
            .iter()
            .position(|p| p.as_deref() == Some(user))
    }

    pub fn is_full(&self) -> bool {
        self.players.iter().all(Option::is_some)
    }

    pub fn join(&mut self, seat: Seat, user: &str) -> Result<(), BeloteError> {
        self.expect_phase(Phase::Waiting)?;
        if seat >= SEATS {
            return Err(BeloteError::InvalidSeat(seat));
        }
        if self.seat_of(user).is_some() {
            return Err(BeloteError::AlreadySeated);
        }
        if self.players[seat].is_some() {
            return Err(BeloteError::SeatTaken(seat));
        }
        self.players[seat] = Some(user.to_string());
        Ok(())
    }

    /// Seat a player and deal as soon as the table is full.
    pub fn join_and_deal<R: Rng + ?Sized>(&mut self, seat: Seat, user: &str, rng: &mut R) -> Result<(), BeloteError> {
        self.join(seat, user)?;
        if self.is_full() {
            self.deal(shuffled_deck(rng))?;
        }
        Ok(())
    }

    /// Deal five cards to each seat starting left of the dealer and turn up
    /// the next card.
    pub fn deal(&mut self, mut deck: Vec<Card>) -> Result<(), BeloteError> {
        if !matches!(self.phase, Phase::Waiting | Phase::Bidding) {
            return Err(BeloteError::WrongPhase(self.phase));
        }
        if !self.is_full() {
            return Err(BeloteError::TableNotFull);
        }
        if deck.len() != 32 {
            return Err(BeloteError::BadDeck);
        }

        // Drawn from the back, so reverse to deal in deck order.
        deck.reverse();
        self.hands = Default::default();
        for offset in 1..=SEATS {
            let seat = (self.dealer + offset) % SEATS;
            for _ in 0..5 {
                if let Some(card) = deck.pop() {
                    self.hands[seat].push(card);
                }
            }
        }
        self.turned = deck.pop();
        deck.reverse();
        self.stock = deck;

        self.phase = Phase::Bidding;
        self.bid_round = 1;
        self.passes = 0;
        self.turn = (self.dealer + 1) % SEATS;
        self.trump = None;
        self.taker = None;
        self.belote_team = None;
        self.trick.clear();
        self.last_trick = None;
        self.tricks_won = [0; 2];
        self.card_points = [0; 2];
        self.result = None;
        Ok(())
    }

    pub fn bid<R: Rng + ?Sized>(&mut self, seat: Seat, bid: Bid, rng: &mut R) -> Result<BidOutcome, BeloteError> {
        self.expect_phase(Phase::Bidding)?;
        self.expect_turn(seat)?;
        let turned = self.turned.ok_or(BeloteError::BadDeck)?;

        let trump = match (self.bid_round, bid) {
            (_, Bid::Pass) => None,
            (1, Bid::Take) => Some(turned.suit),
            (1, Bid::Suit(_)) => {
                return Err(BeloteError::InvalidBid(
                    "only the turned suit can be taken in the first round",
                ));
            }
            (_, Bid::Take) => return Err(BeloteError::InvalidBid("name a suit in the second round")),
            (_, Bid::Suit(suit)) if suit == turned.suit => {
                return Err(BeloteError::InvalidBid(
                    "the turned suit was refused, name another suit",
                ));
            }
            (_, Bid::Suit(suit)) => Some(suit),
        };

        if let Some(trump) = trump {
            self.take(seat, trump, turned);
            return Ok(BidOutcome::Taken { seat, trump });
        }

        self.passes += 1;
        self.turn = (seat + 1) % SEATS;
        if usize::from(self.passes) < SEATS {
            return Ok(BidOutcome::Continue);
        }
        if self.bid_round == 1 {
            self.bid_round = 2;
            self.passes = 0;
            self.turn = (self.dealer + 1) % SEATS;
            return Ok(BidOutcome::SecondRound);
        }

        self.redeals += 1;
        self.dealer = (self.dealer + 1) % SEATS;
        self.deal(shuffled_deck(rng))?;
        Ok(BidOutcome::Redealt)
    }

    fn take(&mut self, seat: Seat, trump: Suit, turned: Card) {
        self.trump = Some(trump);
        self.taker = Some(seat);
        self.hands[seat].push(turned);
        self.turned = None;

        self.stock.reverse();
        for offset in 1..=SEATS {
            let target = (self.dealer + offset) % SEATS;
            let count = if target == seat { 2 } else { 3 };
            for _ in 0..count {
                if let Some(card) = self.stock.pop() {
                    self.hands[target].push(card);
                }
            }
        }
        self.stock.clear();

        let king = Card::new(Rank::King, trump);
        let queen = Card::new(Rank::Queen, trump);
        self.belote_team = self
            .hands
            .iter()
            .position(|h| h.contains(&king) && h.contains(&queen))
            .map(team_of);

        for hand in &mut self.hands {
            sort_hand(hand, Some(trump));
        }
        self.phase = Phase::Playing;
        self.turn = (self.dealer + 1) % SEATS;
    }

    pub fn legal_cards(&self, seat: Seat) -> Vec<Card> {
        match (self.phase, self.trump) {
            (Phase::Playing, Some(trump)) if seat == self.turn => {
                legal_moves(&self.hands[seat], &self.trick, trump, seat).1
            }
            _ => Vec::new(),
        }
    }

    pub fn play(&mut self, seat: Seat, card: Card) -> Result<PlayOutcome, BeloteError> {
        self.expect_phase(Phase::Playing)?;
        self.expect_turn(seat)?;
        let trump = self.trump.ok_or(BeloteError::WrongPhase(self.phase))?;

        let hand = &self.hands[seat];
        let Some(index) = hand.iter().position(|c| *c == card) else {
            return Err(BeloteError::NotInHand(card));
        };
        let (constraint, legal) = legal_moves(hand, &self.trick, trump, seat);
        if !legal.contains(&card) {
            return Err(BeloteError::IllegalCard {
                card,
                reason: constraint.to_string(),
            });
        }

        self.hands[seat].remove(index);
        self.trick.push((seat, card));
        if self.trick.len() < SEATS {
            self.turn = (seat + 1) % SEATS;
            return Ok(PlayOutcome::Continue);
        }

        let winner = trick_winner(&self.trick, trump).unwrap_or(seat);
        let team = team_of(winner);
        let mut points = trick_points(&self.trick, trump);
        self.tricks_won[team] += 1;
        let last = self.tricks_won.iter().sum::<u8>() == TRICKS_PER_DEAL;
        if last {
            points += LAST_TRICK_BONUS;
        }
        self.card_points[team] += points;
        self.last_trick = Some(PlayedTrick {
            cards: std::mem::take(&mut self.trick),
            winner,
        });
        self.turn = winner;

        if last {
            let result = self.score();
            self.result = Some(result.clone());
            self.phase = Phase::Finished;
            return Ok(PlayOutcome::Finished(result));
        }
        Ok(PlayOutcome::TrickWon { winner, points })
    }

    fn score(&self) -> DealResult {
        let taker_team = self.taker.map(team_of).unwrap_or(0);
        let defenders = 1 - taker_team;
        let capot = (0..2).find(|&t| self.tricks_won[t] == TRICKS_PER_DEAL);

        let mut scores = match capot {
            Some(team) => {
                let mut s = [0; 2];
                s[team] = CAPOT_POINTS;
                s
            }
            None => self.card_points,
        };

        let contract_made = capot != Some(defenders)
            && self.card_points[taker_team] > CONTRACT_THRESHOLD;
        if !contract_made {
            scores[defenders] = if capot == Some(defenders) {
                CAPOT_POINTS
            } else {
                TOTAL_POINTS
            };
            scores[taker_team] = 0;
        }
        if let Some(team) = self.belote_team {
            scores[team] += BELOTE_BONUS;
        }

        DealResult {
            scores,
            card_points: self.card_points,
            taker_team,
            contract_made,
            capot,
            belote_team: self.belote_team,
        }
    }

    pub fn view_for(&self, viewer: Option<Seat>) -> GameView {
        GameView {
            phase: self.phase,
            players: self.players.clone(),
            dealer: self.dealer,
            turn: self.turn,
            your_seat: viewer,
            your_hand: viewer.map(|s| self.hands[s].clone()).unwrap_or_default(),
            legal_cards: viewer.map(|s| self.legal_cards(s)).unwrap_or_default(),
            hand_sizes: std::array::from_fn(|s| self.hands[s].len()),
            turned: self.turned,
            bid_round: self.bid_round,
            trump: self.trump,
            taker: self.taker,
            trick: self.trick.clone(),
            last_trick: self.last_trick.clone(),
            tricks_won: self.tricks_won,
            card_points: self.card_points,
            result: self.result.clone(),
        }
    }

    fn expect_phase(&self, phase: Phase) -> Result<(), BeloteError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(BeloteError::WrongPhase(self.phase))
        }
    }

    fn expect_turn(&self, seat: Seat) -> Result<(), BeloteError> {
        if seat == self.turn {
            Ok(())
        } else {
            Err(BeloteError::NotYourTurn)
        }
    }
}

/// What one seat is allowed to see. Other hands are reduced to their size.
#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub phase: Phase,
    pub players: [Option<String>; SEATS],
    pub dealer: Seat,
    pub turn: Seat,
    pub your_seat: Option<Seat>,
    pub your_hand: Vec<Card>,
    pub legal_cards: Vec<Card>,
    pub hand_sizes: [usize; SEATS],
    pub turned: Option<Card>,
    pub bid_round: u8,
    pub trump: Option<Suit>,
    pub taker: Option<Seat>,
    pub trick: Vec<(Seat, Card)>,
    pub last_trick: Option<PlayedTrick>,
    pub tricks_won: [u8; 2],
    pub card_points: [u32; 2],
    pub result: Option<DealResult>,
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::services::belote::card::deck;

    fn seated() -> Game {
        let mut game = Game::new();
        for (seat, user) in ["ann", "bob", "cat", "dan"].iter().enumerate() {
            game.join(seat, user).unwrap();
        }
        game
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn seats_fill_before_dealing() {
        let mut game = Game::new();
        game.join(0, "ann").unwrap();
        assert_eq!(game.join(0, "bob"), Err(BeloteError::SeatTaken(0)));
        assert_eq!(game.join(1, "ann"), Err(BeloteError::AlreadySeated));
        assert_eq!(game.join(4, "bob"), Err(BeloteError::InvalidSeat(4)));
        assert_eq!(game.deal(deck()), Err(BeloteError::TableNotFull));

        let mut r = rng();
        for (seat, user) in [(1, "bob"), (2, "cat"), (3, "dan")] {
            game.join_and_deal(seat, user, &mut r).unwrap();
        }
        assert_eq!(game.phase, Phase::Bidding);
        assert!(game.hands.iter().all(|h| h.len() == 5));
        assert!(game.turned.is_some());
        assert_eq!(game.stock.len(), 11);
        assert_eq!(game.turn, 1);
    }

    #[test]
    fn taking_completes_the_hands() {
        let mut game = seated();
        game.deal(deck()).unwrap();
        let turned = game.turned.unwrap();
        let mut r = rng();

        assert_eq!(game.bid(2, Bid::Take, &mut r), Err(BeloteError::NotYourTurn));
        assert_eq!(game.bid(1, Bid::Pass, &mut r), Ok(BidOutcome::Continue));
        assert_eq!(
            game.bid(2, Bid::Take, &mut r),
            Ok(BidOutcome::Taken { seat: 2, trump: turned.suit })
        );
        assert_eq!(game.phase, Phase::Playing);
        assert!(game.hands.iter().all(|h| h.len() == 8));
        assert!(game.hands[2].contains(&turned));
        assert_eq!(game.turn, 1);
    }

    #[test]
    fn second_round_names_another_suit() {
        let mut game = seated();
        game.deal(deck()).unwrap();
        let turned = game.turned.unwrap().suit;
        let other = Suit::ALL.into_iter().find(|s| *s != turned).unwrap();
        let mut r = rng();

        for seat in [1, 2, 3] {
            assert_eq!(game.bid(seat, Bid::Pass, &mut r), Ok(BidOutcome::Continue));
        }
        assert_eq!(game.bid(0, Bid::Pass, &mut r), Ok(BidOutcome::SecondRound));
        assert!(matches!(game.bid(1, Bid::Take, &mut r), Err(BeloteError::InvalidBid(_))));
        assert!(matches!(game.bid(1, Bid::Suit(turned), &mut r), Err(BeloteError::InvalidBid(_))));
        assert_eq!(
            game.bid(1, Bid::Suit(other), &mut r),
            Ok(BidOutcome::Taken { seat: 1, trump: other })
        );
    }

    #[test]
    fn everyone_passing_twice_redeals() {
        let mut game = seated();
        game.deal(deck()).unwrap();
        let mut r = rng();
        let mut last = BidOutcome::Continue;
        for _ in 0..8 {
            let seat = game.turn;
            last = game.bid(seat, Bid::Pass, &mut r).unwrap();
        }
        assert_eq!(last, BidOutcome::Redealt);
        assert_eq!(game.dealer, 1);
        assert_eq!(game.redeals, 1);
        assert_eq!(game.phase, Phase::Bidding);
        assert_eq!(game.bid_round, 1);
        assert_eq!(game.turn, 2);
    }

    #[test]
    fn a_full_deal_scores_162_points() {
        let mut game = seated();
        game.deal(deck()).unwrap();
        let mut r = rng();
        let seat = game.turn;
        game.bid(seat, Bid::Take, &mut r).unwrap();

        let mut outcome = PlayOutcome::Continue;
        while game.phase == Phase::Playing {
            let seat = game.turn;
            let card = game.legal_cards(seat)[0];
            outcome = game.play(seat, card).unwrap();
        }

        let PlayOutcome::Finished(result) = outcome else {
            panic!("deal should be finished");
        };
        assert_eq!(result.card_points.iter().sum::<u32>(), TOTAL_POINTS);
        assert_eq!(game.tricks_won.iter().sum::<u8>(), TRICKS_PER_DEAL);
        assert!(game.hands.iter().all(Vec::is_empty));
        let bonus = if result.belote_team.is_some() { BELOTE_BONUS } else { 0 };
        let base: u32 = result.scores.iter().sum::<u32>() - bonus;
        assert!(base == TOTAL_POINTS || base == CAPOT_POINTS);
    }

    #[test]
    fn illegal_cards_are_refused_with_a_reason() {
        let mut game = seated();
        game.deal(deck()).unwrap();
        let mut r = rng();
        let seat = game.turn;
        game.bid(seat, Bid::Take, &mut r).unwrap();

        let leader = game.turn;
        let lead = game.hands[leader][0];
        game.play(leader, lead).unwrap();

        let next = game.turn;
        let legal = game.legal_cards(next);
        let illegal = game.hands[next].iter().copied().find(|c| !legal.contains(c));
        if let Some(card) = illegal {
            assert!(matches!(
                game.play(next, card),
                Err(BeloteError::IllegalCard { .. })
            ));
        }
        assert_eq!(game.play(leader, lead), Err(BeloteError::NotYourTurn));
    }

    fn scored(card_points: [u32; 2], tricks: [u8; 2], taker: Seat, belote: Option<usize>) -> DealResult {
        let game = Game {
            taker: Some(taker),
            card_points,
            tricks_won: tricks,
            belote_team: belote,
            ..Game::default()
        };
        game.score()
    }

    #[test]
    fn contract_made_keeps_card_points() {
        let r = scored([100, 62], [5, 3], 0, Some(1));
        assert!(r.contract_made);
        assert_eq!(r.scores, [100, 82]);
    }

    #[test]
    fn failed_contract_gives_defenders_everything() {
        let r = scored([81, 81], [4, 4], 0, Some(0));
        assert!(!r.contract_made);
        assert_eq!(r.scores, [20, 162]);
    }

    #[test]
    fn capot_is_worth_252() {
        let r = scored([162, 0], [8, 0], 2, None);
        assert_eq!(r.capot, Some(0));
        assert_eq!(r.scores, [252, 0]);

        let r = scored([0, 162], [0, 8], 0, None);
        assert!(!r.contract_made);
        assert_eq!(r.scores, [0, 252]);
    }

    #[test]
    fn bids_parse_from_form_values() {
        assert_eq!(Bid::parse("take", None), Ok(Bid::Take));
        assert_eq!(Bid::parse("suit", Some("S")), Ok(Bid::Suit(Suit::Spades)));
        assert!(Bid::parse("suit", None).is_err());
        assert!(Bid::parse("double", None).is_err());
    }

    #[test]
    fn state_survives_a_json_round_trip() {
        let mut game = seated();
        game.deal(deck()).unwrap();
        let json = serde_json::to_value(&game).unwrap();
        let back: Game = serde_json::from_value(json).unwrap();
        assert_eq!(back.hands, game.hands);
        assert_eq!(back.phase, Phase::Bidding);
    }
}
