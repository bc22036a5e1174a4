//! Belote rules engine: deck, bidding, legal moves, trick taking and scoring.
//!
//! Game state is a plain serde value so controllers can load it from SoliDB,
//! apply one action and store it back.

pub mod card;
pub mod game;
pub mod rules;

pub use card::{Card, Rank, Suit};
pub use game::{Bid, BidOutcome, DealResult, Game, GameView, Phase, PlayOutcome};
pub use rules::{Seat, team_of};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BeloteError {
    #[error("action not allowed while the game is {}", .0.as_str())]
    WrongPhase(Phase),
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("seat {0} is already taken")]
    SeatTaken(Seat),
    #[error("seat {0} does not exist")]
    InvalidSeat(Seat),
    #[error("you already have a seat at this table")]
    AlreadySeated,
    #[error("you are not seated at this table")]
    NotSeated,
    #[error("waiting for four players")]
    TableNotFull,
    #[error("a deal needs the full 32-card deck")]
    BadDeck,
    #[error("invalid card '{0}'")]
    InvalidCard(String),
    #[error("invalid suit '{0}'")]
    InvalidSuit(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("{0}")]
    InvalidBid(&'static str),
    #[error("{0} is not in your hand")]
    NotInHand(Card),
    #[error("cannot play {card}: {reason}")]
    IllegalCard { card: Card, reason: String },
}
