//! Belote lobby and table.
//!
//! The table is rendered from a [`GameView`], so a player only ever receives
//! their own hand.

use std::fmt::Write as _;

use serde::Deserialize;
use services::services::belote::{Card, GameView, Phase, Seat, Suit, team_of};
use utils::html::escape;

use super::errors;

const SEAT_NAMES: [&str; 4] = ["North", "East", "South", "West"];
const TEAM_NAMES: [&str; 2] = ["North / South", "East / West"];

/// Lobby row, projected from the stored game document.
#[derive(Debug, Clone, Deserialize)]
pub struct GameSummary {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub player_names: [Option<String>; 4],
}

impl GameSummary {
    fn seated(&self) -> usize {
        self.player_names.iter().flatten().count()
    }
}

pub fn lobby(games: &[GameSummary], form_errors: &[String]) -> String {
    let rows: String = games
        .iter()
        .map(|g| {
            let names = g
                .player_names
                .iter()
                .flatten()
                .map(|n| escape(n))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                r#"<tr><td><a href="/belote/games/{key}">{title}</a></td><td>{phase}</td><td>{seated}/4</td><td>{names}</td></tr>"#,
                key = escape(&g.key),
                title = escape(&g.title),
                phase = g.phase.as_str(),
                seated = g.seated(),
            )
        })
        .collect();
    let rows = if rows.is_empty() {
        r#"<tr><td colspan="4" class="muted">No tables yet.</td></tr>"#.to_string()
    } else {
        rows
    };
    format!(
        r##"<section id="belote">
<h1>Belote</h1>
<table><thead><tr><th>Table</th><th>Phase</th><th>Seated</th><th>Players</th></tr></thead><tbody>{rows}</tbody></table>
<h2>New table</h2>
<form method="post" action="/belote/games" hx-post="/belote/games" hx-target="#belote" hx-swap="outerHTML">
{errors}
<label>Name <input type="text" name="title" placeholder="Friday game"></label>
<button type="submit">Create</button>
</form>
</section>"##,
        errors = errors(form_errors),
    )
}

fn card_span(card: Card) -> String {
    let colour = match card.suit {
        Suit::Hearts | Suit::Diamonds => "red",
        Suit::Clubs | Suit::Spades => "black",
    };
    format!(
        r#"<span class="card {colour}">{}</span>"#,
        escape(&card.label())
    )
}

fn seat_label(view: &GameView, names: &[Option<String>; 4], seat: Seat) -> String {
    let name = names[seat]
        .as_deref()
        .or(view.players[seat].as_deref())
        .unwrap_or("empty");
    format!("{} ({})", escape(name), SEAT_NAMES[seat])
}

fn seats(key: &str, view: &GameView, names: &[Option<String>; 4]) -> String {
    let mut out = String::new();
    for seat in 0..4 {
        let mut marks = Vec::new();
        if view.phase != Phase::Waiting && view.phase != Phase::Finished && view.turn == seat {
            marks.push("to play");
        }
        if view.dealer == seat {
            marks.push("dealer");
        }
        if view.taker == Some(seat) {
            marks.push("taker");
        }
        if view.your_seat == Some(seat) {
            marks.push("you");
        }
        let body = if view.players[seat].is_some() {
            format!(
                "{label} <small>{cards} cards {marks}</small>",
                label = seat_label(view, names, seat),
                cards = view.hand_sizes[seat],
                marks = marks.join(", "),
            )
        } else if view.your_seat.is_none() && view.phase == Phase::Waiting {
            format!(
                r##"<form hx-post="/belote/games/{key}/join" hx-target="#belote-table" hx-swap="outerHTML"><input type="hidden" name="seat" value="{seat}"><button type="submit">Sit {name}</button></form>"##,
                key = escape(key),
                name = SEAT_NAMES[seat],
            )
        } else {
            format!(r#"<span class="muted">{} is free</span>"#, SEAT_NAMES[seat])
        };
        let _ = write!(out, r#"<li class="seat seat-{seat}">{body}</li>"#);
    }
    format!(r#"<ul class="seats">{out}</ul>"#)
}

fn bidding(key: &str, view: &GameView) -> String {
    let Some(turned) = view.turned else {
        return String::new();
    };
    let mut out = format!(
        "<p>Turned card: {} · round {}</p>",
        card_span(turned),
        view.bid_round
    );
    if view.your_seat != Some(view.turn) {
        return out;
    }
    let action = format!("/belote/games/{}/bid", escape(key));
    if view.bid_round <= 1 {
        let _ = write!(
            out,
            r##"<div class="actions"><button hx-post="{action}" hx-vals='{{"action": "take"}}' hx-target="#belote-table" hx-swap="outerHTML">Take {suit}</button>
<button hx-post="{action}" hx-vals='{{"action": "pass"}}' hx-target="#belote-table" hx-swap="outerHTML">Pass</button></div>"##,
            suit = turned.suit.name(),
        );
    } else {
        let choices: String = Suit::ALL
            .into_iter()
            .filter(|s| *s != turned.suit)
            .map(|s| format!(r#"<option value="{}">{} {}</option>"#, s.code(), s.symbol(), s.name()))
            .collect();
        let _ = write!(
            out,
            r##"<div class="actions"><form hx-post="{action}" hx-target="#belote-table" hx-swap="outerHTML">
<input type="hidden" name="action" value="suit"><select name="suit">{choices}</select><button type="submit">Name trump</button></form>
<button hx-post="{action}" hx-vals='{{"action": "pass"}}' hx-target="#belote-table" hx-swap="outerHTML">Pass</button></div>"##
        );
    }
    out
}

fn trick(view: &GameView, names: &[Option<String>; 4]) -> String {
    let mut out = String::new();
    if !view.trick.is_empty() {
        out.push_str("<h3>Trick</h3><ol class=\"trick\">");
        for (seat, card) in &view.trick {
            let _ = write!(out, "<li>{} {}</li>", seat_label(view, names, *seat), card_span(*card));
        }
        out.push_str("</ol>");
    }
    if let Some(last) = &view.last_trick {
        let cards: String = last.cards.iter().map(|(_, c)| card_span(*c)).collect();
        let _ = write!(
            out,
            r#"<p class="muted">Last trick {cards} won by {}</p>"#,
            seat_label(view, names, last.winner)
        );
    }
    out
}

fn hand(key: &str, view: &GameView) -> String {
    if view.your_hand.is_empty() {
        return String::new();
    }
    let action = format!("/belote/games/{}/play", escape(key));
    let mut out = String::from(r#"<h3>Your hand</h3><div class="hand">"#);
    for card in &view.your_hand {
        if view.legal_cards.contains(card) {
            let _ = write!(
                out,
                r##"<button class="card-button" hx-post="{action}" hx-vals='{{"card": "{code}"}}' hx-target="#belote-table" hx-swap="outerHTML">{span}</button>"##,
                code = card.code(),
                span = card_span(*card),
            );
        } else {
            let _ = write!(out, r#"<button class="card-button" disabled>{}</button>"#, card_span(*card));
        }
    }
    out.push_str("</div>");
    out
}

fn scores(view: &GameView) -> String {
    let mut out = String::from("<table class=\"scores\"><thead><tr><th>Team</th><th>Tricks</th><th>Points</th>");
    if view.result.is_some() {
        out.push_str("<th>Score</th>");
    }
    out.push_str("</tr></thead><tbody>");
    for team in 0..2 {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td>",
            TEAM_NAMES[team], view.tricks_won[team], view.card_points[team]
        );
        if let Some(result) = &view.result {
            let _ = write!(out, "<td>{}</td>", result.scores[team]);
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");

    if let Some(result) = &view.result {
        let verdict = if result.capot.is_some() {
            "Capot!"
        } else if result.contract_made {
            "Contract made."
        } else {
            "Contract failed."
        };
        let _ = write!(
            out,
            "<p class=\"result\">{verdict} Taker: {}.",
            TEAM_NAMES[result.taker_team]
        );
        if let Some(team) = result.belote_team {
            let _ = write!(out, " Belote for {}.", TEAM_NAMES[team]);
        }
        out.push_str("</p>");
    }
    out
}

/// The table as seen from `view.your_seat`. It polls itself until the deal
/// is over.
pub fn table(key: &str, title: &str, view: &GameView, names: &[Option<String>; 4]) -> String {
    let poll = if view.phase == Phase::Finished {
        String::new()
    } else {
        format!(
            r#" hx-get="/belote/games/{}" hx-trigger="every 3s" hx-swap="outerHTML""#,
            escape(key)
        )
    };
    let status = match (view.phase, view.trump) {
        (Phase::Waiting, _) => "Waiting for players".to_string(),
        (Phase::Bidding, _) => "Bidding".to_string(),
        (Phase::Playing, Some(trump)) => {
            let taker = view
                .taker
                .map(|s| format!(", taken by {}", TEAM_NAMES[team_of(s)]))
                .unwrap_or_default();
            format!("Playing, {} {} trump{taker}", trump.symbol(), trump.name())
        }
        (Phase::Playing, None) => "Playing".to_string(),
        (Phase::Finished, _) => "Deal over".to_string(),
    };
    let bids = if view.phase == Phase::Bidding {
        bidding(key, view)
    } else {
        String::new()
    };
    format!(
        r#"<section id="belote-table"{poll}>
<h1>{title}</h1>
<p class="status">{status}</p>
{seats}
{bids}
{trick}
{hand}
{scores}
<p><a href="/belote">All tables</a></p>
</section>"#,
        title = escape(title),
        seats = seats(key, view, names),
        trick = trick(view, names),
        hand = hand(key, view),
        scores = scores(view),
    )
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use services::services::belote::Game;

    use super::*;

    fn names() -> [Option<String>; 4] {
        ["ann", "bob", "cat", "dan"].map(|n| Some(n.to_string()))
    }

    fn dealt() -> Game {
        let mut rng = StdRng::seed_from_u64(7);
        let mut game = Game::new();
        for (seat, user) in ["u1", "u2", "u3"].iter().enumerate() {
            game.join(seat, user).unwrap();
        }
        game.join_and_deal(3, "u4", &mut rng).unwrap();
        game
    }

    #[test]
    fn open_seats_offer_a_join_button() {
        let mut game = Game::new();
        game.join(0, "u1").unwrap();
        let mut names = [None, None, None, None];
        names[0] = Some("ann".to_string());
        let html = table("g1", "Friday", &game.view_for(None), &names);
        assert!(html.contains("ann (North)"));
        assert_eq!(html.matches("/belote/games/g1/join").count(), 3);
        assert!(html.contains(r#"hx-trigger="every 3s""#));
    }

    #[test]
    fn only_the_player_to_speak_gets_bid_buttons() {
        let game = dealt();
        let speaker = game.turn;
        let html = table("g1", "Friday", &game.view_for(Some(speaker)), &names());
        assert!(html.contains("Turned card"));
        assert!(html.contains(r#""action": "take""#));

        let other = (speaker + 1) % 4;
        let html = table("g1", "Friday", &game.view_for(Some(other)), &names());
        assert!(!html.contains(r#""action": "take""#));
        assert_eq!(html.matches("card-button").count(), 5);
    }

    #[test]
    fn spectators_see_no_cards() {
        let html = table("g1", "Friday", &dealt().view_for(None), &names());
        assert!(!html.contains("Your hand"));
    }

    #[test]
    fn lobby_lists_seated_players() {
        let games = vec![GameSummary {
            key: "g1".into(),
            title: "Friday".into(),
            phase: Phase::Waiting,
            player_names: [Some("ann".into()), None, Some("cat".into()), None],
        }];
        let html = lobby(&games, &[]);
        assert!(html.contains("2/4"));
        assert!(html.contains("ann, cat"));
    }
}
