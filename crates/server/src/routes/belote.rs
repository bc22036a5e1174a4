use axum::{
    Extension, Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use services::services::{
    belote::{Bid, BidOutcome, BeloteError, Card, Game, GameView, PlayOutcome, Seat},
    sdb::{query_as, query_one},
};
use tracing::{debug, info, instrument};
use utils::htmx::{HxResponse, redirect};

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, GAMES},
    views::{
        Section,
        belote::{self as view, GameSummary},
    },
};

const MAX_TITLE_LEN: usize = 80;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/belote", get(lobby))
        .route("/belote/games", post(create_game))
        .route("/belote/games/{key}", get(show_game))
        .route("/belote/games/{key}/state", get(game_state))
        .route("/belote/games/{key}/join", post(join_game))
        .route("/belote/games/{key}/bid", post(bid))
        .route("/belote/games/{key}/play", post(play))
}

/// A table as stored in `belote_games`. `revision` is bumped on every save
/// so concurrent actions on the same table cannot overwrite each other.
#[derive(Debug, Clone, Deserialize)]
struct StoredGame {
    #[serde(rename = "_key")]
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    player_names: [Option<String>; 4],
    #[serde(default)]
    game: Game,
    #[serde(default)]
    revision: u64,
}

impl StoredGame {
    fn seat(&self, ctx: &RequestContext) -> Option<Seat> {
        self.game.seat_of(&ctx.user.key)
    }

    fn view(&self, ctx: &RequestContext) -> GameView {
        self.game.view_for(self.seat(ctx))
    }

    fn require_seat(&self, ctx: &RequestContext) -> Result<Seat, ApiError> {
        self.seat(ctx).ok_or_else(|| BeloteError::NotSeated.into())
    }

    fn table(&self, ctx: &RequestContext) -> String {
        view::table(&self.key, &self.title, &self.view(ctx), &self.player_names)
    }
}

async fn load_game(state: &AppState, key: &str) -> Result<StoredGame, ApiError> {
    Collection::new(state.sdb(), GAMES)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Game"))
}

/// Write the game back if nobody else saved it since it was loaded.
async fn save_game(state: &AppState, stored: &StoredGame) -> Result<StoredGame, ApiError> {
    let saved: Option<StoredGame> = query_one(
        state.sdb(),
        "FOR g IN belote_games FILTER g._key == @key AND g.revision == @revision \
         UPDATE g WITH { game: @game, player_names: @names, revision: @next, updated_at: @now } IN belote_games \
         RETURN NEW",
        json!({
            "key": stored.key,
            "revision": stored.revision,
            "next": stored.revision + 1,
            "game": stored.game,
            "names": stored.player_names,
            "now": store::now(),
        }),
    )
    .await?;
    saved.ok_or_else(|| {
        ApiError::Conflict("The table changed in the meantime, reload and try again".to_string())
    })
}

/// The refreshed table for htmx, a redirect back to it otherwise.
fn respond(htmx: bool, ctx: &RequestContext, stored: &StoredGame) -> Response {
    if htmx {
        HxResponse::fragment(stored.table(ctx)).into_response()
    } else {
        redirect(false, &format!("/belote/games/{}", stored.key))
    }
}

async fn render_lobby(state: &AppState, form_errors: &[String]) -> Result<String, ApiError> {
    let games: Vec<GameSummary> = query_as(
        state.sdb(),
        "FOR g IN belote_games SORT g.created_at DESC LIMIT 50 \
         RETURN { _key: g._key, title: g.title, phase: g.game.phase, player_names: g.player_names }",
        json!({}),
    )
    .await?;
    Ok(view::lobby(&games, form_errors))
}

#[instrument(name = "belote.lobby", skip(state, ctx), fields(user = %ctx.user.key))]
async fn lobby(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let body = render_lobby(&state, &[]).await?;
    Ok(page("Belote", Section::Belote, &ctx, body, htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateGameForm {
    #[serde(default)]
    pub title: String,
}

#[instrument(name = "belote.create", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_game(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<CreateGameForm>,
) -> Result<Response, ApiError> {
    let title = match form.title.trim() {
        "" => format!("{}'s table", ctx.user.username),
        title => title.to_string(),
    };
    if title.chars().count() > MAX_TITLE_LEN {
        let problem = format!("Name must be at most {MAX_TITLE_LEN} characters");
        let body = render_lobby(&state, &[problem]).await?;
        return Ok((
            StatusCode::BAD_REQUEST,
            page("Belote", Section::Belote, &ctx, body, htmx),
        )
            .into_response());
    }

    let created: StoredGame = Collection::new(state.sdb(), GAMES)
        .insert(json!({
            "title": title,
            "created_by": ctx.user.key,
            "player_names": [null, null, null, null],
            "game": Game::new(),
            "revision": 0,
            "created_at": store::now(),
        }))
        .await?;
    info!(game = %created.key, "belote table created");
    Ok(redirect(htmx, &format!("/belote/games/{}", created.key)))
}

#[instrument(name = "belote.show", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_game(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let stored = load_game(&state, &key).await?;
    Ok(page(&stored.title, Section::Belote, &ctx, stored.table(&ctx), htmx).into_response())
}

/// The table as JSON, seen from the caller's seat.
async fn game_state(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(key): Path<String>,
) -> Result<Json<GameView>, ApiError> {
    let stored = load_game(&state, &key).await?;
    Ok(Json(stored.view(&ctx)))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinForm {
    #[serde(default)]
    pub seat: String,
}

#[instrument(name = "belote.join", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn join_game(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(form): Form<JoinForm>,
) -> Result<Response, ApiError> {
    let seat: Seat = form
        .seat
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid seat '{}'", form.seat.trim())))?;
    let mut stored = load_game(&state, &key).await?;
    {
        let mut rng = rand::rng();
        stored.game.join_and_deal(seat, &ctx.user.key, &mut rng)?;
    }
    stored.player_names[seat] = Some(ctx.user.username.clone());
    let saved = save_game(&state, &stored).await?;
    info!(game = %saved.key, seat, phase = saved.game.phase.as_str(), "player seated");
    Ok(respond(htmx, &ctx, &saved))
}

#[derive(Debug, Default, Deserialize)]
pub struct BidForm {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub suit: String,
}

#[instrument(name = "belote.bid", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn bid(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(form): Form<BidForm>,
) -> Result<Response, ApiError> {
    let bid = Bid::parse(&form.action, Some(form.suit.as_str()))?;
    let mut stored = load_game(&state, &key).await?;
    let seat = stored.require_seat(&ctx)?;
    let outcome = {
        let mut rng = rand::rng();
        stored.game.bid(seat, bid, &mut rng)?
    };
    let saved = save_game(&state, &stored).await?;
    match outcome {
        BidOutcome::Taken { seat, trump } => {
            info!(game = %saved.key, seat, trump = trump.name(), "trump taken")
        }
        BidOutcome::Redealt => info!(game = %saved.key, "everyone passed, redealt"),
        other => debug!(game = %saved.key, seat, ?other, "bid"),
    }
    Ok(respond(htmx, &ctx, &saved))
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayForm {
    #[serde(default)]
    pub card: String,
}

#[instrument(name = "belote.play", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn play(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(form): Form<PlayForm>,
) -> Result<Response, ApiError> {
    let card: Card = form.card.parse()?;
    let mut stored = load_game(&state, &key).await?;
    let seat = stored.require_seat(&ctx)?;
    let outcome = stored.game.play(seat, card)?;
    let saved = save_game(&state, &stored).await?;
    match outcome {
        PlayOutcome::Finished(result) => info!(
            game = %saved.key,
            north_south = result.scores[0],
            east_west = result.scores[1],
            contract_made = result.contract_made,
            "deal finished"
        ),
        PlayOutcome::TrickWon { winner, points } => {
            debug!(game = %saved.key, winner, points, "trick won")
        }
        PlayOutcome::Continue => debug!(game = %saved.key, seat, card = %card, "card played"),
    }
    Ok(respond(htmx, &ctx, &saved))
}
