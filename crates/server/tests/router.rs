//! Request-level tests of the assembled router against an in-memory SoliDB.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Datelike;
use rand::{SeedableRng, rngs::StdRng};
use secrecy::SecretString;
use serde_json::{Value, json};
use server::{
    AppState,
    auth::session::{PENDING_2FA_COOKIE, SESSION_COOKIE, SessionUser, TOKEN_COOKIE},
    routes,
};
use services::services::{
    belote::{Bid, Game, card::deck},
    config::WwwConfig,
    sdb::{Method, SdbApi, mock::MockSdb},
};
use tower::ServiceExt;
use utils::{
    crypto::{generate_secret, hash_password, totp_code},
    htmx::HX_REDIRECT,
};

const SECRET: &str = "an-integration-test-secret-of-sufficient-length";

struct Harness {
    mock: Arc<MockSdb>,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        let mock = Arc::new(MockSdb::new());
        let sdb: Arc<dyn SdbApi> = mock.clone();
        let config = WwwConfig {
            session_secret: Some(SecretString::from(SECRET.to_string())),
            ..Default::default()
        };
        let state = AppState::new(config, sdb).unwrap();
        Self { mock, state }
    }

    fn app(&self) -> Router {
        routes::router(self.state.clone())
    }

    fn session_cookie(&self, key: &str, username: &str) -> String {
        let user = SessionUser {
            key: key.to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            issued_at: chrono::Utc::now().timestamp(),
        };
        let jar = self.state.start_session(CookieJar::new(), &user).unwrap();
        let value = jar.get(SESSION_COOKIE).unwrap().value().to_string();
        format!("{SESSION_COOKIE}={value}")
    }

    fn pending_2fa_cookie(&self, key: &str) -> String {
        let jar = self.state.set_pending_2fa(CookieJar::new(), key).unwrap();
        let value = jar.get(PENDING_2FA_COOKIE).unwrap().value().to_string();
        format!("{PENDING_2FA_COOKIE}={value}")
    }

    fn dashboard_cookie(&self, token: &str) -> String {
        let jar = self.state.set_dashboard_token(CookieJar::new(), token).unwrap();
        let value = jar.get(TOKEN_COOKIE).unwrap().value().to_string();
        format!("{TOKEN_COOKIE}={value}")
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app().oneshot(request).await.unwrap()
    }
}

fn form_post(uri: &str) -> axum::http::request::Builder {
    Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|c| c.to_str().unwrap().to_string())
        .collect()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_reports_solidb_reachability() {
    let harness = Harness::new();
    let response = harness
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["solidb_reachable"], true);
}

#[tokio::test]
async fn login_requires_both_fields() {
    let harness = Harness::new();
    let body = "email=ann%40example.com&password=";
    let response = harness
        .send(form_post("/auth/login").body(Body::from(body)).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Email and password are required"));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let harness = Harness::new();
    harness.mock.on_query(
        "FOR u IN users FILTER u.email",
        vec![json!({
            "_key": "u1",
            "username": "ann",
            "email": "ann@example.com",
            "password_hash": hash_password("correct horse").unwrap(),
        })],
    );
    let body = "email=ann%40example.com&password=battery+staple";
    let response = harness
        .send(form_post("/auth/login").body(Body::from(body)).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn valid_login_starts_a_session() {
    let harness = Harness::new();
    harness.mock.on_query(
        "FOR u IN users FILTER u.email",
        vec![json!({
            "_key": "u1",
            "username": "ann",
            "email": "ann@example.com",
            "password_hash": hash_password("correct horse").unwrap(),
        })],
    );
    let body = "email=Ann%40example.com&password=correct+horse";
    let response = harness
        .send(form_post("/auth/login").body(Body::from(body)).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    let started = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|c| c.to_str().unwrap().starts_with(SESSION_COOKIE));
    assert!(started);
}

#[tokio::test]
async fn anonymous_browsers_are_sent_to_login() {
    let harness = Harness::new();
    let response = harness
        .send(Request::get("/talks").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/auth/login");
}

#[tokio::test]
async fn anonymous_htmx_requests_get_a_client_redirect() {
    let harness = Harness::new();
    let response = harness
        .send(
            Request::get("/projects")
                .header("HX-Request", "true")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.headers().get(HX_REDIRECT).unwrap(), "/auth/login");
}

#[tokio::test]
async fn expired_dashboard_token_clears_the_cookie() {
    let harness = Harness::new();
    let response = harness
        .send(Request::get("/dashboard").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/dashboard/login"
    );
    let cleared = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|c| c.to_str().unwrap().starts_with("sdb_token=;"));
    assert!(cleared);
}

#[tokio::test]
async fn sent_invoices_cannot_be_edited() {
    let harness = Harness::new();
    harness.mock.on_query(
        "FOR d IN invoices FILTER d._key",
        vec![json!({
            "_key": "i1",
            "number": "INV-2026-0001",
            "status": "sent",
            "customer_name": "Acme",
            "items": [],
        })],
    );
    let response = harness
        .send(
            Request::get("/billing/invoices/i1/edit")
                .header(header::COOKIE, harness.session_cookie("u1", "ann"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn oversized_talk_messages_are_rejected() {
    let harness = Harness::new();
    let body = format!("body={}", "x".repeat(4001));
    let response = harness
        .send(
            form_post("/talks/channels/c1/messages")
                .header(header::COOKIE, harness.session_cookie("u1", "ann"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.mock.queries_matching("INSERT").is_empty());
}

#[tokio::test]
async fn doc_pages_with_children_are_kept() {
    let harness = Harness::new();
    harness
        .mock
        .on_query(
            "FILTER p.slug == @slug LIMIT 1",
            vec![json!({ "_key": "p1", "slug": "guide", "title": "Guide" })],
        )
        .on_query("LENGTH(FOR p IN pages FILTER p.parent", vec![json!(2)]);
    let response = harness
        .send(
            Request::delete("/docs/guide")
                .header(header::COOKIE, harness.session_cookie("u1", "ann"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(harness.mock.queries_matching("REMOVE").is_empty());
}

#[tokio::test]
async fn belote_rejects_playing_out_of_turn() {
    let mut game = Game::new();
    for seat in 0..4 {
        game.join(seat, &format!("u{seat}")).unwrap();
    }
    game.deal(deck()).unwrap();
    let speaker = game.turn;
    game.bid(speaker, Bid::Take, &mut StdRng::seed_from_u64(1))
        .unwrap();
    let idle = (game.turn + 1) % 4;
    let card = game.hands[idle][0];

    let harness = Harness::new();
    harness.mock.on_query(
        "FOR d IN belote_games FILTER d._key",
        vec![json!({
            "_key": "g1",
            "title": "Friday",
            "player_names": ["a", "b", "c", "d"],
            "game": game,
            "revision": 3,
        })],
    );
    let body = format!("card={}", card.code());
    let response = harness
        .send(
            form_post("/belote/games/g1/play")
                .header(header::COOKIE, harness.session_cookie(&format!("u{idle}"), "bob"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(harness.mock.queries_matching("UPDATE g").is_empty());
}

#[tokio::test]
async fn belote_state_only_shows_the_callers_hand() {
    let mut game = Game::new();
    for seat in 0..4 {
        game.join(seat, &format!("u{seat}")).unwrap();
    }
    game.deal(deck()).unwrap();

    let harness = Harness::new();
    harness.mock.on_query(
        "FOR d IN belote_games FILTER d._key",
        vec![json!({ "_key": "g1", "title": "Friday", "game": game, "revision": 0 })],
    );
    let response = harness
        .send(
            Request::get("/belote/games/g1/state")
                .header(header::COOKIE, harness.session_cookie("u2", "cat"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(view["your_seat"], 2);
    assert_eq!(view["your_hand"].as_array().unwrap().len(), 5);
    assert!(view.get("hands").is_none());
}

#[tokio::test]
async fn repeated_failed_logins_are_throttled() {
    let harness = Harness::new();
    let body = "email=nobody%40example.com&password=guess";
    for _ in 0..20 {
        let response = harness
            .send(form_post("/auth/login").body(Body::from(body)).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = harness
        .send(form_post("/auth/login").body(Body::from(body)).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(body_text(response).await.contains("Too many failed attempts"));

    let other = "email=ann%40example.com&password=guess";
    let response = harness
        .send(form_post("/auth/login").body(Body::from(other)).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn second_factor_users_are_sent_to_the_code_form() {
    let harness = Harness::new();
    harness.mock.on_query(
        "FOR u IN users FILTER u.email",
        vec![json!({
            "_key": "u1",
            "username": "ann",
            "email": "ann@example.com",
            "password_hash": hash_password("correct horse").unwrap(),
            "totp_enabled": true,
            "totp_secret": generate_secret(),
        })],
    );
    let body = "email=ann%40example.com&password=correct+horse";
    let response = harness
        .send(form_post("/auth/login").body(Body::from(body)).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/auth/2fa");
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with(PENDING_2FA_COOKIE)));
    assert!(!cookies.iter().any(|c| c.starts_with(SESSION_COOKIE)));
}

#[tokio::test]
async fn valid_code_promotes_the_pending_login() {
    let harness = Harness::new();
    let secret = generate_secret();
    harness.mock.on_query(
        "FOR d IN users FILTER d._key",
        vec![json!({
            "_key": "u1",
            "username": "ann",
            "email": "ann@example.com",
            "totp_enabled": true,
            "totp_secret": secret,
        })],
    );
    let now = chrono::Utc::now().timestamp() as u64;
    let body = format!("code={}", totp_code(&secret, now).unwrap());
    let response = harness
        .send(
            form_post("/auth/2fa")
                .header(header::COOKIE, harness.pending_2fa_cookie("u1"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with(&format!("{SESSION_COOKIE}="))));
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with(&format!("{PENDING_2FA_COOKIE}=;")))
    );
}

#[tokio::test]
async fn wrong_code_keeps_the_login_pending() {
    let harness = Harness::new();
    harness.mock.on_query(
        "FOR d IN users FILTER d._key",
        vec![json!({
            "_key": "u1",
            "username": "ann",
            "email": "ann@example.com",
            "totp_enabled": true,
            "totp_secret": generate_secret(),
        })],
    );
    let response = harness
        .send(
            form_post("/auth/2fa")
                .header(header::COOKIE, harness.pending_2fa_cookie("u1"))
                .body(Body::from("code=12345x"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn invoice_numbers_skip_past_deleted_drafts() {
    let year = chrono::Utc::now().year();
    let harness = Harness::new();
    harness
        .mock
        .on_query(
            "STARTS_WITH(i.number, @prefix)",
            vec![json!(format!("INV-{year}-0002"))],
        )
        .on_query(
            "INSERT @doc INTO invoices",
            vec![json!({ "_key": "i3", "number": "x", "customer_name": "ACME" })],
        );
    let body = "customer_name=ACME&items%5B0%5D%5Bdescription%5D=Support&items%5B0%5D%5Bunit_price%5D=10";
    let response = harness
        .send(
            form_post("/billing/invoices")
                .header(header::COOKIE, harness.session_cookie("u1", "ann"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let inserts = harness.mock.queries_matching("INSERT @doc INTO invoices");
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].1["doc"]["number"], format!("INV-{year}-0003"));
}

#[tokio::test]
async fn oversized_invoice_totals_are_rejected() {
    let harness = Harness::new();
    let body = "customer_name=ACME\
        &items%5B0%5D%5Bdescription%5D=Bulk\
        &items%5B0%5D%5Bquantity%5D=100000000000\
        &items%5B0%5D%5Bunit_price%5D=1000000000";
    let response = harness
        .send(
            form_post("/billing/invoices")
                .header(header::COOKIE, harness.session_cookie("u1", "ann"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("amount is too large"));
    assert!(harness.mock.queries_matching("INSERT").is_empty());
}

#[tokio::test]
async fn huge_document_pages_are_clamped() {
    let harness = Harness::new();
    harness.mock.on_api(
        Method::POST,
        "/_api/database/shop/cursor",
        200,
        json!({ "result": [] }),
    );
    let response = harness
        .send(
            Request::get(
                "/dashboard/shop/collections/orders/documents?page=18446744073709551615&per_page=100",
            )
            .header(header::COOKIE, harness.dashboard_cookie("jwt"))
            .body(Body::empty())
            .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let calls = harness.mock.api_calls();
    let body = calls[0].3.as_ref().unwrap();
    assert_eq!(body["bindVars"]["offset"], json!(99_999_900u64));
    assert_eq!(body["bindVars"]["count"], json!(101));
}

#[tokio::test]
async fn docs_cannot_move_under_their_own_subpage() {
    let harness = Harness::new();
    harness
        .mock
        .on_query(
            "FILTER p.slug == @slug LIMIT 1",
            vec![json!({ "_key": "p1", "slug": "a", "title": "A" })],
        )
        .on_query(
            "FOR p IN pages SORT",
            vec![
                json!({ "_key": "p1", "slug": "a", "title": "A" }),
                json!({ "_key": "p2", "slug": "b", "title": "B", "parent": "a" }),
            ],
        );
    let response = harness
        .send(
            Request::put("/docs/a")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::COOKIE, harness.session_cookie("u1", "ann"))
                .body(Body::from("title=A&content=&parent=b"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("subpage of this page"));
    assert!(harness.mock.queries_matching("UPDATE").is_empty());
    assert!(harness.mock.queries_matching("INSERT").is_empty());
}
