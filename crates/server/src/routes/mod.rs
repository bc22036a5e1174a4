use axum::{
    Extension, Router,
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::{from_fn, from_fn_with_state},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info_span;

use crate::{
    AppState,
    auth::{RequestContext, require_dashboard_token, require_user},
    error::present_errors,
    extract::Htmx,
    views::{self, Page, Section},
};

pub mod auth;
pub mod belote;
pub mod billing;
pub mod calendar;
pub mod dashboard;
pub mod datatypes;
pub mod docs;
pub mod health;
pub mod mailbox;
pub mod projects;
pub mod repos;
pub mod talks;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .merge(auth::router())
        .merge(dashboard::login_router());

    let user_routes = Router::new()
        .route("/", get(home))
        .merge(auth::protected_router())
        .merge(talks::router())
        .merge(projects::router())
        .merge(billing::router())
        .merge(mailbox::router())
        .merge(calendar::router())
        .merge(repos::router())
        .merge(docs::router())
        .merge(datatypes::router())
        .merge(belote::router())
        .layer(from_fn_with_state(state.clone(), require_user));

    let dashboard_routes = dashboard::router()
        .layer(from_fn_with_state(state.clone(), require_dashboard_token));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(dashboard_routes)
        .nest_service(
            "/static",
            ServeDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        )
        .with_state(state)
        .layer(from_fn(present_errors))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(&REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                info_span!(
                    "http",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
}

async fn home(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
) -> Response {
    let (jar, flash) = state.take_flash(jar);
    let page = Page::new("Home", Section::Home, views::home(&ctx.user))
        .user(&ctx.user)
        .flash(flash);
    (jar, page.render(htmx)).into_response()
}

/// Render `body` inside the signed-in layout.
pub(crate) fn page(
    title: &str,
    section: Section,
    ctx: &RequestContext,
    body: String,
    htmx: bool,
) -> Html<String> {
    Page::new(title, section, body).user(&ctx.user).render(htmx)
}
