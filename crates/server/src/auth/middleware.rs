use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use super::session::SessionUser;
use crate::{error::ApiError, state::AppState};

/// Context for requests made by a signed-in application user.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: SessionUser,
}

/// Context for dashboard requests; the token is forwarded to SoliDB as-is.
#[derive(Clone)]
pub struct DashboardContext {
    pub token: String,
}

impl std::fmt::Debug for DashboardContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardContext")
            .field("token", &"<redacted>")
            .finish()
    }
}

pub async fn require_user(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(user) = state.current_user(&jar) else {
        debug!(path = %req.uri().path(), "no valid session");
        return ApiError::Unauthorized.into_response();
    };
    req.extensions_mut().insert(RequestContext { user });
    next.run(req).await
}

pub async fn require_dashboard_token(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = state.dashboard_token(&jar) else {
        debug!(path = %req.uri().path(), "no dashboard token");
        return ApiError::DashboardUnauthorized.into_response();
    };
    req.extensions_mut().insert(DashboardContext { token });
    next.run(req).await
}
