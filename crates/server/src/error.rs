//! The server's single error type.
//!
//! [`ApiError`] renders as a JSON envelope and tags the response with an
//! [`ErrorReport`]. The [`present_errors`] middleware then rewrites it for the
//! kind of client that asked: a toast for htmx, a small page for a browser,
//! the JSON envelope for API callers.

use axum::{
    Json,
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use services::services::{
    belote::BeloteError, calendar::CalendarError, datatype::DatatypeError, invoice::InvoiceError,
    kanban::KanbanError, sdb::SdbError, slug::NameError,
};
use thiserror::Error;
use tracing::{debug, error};
use utils::{
    crypto::{PasswordError, SessionError, TotpError},
    htmx::{HxResponse, ToastKind, is_htmx, redirect},
    response::ApiResponse,
};

use crate::{auth::session::TOKEN_COOKIE, views};

pub const LOGIN_PATH: &str = "/auth/login";
pub const DASHBOARD_LOGIN_PATH: &str = "/dashboard/login";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Your SoliDB session has expired")]
    DashboardUnauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error(transparent)]
    Sdb(#[from] SdbError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::DashboardUnauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Sdb(err) => sdb_status(err),
            ApiError::Session(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the user.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::Session(_) => "Invalid or expired session".to_string(),
            ApiError::Sdb(SdbError::Remote { message, .. }) => message.clone(),
            ApiError::Sdb(SdbError::Parse(_)) => "Unexpected response from SoliDB".to_string(),
            ApiError::Sdb(SdbError::NotConfigured(_)) => "SoliDB is not configured".to_string(),
            other => other.to_string(),
        }
    }

    fn login_path(&self) -> Option<&'static str> {
        match self {
            ApiError::Unauthorized => Some(LOGIN_PATH),
            ApiError::DashboardUnauthorized => Some(DASHBOARD_LOGIN_PATH),
            _ => None,
        }
    }
}

fn sdb_status(err: &SdbError) -> StatusCode {
    match err {
        SdbError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        SdbError::Unreachable | SdbError::Transport(_) | SdbError::Parse(_) => {
            StatusCode::BAD_GATEWAY
        }
        SdbError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        SdbError::Remote { status, .. } => match *status {
            400 => StatusCode::BAD_REQUEST,
            404 => StatusCode::NOT_FOUND,
            409 => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        },
        SdbError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Attached to every error response so [`present_errors`] can re-render it.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    pub login: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        } else {
            debug!(error = %self, %status, "request rejected");
        }

        let message = self.public_message();
        let mut response = (status, Json(ApiResponse::error(&message))).into_response();
        if matches!(self, ApiError::DashboardUnauthorized) {
            response
                .headers_mut()
                .append(header::SET_COOKIE, expired_cookie(TOKEN_COOKIE));
        }
        response.extensions_mut().insert(ErrorReport {
            status,
            message,
            login: self.login_path(),
        });
        response
    }
}

fn expired_cookie(name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{name}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("sdb_token=; Path=/; Max-Age=0"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presentation {
    Htmx,
    Json,
    Page,
}

impl Presentation {
    fn of(headers: &HeaderMap, path: &str) -> Self {
        if is_htmx(headers) {
            return Presentation::Htmx;
        }
        let wants_json = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));
        if wants_json || is_json_path(path) {
            Presentation::Json
        } else {
            Presentation::Page
        }
    }
}

/// Routes that only ever answer with JSON.
pub fn is_json_path(path: &str) -> bool {
    path == "/health" || path.ends_with("/livequery/token") || path.ends_with("/state")
}

pub async fn present_errors(req: Request<Body>, next: Next) -> Response {
    let presentation = Presentation::of(req.headers(), req.uri().path());
    let response = next.run(req).await;

    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };
    if presentation == Presentation::Json {
        return response;
    }

    let mut rendered = match (presentation, report.login) {
        (Presentation::Htmx, Some(login)) => redirect(true, login),
        (Presentation::Htmx, None) => HxResponse::empty()
            .toast(&report.message, ToastKind::Error)
            .into_response(),
        (_, Some(login)) => redirect(false, login),
        (_, None) => (
            report.status,
            Html(views::error_page(report.status, &report.message)),
        )
            .into_response(),
    };

    for cookie in response.headers().get_all(header::SET_COOKIE) {
        rendered
            .headers_mut()
            .append(header::SET_COOKIE, cookie.clone());
    }
    rendered
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<TotpError> for ApiError {
    fn from(err: TotpError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<NameError> for ApiError {
    fn from(err: NameError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<KanbanError> for ApiError {
    fn from(err: KanbanError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CalendarError> for ApiError {
    fn from(err: CalendarError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<DatatypeError> for ApiError {
    fn from(err: DatatypeError) -> Self {
        match err {
            DatatypeError::Invalid(errors) => ApiError::BadRequest(
                errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<InvoiceError> for ApiError {
    fn from(err: InvoiceError) -> Self {
        match err {
            InvoiceError::NotDraft | InvoiceError::InvalidTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<BeloteError> for ApiError {
    fn from(err: BeloteError) -> Self {
        match err {
            BeloteError::InvalidCard(_)
            | BeloteError::InvalidSuit(_)
            | BeloteError::UnknownAction(_)
            | BeloteError::InvalidSeat(_) => ApiError::BadRequest(err.to_string()),
            BeloteError::BadDeck => ApiError::Internal(err.to_string()),
            other => ApiError::Conflict(other.to_string()),
        }
    }
}
