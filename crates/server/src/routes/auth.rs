use axum::{
    Extension, Form, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use utils::{
    crypto::{generate_secret, hash_password, provisioning_uri, verify_password, verify_totp},
    htmx::{HxResponse, ToastKind, redirect},
};

use crate::{
    AppState,
    auth::{Flash, RequestContext, SessionUser, session::end_session},
    error::ApiError,
    extract::Htmx,
    store::{self, USERS},
    views::{
        self, Page, Section,
        auth::{RegisterValues, login_form, register_form, two_factor_form},
    },
};

const TOTP_ISSUER: &str = "SoliDB";
const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 40;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/2fa", get(two_factor_page).post(two_factor))
        .route("/auth/register", get(register_page).post(register))
        .route("/auth/logout", post(logout))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/2fa/setup", get(two_factor_setup))
        .route("/auth/2fa/enable", post(enable_two_factor))
        .route("/auth/2fa/disable", post(disable_two_factor))
}

/// Stored user document.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDoc {
    #[serde(rename = "_key")]
    pub key: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub totp_enabled: bool,
    #[serde(default)]
    pub totp_secret: Option<String>,
    #[serde(default)]
    pub totp_pending_secret: Option<String>,
}

impl UserDoc {
    fn session(&self) -> SessionUser {
        SessionUser {
            key: self.key.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            issued_at: chrono::Utc::now().timestamp(),
        }
    }
}

pub async fn find_user_by_email(state: &AppState, email: &str) -> Result<Option<UserDoc>, ApiError> {
    Ok(services::services::sdb::query_one(
        state.sdb(),
        "FOR u IN users FILTER u.email == @email LIMIT 1 RETURN u",
        json!({ "email": email }),
    )
    .await?)
}

async fn load_user(state: &AppState, key: &str) -> Result<UserDoc, ApiError> {
    store::users(state.sdb())
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn form_page(status: StatusCode, title: &str, body: String, htmx: bool) -> Response {
    (status, Page::new(title, Section::Auth, body).render(htmx)).into_response()
}

async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
) -> Response {
    if state.current_user(&jar).is_some() {
        return redirect(htmx, "/");
    }
    let (jar, flash) = state.take_flash(jar);
    let page = Page::new("Sign in", Section::Auth, login_form("", None)).flash(flash);
    (jar, page.render(htmx)).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[instrument(name = "auth.login", skip(state, jar, form), fields(email = %form.email.trim()))]
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let email = form.email.trim().to_lowercase();
    let reject = |status: StatusCode, message: &str| {
        form_page(status, "Sign in", login_form(&email, Some(message)), htmx)
    };

    if email.is_empty() || form.password.is_empty() {
        return Ok(reject(
            StatusCode::BAD_REQUEST,
            "Email and password are required",
        ));
    }

    if let Err(retry_after) = state.login_limiter().check(&email) {
        warn!("login rate limited");
        return Ok(reject(
            StatusCode::TOO_MANY_REQUESTS,
            &format!(
                "Too many failed attempts, try again in {} seconds",
                retry_after.as_secs().max(1)
            ),
        ));
    }

    let user = find_user_by_email(&state, &email).await?;
    let verified = match &user {
        Some(user) => {
            let password = form.password.clone();
            let hash = user.password_hash.clone();
            tokio::task::spawn_blocking(move || verify_password(&password, &hash))
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?
        }
        None => false,
    };

    let Some(user) = user.filter(|_| verified) else {
        state.login_limiter().record_failure(&email);
        return Ok(reject(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    };
    state.login_limiter().reset(&email);

    if user.totp_enabled && user.totp_secret.is_some() {
        let jar = state.set_pending_2fa(jar, &user.key)?;
        return Ok((jar, redirect(htmx, "/auth/2fa")).into_response());
    }

    info!(user = %user.key, "signed in");
    let jar = state.start_session(jar, &user.session())?;
    Ok((jar, redirect(htmx, "/")).into_response())
}

async fn two_factor_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
) -> Response {
    if state.pending_2fa(&jar).is_none() {
        return redirect(htmx, "/auth/login");
    }
    Page::new("Two-factor authentication", Section::Auth, two_factor_form(None))
        .render(htmx)
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct CodeForm {
    #[serde(default)]
    pub code: String,
}

#[instrument(name = "auth.two_factor", skip(state, jar, form))]
async fn two_factor(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
    Form(form): Form<CodeForm>,
) -> Result<Response, ApiError> {
    let Some(user_key) = state.pending_2fa(&jar) else {
        return Ok(redirect(htmx, "/auth/login"));
    };
    let reject = |status: StatusCode, message: &str| {
        form_page(status, "Two-factor authentication", two_factor_form(Some(message)), htmx)
    };

    let code = form.code.trim();
    if code.is_empty() {
        return Ok(reject(StatusCode::BAD_REQUEST, "Code is required"));
    }

    let limiter_key = format!("2fa:{user_key}");
    if state.login_limiter().check(&limiter_key).is_err() {
        return Ok(reject(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many failed attempts, sign in again later",
        ));
    }

    let user = load_user(&state, &user_key).await?;
    let secret = user.totp_secret.as_deref().unwrap_or_default();
    if !verify_totp(secret, code, unix_now())? {
        state.login_limiter().record_failure(&limiter_key);
        return Ok(reject(StatusCode::UNAUTHORIZED, "Invalid code"));
    }
    state.login_limiter().reset(&limiter_key);

    info!(user = %user.key, "signed in with second factor");
    let jar = state.start_session(jar, &user.session())?;
    Ok((jar, redirect(htmx, "/")).into_response())
}

async fn register_page(Htmx(htmx): Htmx) -> Response {
    let values = RegisterValues {
        username: "",
        email: "",
    };
    Page::new("Create an account", Section::Auth, register_form(&values, &[]))
        .render(htmx)
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// Field checks that need no database access.
pub fn validate_registration(form: &RegisterForm) -> Vec<String> {
    let mut messages = Vec::new();
    let username = form.username.trim();
    if username.is_empty() {
        messages.push("Username is required".to_string());
    } else if username.chars().count() > MAX_USERNAME_LEN {
        messages.push(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        ));
    }
    if !form.email.contains('@') {
        messages.push("A valid email address is required".to_string());
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        messages.push(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    if form.password != form.password_confirm {
        messages.push("Passwords do not match".to_string());
    }
    messages
}

#[instrument(name = "auth.register", skip(state, jar, form), fields(email = %form.email.trim()))]
async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
    Form(form): Form<RegisterForm>,
) -> Result<Response, ApiError> {
    let email = form.email.trim().to_lowercase();
    let username = form.username.trim().to_string();
    let mut messages = validate_registration(&form);

    if messages.is_empty() {
        if find_user_by_email(&state, &email).await?.is_some() {
            messages.push("An account with this email already exists".to_string());
        }
        let taken: Option<serde_json::Value> = services::services::sdb::query_one(
            state.sdb(),
            "FOR u IN users FILTER u.username == @username LIMIT 1 RETURN u._key",
            json!({ "username": username }),
        )
        .await?;
        if taken.is_some() {
            messages.push("Username is already taken".to_string());
        }
    }

    if !messages.is_empty() {
        let values = RegisterValues {
            username: &username,
            email: &email,
        };
        return Ok(form_page(
            StatusCode::BAD_REQUEST,
            "Create an account",
            register_form(&values, &messages),
            htmx,
        ));
    }

    let password = form.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let user: UserDoc = store::Collection::new(state.sdb(), USERS)
        .insert(json!({
            "username": username,
            "email": email,
            "password_hash": password_hash,
            "totp_enabled": false,
            "created_at": store::now(),
        }))
        .await?;

    info!(user = %user.key, "registered");
    let jar = state.start_session(jar, &user.session())?;
    Ok((jar, redirect(htmx, "/")).into_response())
}

async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let jar = end_session(jar);
    let jar = state.set_flash(jar, &Flash::new(ToastKind::Info, "You have been signed out"))?;
    Ok((jar, redirect(htmx, "/auth/login")).into_response())
}

#[instrument(name = "auth.2fa_setup", skip(state, ctx), fields(user = %ctx.user.key))]
async fn two_factor_setup(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let user = load_user(&state, &ctx.user.key).await?;
    let body = if user.totp_enabled {
        views::auth::two_factor_enabled(None)
    } else {
        let secret = generate_secret();
        store::users(state.sdb())
            .update::<serde_json::Value>(&user.key, json!({ "totp_pending_secret": secret }))
            .await?;
        let uri = provisioning_uri(&secret, &user.email, TOTP_ISSUER);
        views::auth::two_factor_setup(&secret, &uri, None)
    };
    Ok(Page::new("Security", Section::Auth, body)
        .user(&ctx.user)
        .render(htmx)
        .into_response())
}

#[instrument(name = "auth.2fa_enable", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn enable_two_factor(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<CodeForm>,
) -> Result<Response, ApiError> {
    let user = load_user(&state, &ctx.user.key).await?;
    let Some(pending) = user.totp_pending_secret.clone() else {
        return Err(ApiError::BadRequest(
            "Start two-factor setup before enabling it".to_string(),
        ));
    };

    if !verify_totp(&pending, form.code.trim(), unix_now())? {
        let uri = provisioning_uri(&pending, &user.email, TOTP_ISSUER);
        let body = views::auth::two_factor_setup(&pending, &uri, Some("Invalid code"));
        return Ok(form_page(StatusCode::BAD_REQUEST, "Security", body, htmx));
    }

    store::users(state.sdb())
        .update::<serde_json::Value>(
            &user.key,
            json!({
                "totp_secret": pending,
                "totp_enabled": true,
                "totp_pending_secret": null,
            }),
        )
        .await?;
    info!("two-factor authentication enabled");

    Ok(HxResponse::fragment(views::auth::two_factor_enabled(None))
        .toast("Two-factor authentication enabled", ToastKind::Success)
        .into_response())
}

#[instrument(name = "auth.2fa_disable", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn disable_two_factor(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<CodeForm>,
) -> Result<Response, ApiError> {
    let user = load_user(&state, &ctx.user.key).await?;
    let secret = user.totp_secret.as_deref().unwrap_or_default();
    if !user.totp_enabled || !verify_totp(secret, form.code.trim(), unix_now())? {
        let body = views::auth::two_factor_enabled(Some("Invalid code"));
        return Ok(form_page(StatusCode::BAD_REQUEST, "Security", body, htmx));
    }

    store::users(state.sdb())
        .update::<serde_json::Value>(
            &user.key,
            json!({ "totp_enabled": false, "totp_secret": null }),
        )
        .await?;
    info!("two-factor authentication disabled");
    Ok(redirect(htmx, "/auth/2fa/setup"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(username: &str, email: &str, password: &str, confirm: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            password_confirm: confirm.into(),
        }
    }

    #[test]
    fn registration_rules() {
        assert!(validate_registration(&form("ann", "ann@example.com", "longenough", "longenough")).is_empty());
        let messages = validate_registration(&form("", "nope", "short", "other"));
        assert_eq!(messages.len(), 4);
        assert!(messages.contains(&"Passwords do not match".to_string()));
    }
}
