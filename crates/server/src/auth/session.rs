//! Signed cookies carrying the app session, the dashboard token, the pending
//! second factor and one-shot flash messages.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use utils::{crypto::SessionError, htmx::ToastKind};

use crate::{error::ApiError, state::AppState};

pub const SESSION_COOKIE: &str = "sdb_session";
pub const TOKEN_COOKIE: &str = "sdb_token";
pub const FLASH_COOKIE: &str = "sdb_flash";
pub const PENDING_2FA_COOKIE: &str = "sdb_pending_2fa";

pub fn session_ttl() -> Duration {
    Duration::days(7)
}

pub fn pending_2fa_ttl() -> Duration {
    Duration::minutes(5)
}

/// Dashboard tokens follow the SoliDB JWT lifetime; the cookie only needs to
/// outlive a working day.
pub fn dashboard_token_ttl() -> Duration {
    Duration::hours(24)
}

fn flash_ttl() -> Duration {
    Duration::minutes(2)
}

/// The signed-in application user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub key: String,
    pub username: String,
    pub email: String,
    pub issued_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: String,
    pub message: String,
}

impl Flash {
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        let kind = match kind {
            ToastKind::Success => "success",
            ToastKind::Info => "info",
            ToastKind::Warning => "warning",
            ToastKind::Error => "error",
        };
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl AppState {
    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.config.secure_cookies)
            .build()
    }

    fn seal_into<T: Serialize>(
        &self,
        jar: CookieJar,
        name: &'static str,
        data: &T,
        ttl: Duration,
    ) -> Result<CookieJar, ApiError> {
        let expires_at = (Utc::now() + ttl).timestamp();
        let value = self.cookies.seal(name, data, expires_at)?;
        Ok(jar.add(self.cookie(name, value)))
    }

    fn open_from<T: for<'de> Deserialize<'de>>(&self, jar: &CookieJar, name: &str) -> Option<T> {
        let raw = jar.get(name)?;
        match self.cookies.open(name, raw.value(), Utc::now().timestamp()) {
            Ok(data) => Some(data),
            Err(SessionError::Expired) => None,
            Err(error) => {
                tracing::debug!(cookie = name, %error, "rejected cookie");
                None
            }
        }
    }

    pub fn start_session(&self, jar: CookieJar, user: &SessionUser) -> Result<CookieJar, ApiError> {
        let jar = jar.remove(removal(PENDING_2FA_COOKIE));
        self.seal_into(jar, SESSION_COOKIE, user, session_ttl())
    }

    pub fn current_user(&self, jar: &CookieJar) -> Option<SessionUser> {
        self.open_from(jar, SESSION_COOKIE)
    }

    pub fn set_pending_2fa(&self, jar: CookieJar, user_key: &str) -> Result<CookieJar, ApiError> {
        self.seal_into(jar, PENDING_2FA_COOKIE, &user_key, pending_2fa_ttl())
    }

    pub fn pending_2fa(&self, jar: &CookieJar) -> Option<String> {
        self.open_from(jar, PENDING_2FA_COOKIE)
    }

    pub fn set_dashboard_token(&self, jar: CookieJar, token: &str) -> Result<CookieJar, ApiError> {
        self.seal_into(jar, TOKEN_COOKIE, &token, dashboard_token_ttl())
    }

    pub fn dashboard_token(&self, jar: &CookieJar) -> Option<String> {
        self.open_from(jar, TOKEN_COOKIE)
    }

    pub fn set_flash(&self, jar: CookieJar, flash: &Flash) -> Result<CookieJar, ApiError> {
        self.seal_into(jar, FLASH_COOKIE, flash, flash_ttl())
    }

    /// Read and clear the flash message.
    pub fn take_flash(&self, jar: CookieJar) -> (CookieJar, Option<Flash>) {
        let flash = self.open_from(&jar, FLASH_COOKIE);
        if jar.get(FLASH_COOKIE).is_some() {
            (jar.remove(removal(FLASH_COOKIE)), flash)
        } else {
            (jar, flash)
        }
    }
}

/// Cookie that, passed to `CookieJar::remove`, expires `name` on the client.
pub fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

pub fn end_session(jar: CookieJar) -> CookieJar {
    jar.remove(removal(SESSION_COOKIE))
        .remove(removal(PENDING_2FA_COOKIE))
}

pub fn clear_dashboard_token(jar: CookieJar) -> CookieJar {
    jar.remove(removal(TOKEN_COOKIE))
}
