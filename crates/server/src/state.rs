use std::sync::Arc;

use secrecy::ExposeSecret;
use services::services::{config::WwwConfig, sdb::SdbApi};
use utils::crypto::{CookieSigner, SessionError, random_secret};

use crate::auth::LoginLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WwwConfig>,
    pub sdb: Arc<dyn SdbApi>,
    pub cookies: CookieSigner,
    pub login_limiter: Arc<LoginLimiter>,
}

impl AppState {
    pub fn new(config: WwwConfig, sdb: Arc<dyn SdbApi>) -> Result<Self, SessionError> {
        let secret = match &config.session_secret {
            Some(secret) => secret.expose_secret().as_bytes().to_vec(),
            None => {
                tracing::warn!(
                    "SESSION_SECRET is not set; using a random key, sessions will not survive a restart"
                );
                random_secret()
            }
        };

        Ok(Self {
            cookies: CookieSigner::new(&secret)?,
            config: Arc::new(config),
            sdb,
            login_limiter: Arc::new(LoginLimiter::default()),
        })
    }

    pub fn config(&self) -> &WwwConfig {
        &self.config
    }

    pub fn sdb(&self) -> &dyn SdbApi {
        self.sdb.as_ref()
    }

    pub fn cookies(&self) -> &CookieSigner {
        &self.cookies
    }

    pub fn login_limiter(&self) -> &LoginLimiter {
        &self.login_limiter
    }
}
