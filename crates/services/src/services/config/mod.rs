//! Environment-driven configuration for the front-end.
//!
//! # Variables
//!
//! - `SOLIDB_URL`: base URL of the SoliDB server (default `http://127.0.0.1:6745`)
//! - `SOLIDB_DATABASE`: application database (default `solidb_www`)
//! - `SOLIDB_USERNAME` / `SOLIDB_PASSWORD`: service account used for SDBQL
//! - `SOLIDB_API_KEY`: static service token, used instead of the account
//! - `SESSION_SECRET`: cookie signing key, at least 32 bytes
//! - `HOST` / `PORT`: listen address (default `127.0.0.1:8080`)
//! - `PUBLIC_URL`: externally visible base URL (default `http://{HOST}:{PORT}`)
//! - `SDB_WWW_SECURE_COOKIES`: `true`/`1` to set the `Secure` cookie flag
//! - `SDB_WWW_REQUEST_TIMEOUT_SECS`: outbound request timeout (default 30)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

pub const DEFAULT_SOLIDB_URL: &str = "http://127.0.0.1:6745";
pub const DEFAULT_DATABASE: &str = "solidb_www";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Service account credentials for SDBQL calls.
#[derive(Debug, Clone)]
pub enum ServiceCredentials {
    Account {
        username: String,
        password: SecretString,
    },
    ApiKey(SecretString),
    None,
}

#[derive(Debug, Clone)]
pub struct WwwConfig {
    pub solidb_url: String,
    pub database: String,
    pub credentials: ServiceCredentials,
    pub session_secret: Option<SecretString>,
    pub host: String,
    pub port: u16,
    pub public_url: String,
    pub secure_cookies: bool,
    pub request_timeout: Duration,
}

impl Default for WwwConfig {
    fn default() -> Self {
        Self {
            solidb_url: DEFAULT_SOLIDB_URL.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            credentials: ServiceCredentials::None,
            session_secret: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_url: format!("http://{DEFAULT_HOST}:{DEFAULT_PORT}"),
            secure_cookies: false,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl WwwConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; `from_env` uses the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let solidb_url = get("SOLIDB_URL").unwrap_or_else(|| DEFAULT_SOLIDB_URL.to_string());
        url::Url::parse(&solidb_url).map_err(|e| ConfigError::Invalid {
            name: "SOLIDB_URL",
            reason: e.to_string(),
        })?;
        let solidb_url = solidb_url.trim_end_matches('/').to_string();

        let database = get("SOLIDB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let credentials = match (
            get("SOLIDB_API_KEY"),
            get("SOLIDB_USERNAME"),
            get("SOLIDB_PASSWORD"),
        ) {
            (Some(key), _, _) => ServiceCredentials::ApiKey(SecretString::from(key)),
            (None, Some(username), Some(password)) => ServiceCredentials::Account {
                username,
                password: SecretString::from(password),
            },
            (None, Some(_), None) => {
                return Err(ConfigError::ValidationError(
                    "SOLIDB_USERNAME is set but SOLIDB_PASSWORD is missing".to_string(),
                ));
            }
            _ => ServiceCredentials::None,
        };

        let session_secret = match get("SESSION_SECRET") {
            Some(secret) if secret.len() < 32 => {
                return Err(ConfigError::Invalid {
                    name: "SESSION_SECRET",
                    reason: "must be at least 32 bytes".to_string(),
                });
            }
            Some(secret) => Some(SecretString::from(secret)),
            None => None,
        };

        let host = get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        let public_url = get("PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{host}:{port}"));

        let secure_cookies = get("SDB_WWW_SECURE_COOKIES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let request_timeout = get("SDB_WWW_REQUEST_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&n| n > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        Ok(Self {
            solidb_url,
            database,
            credentials,
            session_secret,
            host,
            port,
            public_url,
            secure_cookies,
            request_timeout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<WwwConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WwwConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.solidb_url, DEFAULT_SOLIDB_URL);
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.public_url, "http://127.0.0.1:8080");
        assert!(matches!(config.credentials, ServiceCredentials::None));
        assert!(!config.secure_cookies);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn api_key_wins_over_account() {
        let config = config_from(&[
            ("SOLIDB_API_KEY", "sdb_key"),
            ("SOLIDB_USERNAME", "admin"),
            ("SOLIDB_PASSWORD", "pw"),
        ])
        .unwrap();
        assert!(matches!(config.credentials, ServiceCredentials::ApiKey(_)));
    }

    #[test]
    fn username_without_password_is_rejected() {
        let err = config_from(&[("SOLIDB_USERNAME", "admin")]).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let err = config_from(&[("SESSION_SECRET", "tooshort")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "SESSION_SECRET",
                ..
            }
        ));
    }

    #[test]
    fn trailing_slash_trimmed_and_port_parsed() {
        let config = config_from(&[
            ("SOLIDB_URL", "https://db.example.com/"),
            ("PORT", "9000"),
            ("SDB_WWW_SECURE_COOKIES", "1"),
        ])
        .unwrap();
        assert_eq!(config.solidb_url, "https://db.example.com");
        assert_eq!(config.port, 9000);
        assert!(config.secure_cookies);
    }

    #[test]
    fn invalid_port_is_reported() {
        assert!(config_from(&[("PORT", "http")]).is_err());
    }
}
