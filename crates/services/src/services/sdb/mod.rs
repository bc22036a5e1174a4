//! Access to the SoliDB server.
//!
//! Everything durable lives in SoliDB. Controllers reach it two ways:
//!
//! - [`SdbApi::sdbql`] runs an SDBQL query against the application database
//!   with the service token.
//! - [`SdbApi::fetch_api`] calls any REST path with the caller's own bearer
//!   token (the dashboard), returning the status so callers can branch on it.

mod client;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use async_trait::async_trait;
pub use client::SdbClient;
pub use reqwest::Method;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SdbError {
    #[error("request to SoliDB timed out")]
    Timeout,
    #[error("SoliDB is unreachable")]
    Unreachable,
    #[error("request to SoliDB failed: {0}")]
    Transport(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("SoliDB returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("failed to parse SoliDB response: {0}")]
    Parse(String),
    #[error("SoliDB client is not configured: {0}")]
    NotConfigured(String),
}

impl SdbError {
    /// Returns true if the error is transient and could be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unreachable | Self::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::InvalidCredentials => Some(401),
            _ => None,
        }
    }
}

/// Outcome of a REST call that reached SoliDB, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl ApiReply {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Human readable error carried by a failed reply.
    pub fn error_message(&self) -> String {
        error_message_from(&self.body)
            .unwrap_or_else(|| format!("SoliDB returned HTTP {}", self.status))
    }

    pub fn into_error(self) -> SdbError {
        SdbError::Remote {
            status: self.status,
            message: self.error_message(),
        }
    }

    /// Deserialize the body, or turn a failed reply into an error.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, SdbError> {
        if !self.is_success() {
            return Err(self.into_error());
        }
        serde_json::from_value(self.body).map_err(|e| SdbError::Parse(e.to_string()))
    }
}

pub(crate) fn error_message_from(body: &Value) -> Option<String> {
    ["error", "message", "errorMessage"]
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| body.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

/// Short-lived token the browser uses to open a LiveQuery WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveQueryToken {
    pub token: String,
    pub expires_in: u32,
}

#[async_trait]
pub trait SdbApi: Send + Sync {
    /// Application database the service queries run against.
    fn database(&self) -> &str;

    /// Run an SDBQL query with bind variables, returning the result rows.
    async fn sdbql(&self, query: &str, bind_vars: Value) -> Result<Vec<Value>, SdbError>;

    /// REST call authenticated with the caller's token.
    async fn fetch_api(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<ApiReply, SdbError>;

    /// REST call authenticated with the service account.
    async fn service_api(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiReply, SdbError>;

    /// Exchange credentials for a SoliDB JWT.
    async fn login(&self, username: &str, password: &str) -> Result<String, SdbError>;

    /// Mint a LiveQuery token on behalf of `token`'s holder.
    async fn livequery_token(&self, token: &str) -> Result<LiveQueryToken, SdbError>;

    /// Mint a LiveQuery token with the service account, for application
    /// users who hold no SoliDB credentials of their own.
    async fn service_livequery_token(&self) -> Result<LiveQueryToken, SdbError>;

    /// Reachability check for `/health`.
    async fn ping(&self) -> bool;
}

/// Run a query and deserialize every row.
pub async fn query_as<T: DeserializeOwned>(
    sdb: &dyn SdbApi,
    query: &str,
    bind_vars: Value,
) -> Result<Vec<T>, SdbError> {
    sdb.sdbql(query, bind_vars)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| SdbError::Parse(e.to_string())))
        .collect()
}

/// Run a query and deserialize the first row, if any.
pub async fn query_one<T: DeserializeOwned>(
    sdb: &dyn SdbApi,
    query: &str,
    bind_vars: Value,
) -> Result<Option<T>, SdbError> {
    match sdb.sdbql(query, bind_vars).await?.into_iter().next() {
        Some(Value::Null) | None => Ok(None),
        Some(row) => serde_json::from_value(row)
            .map(Some)
            .map_err(|e| SdbError::Parse(e.to_string())),
    }
}

/// Run a query whose single row is a number (e.g. `RETURN LENGTH(...)`).
pub async fn query_count(
    sdb: &dyn SdbApi,
    query: &str,
    bind_vars: Value,
) -> Result<u64, SdbError> {
    Ok(sdb
        .sdbql(query, bind_vars)
        .await?
        .first()
        .and_then(Value::as_u64)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reply_error_message_prefers_error_field() {
        let reply = ApiReply::new(409, json!({ "error": "collection exists", "code": 1207 }));
        assert_eq!(reply.error_message(), "collection exists");
        assert!(!reply.is_success());
    }

    #[test]
    fn reply_error_message_falls_back_to_status() {
        let reply = ApiReply::new(500, json!({}));
        assert_eq!(reply.error_message(), "SoliDB returned HTTP 500");
    }

    #[test]
    fn reply_json_propagates_failure() {
        let reply = ApiReply::new(404, json!({ "message": "document not found" }));
        let err = reply.json::<Value>().unwrap_err();
        assert!(matches!(err, SdbError::Remote { status: 404, .. }));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn transient_classification() {
        assert!(SdbError::Timeout.is_transient());
        assert!(SdbError::Unreachable.is_transient());
        assert!(SdbError::Transport("reset".into()).is_transient());
        assert!(!SdbError::InvalidCredentials.is_transient());
        assert!(
            !SdbError::Remote {
                status: 500,
                message: "boom".into()
            }
            .is_transient()
        );
    }
}
