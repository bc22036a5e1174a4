//! reqwest-backed [`SdbApi`] implementation.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use utils::build_info::BUILD_INFO;

use super::{ApiReply, LiveQueryToken, SdbApi, SdbError, error_message_from};
use crate::services::config::{ServiceCredentials, WwwConfig};

/// Upper bound on cursor batches followed for one query.
const MAX_CURSOR_BATCHES: usize = 1_000;

#[derive(Debug, Deserialize)]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

pub struct SdbClient {
    http: Client,
    base_url: String,
    database: String,
    credentials: ServiceCredentials,
    service_token: RwLock<Option<SecretString>>,
}

impl std::fmt::Debug for SdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdbClient")
            .field("http", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("service_token", &"<secret>")
            .finish()
    }
}

impl SdbClient {
    pub fn new(config: &WwwConfig) -> Result<Self, SdbError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(BUILD_INFO.user_agent())
            .build()
            .map_err(|e| SdbError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        let service_token = match &config.credentials {
            ServiceCredentials::ApiKey(key) => Some(key.clone()),
            _ => None,
        };

        Ok(Self {
            http,
            base_url: config.solidb_url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            credentials: config.credentials.clone(),
            service_token: RwLock::new(service_token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Obtain the service token for SDBQL calls when an account is configured.
    pub async fn authenticate(&self) -> Result<(), SdbError> {
        match &self.credentials {
            ServiceCredentials::Account { username, password } => {
                let token = self.login(username, password.expose_secret()).await?;
                *self.service_token.write().await = Some(SecretString::from(token));
                tracing::info!(username = %username, "authenticated SoliDB service account");
                Ok(())
            }
            ServiceCredentials::ApiKey(_) => Ok(()),
            ServiceCredentials::None => {
                tracing::warn!("no SoliDB service credentials configured; queries run anonymously");
                Ok(())
            }
        }
    }

    async fn service_token(&self) -> Option<String> {
        self.service_token
            .read()
            .await
            .as_ref()
            .map(|t| t.expose_secret().to_string())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<ApiReply, SdbError> {
        let url = self.url(path);
        tracing::debug!(%method, %url, "SoliDB request");

        let mut request = self.http.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_reqwest_error)?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            // Some error paths answer with plain text.
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !(200..300).contains(&status) {
            tracing::debug!(status, body = %body, "SoliDB returned error");
        }

        Ok(ApiReply { status, body })
    }

    async fn run_cursor(
        &self,
        query: &str,
        bind_vars: &Value,
        token: Option<&str>,
    ) -> Result<ApiReply, SdbError> {
        let path = format!("/_api/database/{}/cursor", self.database);
        let payload = json!({ "query": query, "bindVars": bind_vars });
        self.send(Method::POST, &path, token, Some(&payload)).await
    }

    async fn drain_cursor(
        &self,
        first: CursorResponse,
        token: Option<&str>,
    ) -> Result<Vec<Value>, SdbError> {
        let mut rows = first.result;
        let mut has_more = first.has_more;
        let mut cursor_id = first.id;
        let mut batches = 0;

        while has_more {
            let Some(id) = cursor_id.take() else {
                break;
            };
            batches += 1;
            if batches > MAX_CURSOR_BATCHES {
                tracing::warn!(cursor = %id, "cursor batch limit reached; truncating result");
                break;
            }
            let reply = self
                .send(Method::PUT, &format!("/_api/cursor/{id}"), token, None)
                .await?;
            let next: CursorResponse = reply.json()?;
            rows.extend(next.result);
            has_more = next.has_more;
            cursor_id = next.id;
        }

        Ok(rows)
    }
}

#[async_trait]
impl SdbApi for SdbClient {
    fn database(&self) -> &str {
        &self.database
    }

    async fn sdbql(&self, query: &str, bind_vars: Value) -> Result<Vec<Value>, SdbError> {
        let mut token = self.service_token().await;
        let mut reply = self.run_cursor(query, &bind_vars, token.as_deref()).await?;

        // An expired service session is refreshed once; credentials never change at runtime.
        if reply.is_unauthorized()
            && matches!(self.credentials, ServiceCredentials::Account { .. })
        {
            tracing::info!("service token rejected; re-authenticating");
            self.authenticate().await?;
            token = self.service_token().await;
            reply = self.run_cursor(query, &bind_vars, token.as_deref()).await?;
        }

        let first: CursorResponse = reply.json()?;
        self.drain_cursor(first, token.as_deref()).await
    }

    async fn fetch_api(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<ApiReply, SdbError> {
        self.send(method, path, token, body.as_ref()).await
    }

    async fn service_api(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiReply, SdbError> {
        let token = self.service_token().await;
        self.send(method, path, token.as_deref(), body.as_ref()).await
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, SdbError> {
        let payload = json!({ "username": username, "password": password });
        let reply = self
            .send(Method::POST, "/auth/login", None, Some(&payload))
            .await?;

        // SoliDB answers bad credentials with 400 or 401 depending on the path taken.
        if reply.status == StatusCode::UNAUTHORIZED.as_u16()
            || (reply.status == StatusCode::BAD_REQUEST.as_u16()
                && error_message_from(&reply.body)
                    .is_some_and(|m| m.to_lowercase().contains("credentials")))
        {
            return Err(SdbError::InvalidCredentials);
        }

        let login: LoginResponse = reply.json()?;
        Ok(login.token)
    }

    async fn livequery_token(&self, token: &str) -> Result<LiveQueryToken, SdbError> {
        self.send(Method::GET, "/_api/livequery/token", Some(token), None)
            .await?
            .json()
    }

    async fn service_livequery_token(&self) -> Result<LiveQueryToken, SdbError> {
        let token = self.service_token().await.ok_or_else(|| {
            SdbError::NotConfigured("no service token for LiveQuery".to_string())
        })?;
        self.livequery_token(&token).await
    }

    async fn ping(&self) -> bool {
        let token = self.service_token().await;
        self.send(Method::GET, "/_api/databases", token.as_deref(), None)
            .await
            .is_ok()
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SdbError {
    if e.is_timeout() {
        SdbError::Timeout
    } else if e.is_connect() {
        SdbError::Unreachable
    } else {
        SdbError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SdbClient {
        let config = WwwConfig {
            solidb_url: "http://127.0.0.1:6745/".to_string(),
            ..WwwConfig::default()
        };
        SdbClient::new(&config).unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = client();
        assert_eq!(
            client.url("/_api/databases"),
            "http://127.0.0.1:6745/_api/databases"
        );
        assert_eq!(client.url("auth/login"), "http://127.0.0.1:6745/auth/login");
    }

    #[test]
    fn debug_hides_token() {
        let rendered = format!("{:?}", client());
        assert!(rendered.contains("<secret>"));
    }

    #[tokio::test]
    async fn api_key_is_used_as_service_token() {
        let config = WwwConfig {
            credentials: ServiceCredentials::ApiKey(SecretString::from("sdb_test_key")),
            ..WwwConfig::default()
        };
        let client = SdbClient::new(&config).unwrap();
        assert_eq!(client.service_token().await.as_deref(), Some("sdb_test_key"));
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_transient_error() {
        // Port 9 (discard) is closed on test machines.
        let config = WwwConfig {
            solidb_url: "http://127.0.0.1:9".to_string(),
            ..WwwConfig::default()
        };
        let client = SdbClient::new(&config).unwrap();
        let err = client.sdbql("RETURN 1", json!({})).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
