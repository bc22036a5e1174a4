//! In-memory [`SdbApi`] double for controller tests.
//!
//! Queries are matched by substring against registered rules in registration
//! order; REST calls by method and exact path. Unmatched queries return no
//! rows and unmatched REST calls answer 404.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ApiReply, LiveQueryToken, Method, SdbApi, SdbError};

#[derive(Debug, Clone)]
pub enum RecordedCall {
    Query { query: String, bind_vars: Value },
    Api {
        method: Method,
        path: String,
        token: Option<String>,
        body: Option<Value>,
    },
    Login { username: String },
}

struct QueryRule {
    needle: String,
    outcome: Result<Vec<Value>, SdbError>,
    once: bool,
}

struct ApiRule {
    method: Method,
    path: String,
    reply: ApiReply,
}

#[derive(Default)]
struct State {
    queries: Vec<QueryRule>,
    apis: Vec<ApiRule>,
    logins: HashMap<(String, String), String>,
    calls: Vec<RecordedCall>,
}

pub struct MockSdb {
    database: String,
    state: Mutex<State>,
}

impl Default for MockSdb {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockSdb {
    pub fn new() -> Self {
        Self {
            database: "solidb_www".to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Answer every query containing `needle` with `rows`.
    pub fn on_query(&self, needle: &str, rows: Vec<Value>) -> &Self {
        lock(&self.state).queries.push(QueryRule {
            needle: needle.to_string(),
            outcome: Ok(rows),
            once: false,
        });
        self
    }

    /// Answer the next query containing `needle` with `rows`, then forget the rule.
    pub fn on_query_once(&self, needle: &str, rows: Vec<Value>) -> &Self {
        lock(&self.state).queries.push(QueryRule {
            needle: needle.to_string(),
            outcome: Ok(rows),
            once: true,
        });
        self
    }

    pub fn fail_query(&self, needle: &str, error: SdbError) -> &Self {
        lock(&self.state).queries.push(QueryRule {
            needle: needle.to_string(),
            outcome: Err(error),
            once: false,
        });
        self
    }

    pub fn on_api(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        lock(&self.state).apis.push(ApiRule {
            method,
            path: path.to_string(),
            reply: ApiReply::new(status, body),
        });
        self
    }

    pub fn allow_login(&self, username: &str, password: &str, token: &str) -> &Self {
        lock(&self.state).logins.insert(
            (username.to_string(), password.to_string()),
            token.to_string(),
        );
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.state).calls.clone()
    }

    /// Recorded SDBQL queries with their bind variables.
    pub fn queries(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Query { query, bind_vars } => Some((query, bind_vars)),
                _ => None,
            })
            .collect()
    }

    /// Recorded queries containing `needle`.
    pub fn queries_matching(&self, needle: &str) -> Vec<(String, Value)> {
        self.queries()
            .into_iter()
            .filter(|(query, _)| query.contains(needle))
            .collect()
    }

    pub fn api_calls(&self) -> Vec<(Method, String, Option<String>, Option<Value>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Api {
                    method,
                    path,
                    token,
                    body,
                } => Some((method, path, token, body)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SdbApi for MockSdb {
    fn database(&self) -> &str {
        &self.database
    }

    async fn sdbql(&self, query: &str, bind_vars: Value) -> Result<Vec<Value>, SdbError> {
        let mut state = lock(&self.state);
        state.calls.push(RecordedCall::Query {
            query: query.to_string(),
            bind_vars,
        });

        let Some(index) = state
            .queries
            .iter()
            .position(|rule| query.contains(&rule.needle))
        else {
            return Ok(Vec::new());
        };

        if state.queries[index].once {
            state.queries.remove(index).outcome
        } else {
            state.queries[index].outcome.clone()
        }
    }

    async fn fetch_api(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<ApiReply, SdbError> {
        let mut state = lock(&self.state);
        state.calls.push(RecordedCall::Api {
            method: method.clone(),
            path: path.to_string(),
            token: token.map(str::to_string),
            body,
        });

        Ok(state
            .apis
            .iter()
            .find(|rule| rule.method == method && rule.path == path)
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| ApiReply::new(404, json!({ "error": "not found" }))))
    }

    async fn service_api(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiReply, SdbError> {
        self.fetch_api(method, path, Some("service"), body).await
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, SdbError> {
        let mut state = lock(&self.state);
        state.calls.push(RecordedCall::Login {
            username: username.to_string(),
        });
        state
            .logins
            .get(&(username.to_string(), password.to_string()))
            .cloned()
            .ok_or(SdbError::InvalidCredentials)
    }

    async fn livequery_token(&self, token: &str) -> Result<LiveQueryToken, SdbError> {
        if token.is_empty() {
            return Err(SdbError::Remote {
                status: 401,
                message: "missing token".to_string(),
            });
        }
        Ok(LiveQueryToken {
            token: format!("lq-{token}"),
            expires_in: 30,
        })
    }

    async fn service_livequery_token(&self) -> Result<LiveQueryToken, SdbError> {
        self.livequery_token("service").await
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn once_rules_are_consumed() {
        let sdb = MockSdb::new();
        sdb.on_query_once("FOR u IN users", vec![json!({ "_key": "1" })]);
        sdb.on_query("FOR u IN users", vec![]);

        assert_eq!(sdb.sdbql("FOR u IN users RETURN u", json!({})).await.unwrap().len(), 1);
        assert!(sdb.sdbql("FOR u IN users RETURN u", json!({})).await.unwrap().is_empty());
        assert_eq!(sdb.queries().len(), 2);
    }

    #[tokio::test]
    async fn unmatched_api_is_not_found() {
        let sdb = MockSdb::new();
        let reply = sdb
            .fetch_api(Method::GET, "/_api/databases", Some("t"), None)
            .await
            .unwrap();
        assert_eq!(reply.status, 404);
    }
}
