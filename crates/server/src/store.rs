//! Thin document repository over SDBQL.
//!
//! Collection names are compile-time constants or validated datatype
//! collections, so they are interpolated; every value goes through bind
//! variables.

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use services::services::sdb::{SdbApi, SdbError, query_as, query_one};

pub const USERS: &str = "users";
pub const CHANNELS: &str = "channels";
pub const MESSAGES: &str = "messages";
pub const PROJECTS: &str = "projects";
pub const TASKS: &str = "tasks";
pub const FEATURES: &str = "features";
pub const INVOICES: &str = "invoices";
pub const MAILS: &str = "mails";
pub const EVENTS: &str = "calendar_events";
pub const REPOSITORIES: &str = "repositories";
pub const ISSUES: &str = "issues";
pub const PAGES: &str = "pages";
pub const PAGE_REVISIONS: &str = "page_revisions";
pub const DATATYPES: &str = "datatypes";
pub const GAMES: &str = "belote_games";

pub struct Collection<'a> {
    sdb: &'a dyn SdbApi,
    name: &'a str,
}

impl<'a> Collection<'a> {
    pub fn new(sdb: &'a dyn SdbApi, name: &'a str) -> Self {
        Self { sdb, name }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SdbError> {
        let query = format!("FOR d IN {} FILTER d._key == @key LIMIT 1 RETURN d", self.name);
        query_one(self.sdb, &query, json!({ "key": key })).await
    }

    pub async fn all<T: DeserializeOwned>(&self, sort: &str) -> Result<Vec<T>, SdbError> {
        let query = format!("FOR d IN {} SORT d.{sort} ASC RETURN d", self.name);
        query_as(self.sdb, &query, json!({})).await
    }

    pub async fn insert<T: DeserializeOwned>(&self, doc: Value) -> Result<T, SdbError> {
        let query = format!("INSERT @doc INTO {} RETURN NEW", self.name);
        query_one(self.sdb, &query, json!({ "doc": doc }))
            .await?
            .ok_or_else(|| SdbError::Parse(format!("insert into {} returned nothing", self.name)))
    }

    pub async fn update<T: DeserializeOwned>(
        &self,
        key: &str,
        patch: Value,
    ) -> Result<Option<T>, SdbError> {
        let query = format!(
            "FOR d IN {name} FILTER d._key == @key UPDATE d WITH @patch IN {name} RETURN NEW",
            name = self.name
        );
        query_one(self.sdb, &query, json!({ "key": key, "patch": patch })).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), SdbError> {
        let query = format!(
            "FOR d IN {name} FILTER d._key == @key REMOVE d IN {name}",
            name = self.name
        );
        self.sdb.sdbql(&query, json!({ "key": key })).await?;
        Ok(())
    }
}

pub fn users(sdb: &dyn SdbApi) -> Collection<'_> {
    Collection::new(sdb, USERS)
}

pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use services::services::sdb::mock::MockSdb;

    use super::*;

    #[tokio::test]
    async fn get_binds_the_key() {
        let sdb = MockSdb::new();
        sdb.on_query("FOR d IN tasks FILTER d._key == @key", vec![json!({ "_key": "t1" })]);
        let doc: Option<Value> = Collection::new(&sdb, TASKS).get("t1").await.unwrap();
        assert_eq!(doc.unwrap()["_key"], "t1");
        let (_, vars) = sdb.queries().pop().unwrap();
        assert_eq!(vars, json!({ "key": "t1" }));
    }

    #[tokio::test]
    async fn insert_without_result_is_an_error() {
        let sdb = MockSdb::new();
        let result: Result<Value, _> = Collection::new(&sdb, TASKS).insert(json!({})).await;
        assert!(matches!(result, Err(SdbError::Parse(_))));
    }
}
