//! SoliDB administration: every outbound call carries the bearer token held in
//! the `sdb_token` cookie, so SoliDB enforces the caller's own permissions.

use axum::{
    Extension, Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::sdb::{LiveQueryToken, Method, SdbError};
use tracing::{info, instrument};
use utils::htmx::{HxResponse, ToastKind, redirect};

use crate::{
    AppState,
    auth::{DashboardContext, session::clear_dashboard_token},
    error::ApiError,
    extract::Htmx,
    views::{
        Page, Section,
        dashboard::{self as view, CollectionSummary, DocumentPage, QueryOutcome},
    },
};

pub const DEFAULT_PER_PAGE: u64 = 20;
pub const MAX_PER_PAGE: u64 = 100;
pub const MAX_PAGE: u64 = 1_000_000;

pub fn login_router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/login", get(login_page).post(login))
        .route("/dashboard/logout", post(logout))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(list_databases))
        .route("/dashboard/livequery/token", get(livequery_token))
        .route("/dashboard/databases", post(create_database))
        .route(
            "/dashboard/databases/{db}",
            delete(delete_database),
        )
        .route(
            "/dashboard/{db}/collections",
            get(list_collections).post(create_collection),
        )
        .route(
            "/dashboard/{db}/collections/{name}",
            delete(delete_collection),
        )
        .route(
            "/dashboard/{db}/collections/{name}/truncate",
            post(truncate_collection),
        )
        .route(
            "/dashboard/{db}/collections/{name}/documents",
            get(list_documents),
        )
        .route("/dashboard/{db}/documents/{collection}", post(insert_document))
        .route(
            "/dashboard/{db}/documents/{collection}/{key}",
            get(get_document)
                .put(update_document)
                .delete(delete_document),
        )
        .route("/dashboard/{db}/query", get(query_page).post(run_query))
}

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Call SoliDB with the caller's token and unwrap the reply body.
///
/// A 401 ends the dashboard session; other failures keep SoliDB's message.
async fn call(
    state: &AppState,
    ctx: &DashboardContext,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<Value, ApiError> {
    let reply = state
        .sdb()
        .fetch_api(method, path, Some(&ctx.token), body)
        .await?;
    if reply.is_unauthorized() {
        return Err(ApiError::DashboardUnauthorized);
    }
    if !reply.is_success() {
        return Err(reply.into_error().into());
    }
    Ok(reply.body)
}

fn dashboard_page(title: &str, body: String, htmx: bool) -> Response {
    Page::new(title, Section::Dashboard, body)
        .render(htmx)
        .into_response()
}

/// Collection names are interpolated into SDBQL, so only plain identifiers
/// are accepted.
pub fn validate_collection_name(name: &str) -> Result<(), ApiError> {
    let valid = !name.is_empty()
        && name.len() <= 256
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid collection name: {name}"
        )))
    }
}

/// Parse the `document` textarea; only JSON objects are documents.
pub fn parse_document(raw: &str) -> Result<Value, ApiError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(doc @ Value::Object(_)) => Ok(doc),
        Ok(_) => Err(ApiError::BadRequest(
            "Document must be a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::BadRequest(format!("Invalid JSON: {e}"))),
    }
}

async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
) -> Response {
    if state.dashboard_token(&jar).is_some() {
        return redirect(htmx, "/dashboard");
    }
    dashboard_page("SoliDB dashboard", view::login_form("", None), htmx)
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[instrument(name = "dashboard.login", skip(state, jar, form), fields(username = %form.username))]
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Htmx(htmx): Htmx,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let username = form.username.trim();
    let reject = |status: StatusCode, message: &str| {
        (
            status,
            Page::new(
                "SoliDB dashboard",
                Section::Dashboard,
                view::login_form(username, Some(message)),
            )
            .render(htmx),
        )
            .into_response()
    };

    if username.is_empty() || form.password.is_empty() {
        return Ok(reject(
            StatusCode::BAD_REQUEST,
            "Username and password are required",
        ));
    }

    let token = match state.sdb().login(username, &form.password).await {
        Ok(token) => token,
        Err(SdbError::InvalidCredentials) => {
            return Ok(reject(
                StatusCode::UNAUTHORIZED,
                "Invalid username or password",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    info!("dashboard session started");
    let jar = state.set_dashboard_token(jar, &token)?;
    Ok((jar, redirect(htmx, "/dashboard")).into_response())
}

async fn logout(jar: CookieJar, Htmx(htmx): Htmx) -> Response {
    (clear_dashboard_token(jar), redirect(htmx, "/dashboard/login")).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseList {
    #[serde(default)]
    databases: Vec<String>,
}

async fn fetch_databases(state: &AppState, ctx: &DashboardContext) -> Result<Vec<String>, ApiError> {
    let body = call(state, ctx, Method::GET, "/_api/databases", None).await?;
    let list: DatabaseList =
        serde_json::from_value(body).map_err(|e| SdbError::Parse(e.to_string()))?;
    Ok(list.databases)
}

#[instrument(name = "dashboard.databases", skip(state, ctx))]
async fn list_databases(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let databases = fetch_databases(&state, &ctx).await?;
    Ok(dashboard_page("Databases", view::databases(&databases), htmx))
}

#[derive(Debug, Default, Deserialize)]
pub struct NameForm {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[instrument(name = "dashboard.create_database", skip(state, ctx, form), fields(name = %form.name))]
async fn create_database(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<NameForm>,
) -> Result<Response, ApiError> {
    let name = form.name.trim();
    validate_collection_name(name)
        .map_err(|_| ApiError::BadRequest(format!("Invalid database name: {name}")))?;

    call(
        &state,
        &ctx,
        Method::POST,
        "/_api/database",
        Some(json!({ "name": name })),
    )
    .await?;
    info!("database created");

    if !htmx {
        return Ok(redirect(false, "/dashboard"));
    }
    let databases = fetch_databases(&state, &ctx).await?;
    Ok(HxResponse::fragment(view::databases(&databases))
        .toast(&format!("Database {name} created"), ToastKind::Success)
        .into_response())
}

#[instrument(name = "dashboard.delete_database", skip(state, ctx))]
async fn delete_database(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Path(db): Path<String>,
) -> Result<Response, ApiError> {
    call(
        &state,
        &ctx,
        Method::DELETE,
        &format!("/_api/database/{}", enc(&db)),
        None,
    )
    .await?;
    info!("database deleted");
    Ok(HxResponse::empty()
        .toast(&format!("Database {db} deleted"), ToastKind::Success)
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
struct CollectionList {
    #[serde(default)]
    collections: Vec<CollectionSummary>,
}

async fn fetch_collections(
    state: &AppState,
    ctx: &DashboardContext,
    db: &str,
) -> Result<Vec<CollectionSummary>, ApiError> {
    let body = call(
        state,
        ctx,
        Method::GET,
        &format!("/_api/database/{}/collection", enc(db)),
        None,
    )
    .await?;
    let mut list: CollectionList =
        serde_json::from_value(body).map_err(|e| SdbError::Parse(e.to_string()))?;
    list.collections.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(list.collections)
}

#[instrument(name = "dashboard.collections", skip(state, ctx))]
async fn list_collections(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path(db): Path<String>,
) -> Result<Response, ApiError> {
    let collections = fetch_collections(&state, &ctx, &db).await?;
    Ok(dashboard_page(&db, view::collections(&db, &collections), htmx))
}

#[instrument(name = "dashboard.create_collection", skip(state, ctx, form), fields(name = %form.name))]
async fn create_collection(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path(db): Path<String>,
    Form(form): Form<NameForm>,
) -> Result<Response, ApiError> {
    let name = form.name.trim();
    validate_collection_name(name)?;
    let kind = match form.kind.trim() {
        "" => "document",
        kind if view::COLLECTION_TYPES.iter().any(|(k, _)| *k == kind) => kind,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown collection type: {other}"
            )));
        }
    };

    call(
        &state,
        &ctx,
        Method::POST,
        &format!("/_api/database/{}/collection", enc(&db)),
        Some(json!({ "name": name, "type": kind })),
    )
    .await?;
    info!("collection created");

    if !htmx {
        return Ok(redirect(false, &format!("/dashboard/{}/collections", enc(&db))));
    }
    let collections = fetch_collections(&state, &ctx, &db).await?;
    Ok(HxResponse::fragment(view::collections(&db, &collections))
        .toast(&format!("Collection {name} created"), ToastKind::Success)
        .into_response())
}

#[instrument(name = "dashboard.delete_collection", skip(state, ctx))]
async fn delete_collection(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Path((db, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    call(
        &state,
        &ctx,
        Method::DELETE,
        &format!("/_api/database/{}/collection/{}", enc(&db), enc(&name)),
        None,
    )
    .await?;
    info!("collection deleted");
    Ok(HxResponse::empty()
        .toast(&format!("Collection {name} deleted"), ToastKind::Success)
        .into_response())
}

#[instrument(name = "dashboard.truncate_collection", skip(state, ctx))]
async fn truncate_collection(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path((db, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    call(
        &state,
        &ctx,
        Method::PUT,
        &format!(
            "/_api/database/{}/collection/{}/truncate",
            enc(&db),
            enc(&name)
        ),
        None,
    )
    .await?;
    info!("collection truncated");

    let back = format!("/dashboard/{}/collections", enc(&db));
    if !htmx {
        return Ok(redirect(false, &back));
    }
    Ok(HxResponse::empty()
        .redirect(back)
        .toast(&format!("Collection {name} truncated"), ToastKind::Success)
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PageQuery {
    /// 1-based page clamped to `1..=MAX_PAGE` and a page size clamped to
    /// `1..=MAX_PER_PAGE`.
    pub fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        (page, per_page)
    }
}

#[derive(Debug, Deserialize)]
struct CursorReply {
    #[serde(default)]
    result: Vec<Value>,
}

async fn cursor(
    state: &AppState,
    ctx: &DashboardContext,
    db: &str,
    query: &str,
    bind_vars: Value,
) -> Result<Vec<Value>, ApiError> {
    let body = call(
        state,
        ctx,
        Method::POST,
        &format!("/_api/database/{}/cursor", enc(db)),
        Some(json!({ "query": query, "bindVars": bind_vars })),
    )
    .await?;
    let reply: CursorReply =
        serde_json::from_value(body).map_err(|e| SdbError::Parse(e.to_string()))?;
    Ok(reply.result)
}

#[instrument(name = "dashboard.documents", skip(state, ctx, paging))]
async fn list_documents(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path((db, name)): Path<(String, String)>,
    Query(paging): Query<PageQuery>,
) -> Result<Response, ApiError> {
    validate_collection_name(&name)?;
    let (page, per_page) = paging.resolve();

    // One extra row tells whether a next page exists.
    let query = format!("FOR d IN {name} LIMIT @offset, @count RETURN d");
    let mut documents = cursor(
        &state,
        &ctx,
        &db,
        &query,
        json!({ "offset": (page - 1) * per_page, "count": per_page + 1 }),
    )
    .await?;
    let has_next = documents.len() as u64 > per_page;
    documents.truncate(per_page as usize);

    let body = view::documents(&DocumentPage {
        db: &db,
        collection: &name,
        documents: &documents,
        page,
        per_page,
        has_next,
    });
    Ok(dashboard_page(&name, body, htmx))
}

fn document_path(db: &str, collection: &str, key: Option<&str>) -> String {
    let mut path = format!("/_api/database/{}/document/{}", enc(db), enc(collection));
    if let Some(key) = key {
        path.push('/');
        path.push_str(&enc(key));
    }
    path
}

#[instrument(name = "dashboard.document", skip(state, ctx))]
async fn get_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path((db, collection, key)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let doc = call(
        &state,
        &ctx,
        Method::GET,
        &document_path(&db, &collection, Some(&key)),
        None,
    )
    .await?;
    Ok(dashboard_page(
        &key,
        view::document(&db, &collection, &key, &doc, None),
        htmx,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentForm {
    #[serde(default)]
    pub document: String,
}

#[instrument(name = "dashboard.insert_document", skip(state, ctx, form))]
async fn insert_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path((db, collection)): Path<(String, String)>,
    Form(form): Form<DocumentForm>,
) -> Result<Response, ApiError> {
    let doc = parse_document(&form.document)?;
    let created = call(
        &state,
        &ctx,
        Method::POST,
        &document_path(&db, &collection, None),
        Some(doc),
    )
    .await?;
    let key = created
        .get("_key")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    info!(key = %key, "document inserted");

    let target = if key.is_empty() {
        format!("/dashboard/{}/collections/{}/documents", enc(&db), enc(&collection))
    } else {
        format!("/dashboard/{}/documents/{}/{}", enc(&db), enc(&collection), enc(&key))
    };
    Ok(redirect(htmx, &target))
}

#[instrument(name = "dashboard.update_document", skip(state, ctx, form))]
async fn update_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Path((db, collection, key)): Path<(String, String, String)>,
    Form(form): Form<DocumentForm>,
) -> Result<Response, ApiError> {
    let doc = match parse_document(&form.document) {
        Ok(doc) => doc,
        Err(err) => {
            let current: Value = serde_json::from_str(&form.document).unwrap_or(Value::Null);
            let body = view::document(&db, &collection, &key, &current, Some(&err.public_message()));
            return Ok(HxResponse::fragment(body)
                .status(StatusCode::BAD_REQUEST)
                .into_response());
        }
    };

    let updated = call(
        &state,
        &ctx,
        Method::PUT,
        &document_path(&db, &collection, Some(&key)),
        Some(doc),
    )
    .await?;
    info!("document updated");
    Ok(HxResponse::fragment(view::document(&db, &collection, &key, &updated, None))
        .toast("Document saved", ToastKind::Success)
        .into_response())
}

#[instrument(name = "dashboard.delete_document", skip(state, ctx))]
async fn delete_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path((db, collection, key)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    call(
        &state,
        &ctx,
        Method::DELETE,
        &document_path(&db, &collection, Some(&key)),
        None,
    )
    .await?;
    info!("document deleted");
    Ok(redirect(
        htmx,
        &format!("/dashboard/{}/collections/{}/documents", enc(&db), enc(&collection)),
    ))
}

async fn query_page(
    Htmx(htmx): Htmx,
    Path(db): Path<String>,
) -> Response {
    dashboard_page("Query", view::query_console(&db, "", "", None), htmx)
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryForm {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub bind_vars: String,
}

/// Optional bind variables; blank means none, anything else must be an object.
pub fn parse_bind_vars(raw: &str) -> Result<Value, ApiError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(vars @ Value::Object(_)) => Ok(vars),
        Ok(_) => Err(ApiError::BadRequest(
            "Bind variables must be a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::BadRequest(format!(
            "Invalid bind variables: {e}"
        ))),
    }
}

#[instrument(name = "dashboard.query", skip(state, ctx, form))]
async fn run_query(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
    Htmx(htmx): Htmx,
    Path(db): Path<String>,
    Form(form): Form<QueryForm>,
) -> Result<Response, ApiError> {
    if form.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query is required".to_string()));
    }
    let bind_vars = parse_bind_vars(&form.bind_vars)?;

    let rows = match cursor(&state, &ctx, &db, &form.query, bind_vars).await {
        Ok(rows) => Ok(rows),
        Err(ApiError::Sdb(SdbError::Remote { message, .. })) => Err(message),
        Err(e) => return Err(e),
    };
    let outcome = match &rows {
        Ok(rows) => QueryOutcome::Rows(rows),
        Err(message) => QueryOutcome::Failed(message),
    };

    if htmx {
        return Ok(HxResponse::fragment(view::query_result(outcome)).into_response());
    }
    Ok(dashboard_page(
        "Query",
        view::query_console(&db, &form.query, &form.bind_vars, Some(outcome)),
        false,
    ))
}

#[instrument(name = "dashboard.livequery_token", skip(state, ctx))]
async fn livequery_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<DashboardContext>,
) -> Result<Json<LiveQueryToken>, ApiError> {
    match state.sdb().livequery_token(&ctx.token).await {
        Ok(token) => Ok(Json(token)),
        Err(SdbError::Remote { status: 401, .. }) | Err(SdbError::InvalidCredentials) => {
            Err(ApiError::DashboardUnauthorized)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let q = |page, per_page| PageQuery { page, per_page }.resolve();
        assert_eq!(q(None, None), (1, DEFAULT_PER_PAGE));
        assert_eq!(q(Some(0), Some(0)), (1, 1));
        assert_eq!(q(Some(3), Some(500)), (3, MAX_PER_PAGE));
        assert_eq!(q(Some(u64::MAX), Some(u64::MAX)), (MAX_PAGE, MAX_PER_PAGE));
    }

    #[test]
    fn collection_names_are_identifiers() {
        assert!(validate_collection_name("users_2").is_ok());
        assert!(validate_collection_name("bad name").is_err());
        assert!(validate_collection_name("x RETURN 1").is_err());
        assert!(validate_collection_name("").is_err());
    }

    #[test]
    fn documents_must_be_objects() {
        assert!(parse_document(r#"{"a": 1}"#).is_ok());
        assert!(matches!(parse_document("[1]"), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_document("{nope"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn blank_bind_vars_are_empty() {
        assert_eq!(parse_bind_vars("  ").unwrap(), json!({}));
        assert!(parse_bind_vars("[]").is_err());
    }
}
