use axum::{
    Extension, Form, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use services::services::{
    datatype::{COLLECTION_PREFIX, Datatype, DatatypeError, FieldError},
    sdb::{Method, query_as, query_count},
};
use tracing::{info, instrument, warn};
use utils::htmx::{HxResponse, ToastKind, redirect};

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, DATATYPES},
    views::{Section, datatypes as view},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/datatypes", get(list_datatypes).post(create_datatype))
        .route(
            "/datatypes/{key}",
            get(show_datatype).delete(delete_datatype),
        )
        .route("/datatypes/{key}/records", post(create_record))
        .route("/datatypes/{key}/records/new", get(new_record))
        .route(
            "/datatypes/{key}/records/{record}",
            put(update_record).delete(delete_record),
        )
        .route("/datatypes/{key}/records/{record}/edit", get(edit_record))
}

fn datatypes(state: &AppState) -> Collection<'_> {
    Collection::new(state.sdb(), DATATYPES)
}

/// Record collections are interpolated into SDBQL, so the stored name must
/// still look like one we generated.
fn is_record_collection(name: &str) -> bool {
    name.strip_prefix(COLLECTION_PREFIX).is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

async fn load_datatype(state: &AppState, key: &str) -> Result<Datatype, ApiError> {
    let dt: Datatype = datatypes(state)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Datatype"))?;
    if !is_record_collection(&dt.collection) {
        return Err(ApiError::Internal(format!(
            "datatype {key} has an invalid collection '{}'",
            dt.collection
        )));
    }
    Ok(dt)
}

fn records<'a>(state: &'a AppState, dt: &'a Datatype) -> Collection<'a> {
    Collection::new(state.sdb(), &dt.collection)
}

async fn load_record(
    state: &AppState,
    dt: &Datatype,
    key: &str,
) -> Result<Map<String, Value>, ApiError> {
    records(state, dt)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Record"))
}

async fn render_list(
    state: &AppState,
    name: &str,
    fields_json: &str,
    form_errors: &[String],
) -> Result<String, ApiError> {
    let all: Vec<Datatype> = datatypes(state).all("name").await?;
    Ok(view::list(&all, name, fields_json, form_errors))
}

#[instrument(name = "datatypes.list", skip(state, ctx), fields(user = %ctx.user.key))]
async fn list_datatypes(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let body = render_list(&state, "", "", &[]).await?;
    Ok(page("Datatypes", Section::Datatypes, &ctx, body, htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct DatatypeForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: String,
}

#[instrument(name = "datatypes.create", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_datatype(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<DatatypeForm>,
) -> Result<Response, ApiError> {
    let dt = match Datatype::define(&form.name, &form.fields) {
        Ok(dt) => dt,
        Err(err) => {
            let body = render_list(&state, &form.name, &form.fields, &[err.to_string()]).await?;
            return Ok((
                StatusCode::BAD_REQUEST,
                page("Datatypes", Section::Datatypes, &ctx, body, htmx),
            )
                .into_response());
        }
    };

    let taken = query_count(
        state.sdb(),
        "RETURN LENGTH(FOR d IN datatypes FILTER d.collection == @collection RETURN 1)",
        json!({ "collection": dt.collection }),
    )
    .await?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!(
            "A datatype already uses the collection {}",
            dt.collection
        )));
    }

    let path = format!(
        "/_api/database/{}/collection",
        urlencoding::encode(state.sdb().database())
    );
    let reply = state
        .sdb()
        .service_api(
            Method::POST,
            &path,
            Some(json!({ "name": dt.collection, "type": "document" })),
        )
        .await?;
    // a leftover collection from a deleted datatype is reused
    if !reply.is_success() && reply.status != 409 {
        return Err(reply.into_error().into());
    }

    let created: Datatype = datatypes(&state)
        .insert(json!({
            "name": dt.name,
            "collection": dt.collection,
            "fields": dt.fields,
            "created_by": ctx.user.key,
            "created_at": store::now(),
        }))
        .await?;
    info!(datatype = %created.key, collection = %created.collection, "datatype created");
    Ok(redirect(htmx, &format!("/datatypes/{}", created.key)))
}

#[instrument(name = "datatypes.show", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_datatype(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let dt = load_datatype(&state, &key).await?;
    let rows: Vec<Value> = query_as(
        state.sdb(),
        &format!("FOR r IN {} SORT r.created_at DESC RETURN r", dt.collection),
        json!({}),
    )
    .await?;
    Ok(page(&dt.name, Section::Datatypes, &ctx, view::detail(&dt, &rows), htmx).into_response())
}

#[instrument(name = "datatypes.delete", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_datatype(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let dt = load_datatype(&state, &key).await?;
    let path = format!(
        "/_api/database/{}/collection/{}",
        urlencoding::encode(state.sdb().database()),
        urlencoding::encode(&dt.collection)
    );
    let reply = state.sdb().service_api(Method::DELETE, &path, None).await?;
    if !reply.is_success() && reply.status != 404 {
        warn!(collection = %dt.collection, status = reply.status, "record collection not dropped");
        return Err(reply.into_error().into());
    }
    datatypes(&state).remove(&dt.key).await?;
    info!(datatype = %dt.key, "datatype deleted");
    Ok(redirect(htmx, "/datatypes"))
}

fn form_page(
    ctx: &RequestContext,
    dt: &Datatype,
    record: Option<&str>,
    values: &[(String, String)],
    field_errors: &[FieldError],
    htmx: bool,
) -> Response {
    let body = view::record_form(dt, record, values, field_errors);
    let html = page(&dt.name, Section::Datatypes, ctx, body, htmx);
    if field_errors.is_empty() {
        html.into_response()
    } else {
        (StatusCode::BAD_REQUEST, html).into_response()
    }
}

/// Parse a submitted record, or the re-rendered form with every field error.
fn parse_or_reject(
    ctx: &RequestContext,
    dt: &Datatype,
    record: Option<&str>,
    pairs: &[(String, String)],
    htmx: bool,
) -> Result<Result<Map<String, Value>, Response>, ApiError> {
    match dt.parse_record(pairs) {
        Ok(parsed) => Ok(Ok(parsed)),
        Err(DatatypeError::Invalid(field_errors)) => {
            Ok(Err(form_page(ctx, dt, record, pairs, &field_errors, htmx)))
        }
        Err(other) => Err(other.into()),
    }
}

async fn new_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let dt = load_datatype(&state, &key).await?;
    Ok(form_page(&ctx, &dt, None, &[], &[], htmx))
}

#[instrument(name = "datatypes.create_record", skip(state, ctx, pairs), fields(user = %ctx.user.key))]
async fn create_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let dt = load_datatype(&state, &key).await?;
    let mut doc = match parse_or_reject(&ctx, &dt, None, &pairs, htmx)? {
        Ok(doc) => doc,
        Err(rejected) => return Ok(rejected),
    };
    doc.insert("created_by".to_string(), json!(ctx.user.key));
    doc.insert("created_at".to_string(), json!(store::now()));
    let created: Value = records(&state, &dt).insert(Value::Object(doc)).await?;
    info!(datatype = %dt.key, record = %created["_key"], "record created");
    Ok(redirect(htmx, &format!("/datatypes/{}", dt.key)))
}

#[instrument(name = "datatypes.edit_record", skip(state, ctx), fields(user = %ctx.user.key))]
async fn edit_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((key, record)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let dt = load_datatype(&state, &key).await?;
    let stored = load_record(&state, &dt, &record).await?;
    let values = view::record_values(&dt, &stored);
    Ok(form_page(&ctx, &dt, Some(&record), &values, &[], htmx))
}

#[instrument(name = "datatypes.update_record", skip(state, ctx, pairs), fields(user = %ctx.user.key))]
async fn update_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((key, record)): Path<(String, String)>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let dt = load_datatype(&state, &key).await?;
    load_record(&state, &dt, &record).await?;
    let mut patch = match parse_or_reject(&ctx, &dt, Some(&record), &pairs, htmx)? {
        Ok(patch) => patch,
        Err(rejected) => return Ok(rejected),
    };
    patch.insert("updated_at".to_string(), json!(store::now()));
    records(&state, &dt)
        .update::<Value>(&record, Value::Object(patch))
        .await?;
    info!(datatype = %dt.key, %record, "record updated");
    Ok(redirect(htmx, &format!("/datatypes/{}", dt.key)))
}

#[instrument(name = "datatypes.delete_record", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((key, record)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let dt = load_datatype(&state, &key).await?;
    load_record(&state, &dt, &record).await?;
    records(&state, &dt).remove(&record).await?;
    info!(datatype = %dt.key, %record, "record deleted");
    Ok(HxResponse::empty()
        .toast("Record deleted", ToastKind::Success)
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generated_collections_are_queried() {
        assert!(is_record_collection("dt_books"));
        assert!(is_record_collection("dt_reading_list_2"));
        assert!(!is_record_collection("dt_"));
        assert!(!is_record_collection("users"));
        assert!(!is_record_collection("dt_x RETURN 1"));
    }
}
