use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::{
    sdb::{query_as, query_count, query_one},
    slug::{slugify, unique_slug},
};
use tracing::{info, instrument};
use utils::htmx::redirect;

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, PAGE_REVISIONS, PAGES},
    views::{
        Section,
        docs::{self as view, DocPage, PageFormValues},
    },
};

/// Slugs that collide with fixed routes.
const RESERVED_SLUGS: [&str; 1] = ["new"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/docs", get(index).post(create_page))
        .route("/docs/new", get(new_page))
        .route(
            "/docs/{slug}",
            get(show_page).put(update_page).delete(delete_page),
        )
        .route("/docs/{slug}/edit", get(edit_page))
}

fn pages(state: &AppState) -> Collection<'_> {
    Collection::new(state.sdb(), PAGES)
}

async fn all_pages(state: &AppState) -> Result<Vec<DocPage>, ApiError> {
    Ok(query_as(
        state.sdb(),
        "FOR p IN pages SORT p.position ASC, p.title ASC RETURN p",
        json!({}),
    )
    .await?)
}

async fn find_page(state: &AppState, slug: &str) -> Result<Option<DocPage>, ApiError> {
    Ok(query_one(
        state.sdb(),
        "FOR p IN pages FILTER p.slug == @slug LIMIT 1 RETURN p",
        json!({ "slug": slug }),
    )
    .await?)
}

async fn load_page(state: &AppState, slug: &str) -> Result<DocPage, ApiError> {
    find_page(state, slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Page"))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent: String,
}

impl PageForm {
    fn values(&self) -> PageFormValues {
        PageFormValues {
            title: self.title.clone(),
            content: self.content.clone(),
            parent: self.parent.clone(),
        }
    }

    fn parent(&self) -> Option<&str> {
        Some(self.parent.trim()).filter(|p| !p.is_empty())
    }
}

/// Problems with a submitted page; `own_slug` is set when editing.
async fn check_form(
    state: &AppState,
    form: &PageForm,
    own_slug: Option<&str>,
) -> Result<Vec<String>, ApiError> {
    let mut problems = Vec::new();
    let title = form.title.trim();
    if title.is_empty() {
        problems.push("Title is required".to_string());
    } else if own_slug.is_none() && slugify(title).is_empty() {
        problems.push("Title needs at least one letter or digit".to_string());
    }
    match (form.parent(), own_slug) {
        (None, _) => {}
        (Some(parent), Some(own)) if parent == own => {
            problems.push("A page cannot be its own parent".to_string());
        }
        (Some(parent), Some(own)) => {
            let all = all_pages(state).await?;
            if !all.iter().any(|p| p.slug == parent) {
                problems.push(format!("Parent page '{parent}' not found"));
            } else if is_below(&all, parent, own) {
                problems.push(format!(
                    "'{parent}' is a subpage of this page and cannot be its parent"
                ));
            }
        }
        (Some(parent), None) => {
            if find_page(state, parent).await?.is_none() {
                problems.push(format!("Parent page '{parent}' not found"));
            }
        }
    }
    Ok(problems)
}

/// Whether `ancestor` appears on the parent chain of `slug`.
fn is_below(all: &[DocPage], slug: &str, ancestor: &str) -> bool {
    let parents: HashMap<&str, &str> = all
        .iter()
        .filter_map(|p| Some((p.slug.as_str(), p.parent.as_deref()?)))
        .collect();
    let mut seen = HashSet::new();
    let mut current = slug;
    while let Some(&parent) = parents.get(current) {
        if parent == ancestor {
            return true;
        }
        if !seen.insert(parent) {
            return false;
        }
        current = parent;
    }
    false
}

fn rejected(
    ctx: &RequestContext,
    slug: Option<&str>,
    form: &PageForm,
    all: &[DocPage],
    problems: &[String],
    htmx: bool,
) -> Response {
    let body = view::form(slug, &form.values(), all, problems);
    (
        StatusCode::BAD_REQUEST,
        page("Page", Section::Docs, ctx, body, htmx),
    )
        .into_response()
}

#[instrument(name = "docs.index", skip(state, ctx), fields(user = %ctx.user.key))]
async fn index(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let all = all_pages(&state).await?;
    Ok(page("Docs", Section::Docs, &ctx, view::index(&all), htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct NewPageQuery {
    pub parent: Option<String>,
}

async fn new_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Query(query): Query<NewPageQuery>,
) -> Result<Response, ApiError> {
    let all = all_pages(&state).await?;
    let values = PageFormValues {
        parent: query.parent.unwrap_or_default(),
        ..Default::default()
    };
    let body = view::form(None, &values, &all, &[]);
    Ok(page("New page", Section::Docs, &ctx, body, htmx).into_response())
}

#[instrument(name = "docs.create", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<PageForm>,
) -> Result<Response, ApiError> {
    let problems = check_form(&state, &form, None).await?;
    if !problems.is_empty() {
        let all = all_pages(&state).await?;
        return Ok(rejected(&ctx, None, &form, &all, &problems, htmx));
    }

    let base = slugify(form.title.trim());
    let mut taken: Vec<String> = query_as(
        state.sdb(),
        "FOR p IN pages FILTER p.slug == @base OR STARTS_WITH(p.slug, @prefix) RETURN p.slug",
        json!({ "base": base, "prefix": format!("{base}-") }),
    )
    .await?;
    taken.extend(RESERVED_SLUGS.iter().map(|s| s.to_string()));
    let slug = unique_slug(&base, &taken);

    let position = query_count(
        state.sdb(),
        "RETURN LENGTH(FOR p IN pages FILTER p.parent == @parent RETURN 1)",
        json!({ "parent": form.parent() }),
    )
    .await?;
    let now = store::now();
    let created: DocPage = pages(&state)
        .insert(json!({
            "slug": slug,
            "title": form.title.trim(),
            "content": form.content,
            "parent": form.parent(),
            "position": position,
            "author": ctx.user.username,
            "created_at": now,
            "updated_at": now,
        }))
        .await?;
    info!(page = %created.key, slug = %created.slug, "page created");
    Ok(redirect(htmx, &format!("/docs/{}", created.slug)))
}

#[instrument(name = "docs.show", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let doc = load_page(&state, &slug).await?;
    let parent = match doc.parent.as_deref() {
        Some(parent) => find_page(&state, parent).await?,
        None => None,
    };
    let children: Vec<DocPage> = query_as(
        state.sdb(),
        "FOR p IN pages FILTER p.parent == @slug SORT p.position ASC, p.title ASC RETURN p",
        json!({ "slug": doc.slug }),
    )
    .await?;
    let body = view::show(&doc, parent.as_ref(), &children);
    Ok(page(&doc.title, Section::Docs, &ctx, body, htmx).into_response())
}

#[instrument(name = "docs.edit", skip(state, ctx), fields(user = %ctx.user.key))]
async fn edit_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let doc = load_page(&state, &slug).await?;
    let all = all_pages(&state).await?;
    let values = PageFormValues {
        title: doc.title.clone(),
        content: doc.content.clone(),
        parent: doc.parent.clone().unwrap_or_default(),
    };
    let body = view::form(Some(&doc.slug), &values, &all, &[]);
    Ok(page(&doc.title, Section::Docs, &ctx, body, htmx).into_response())
}

#[instrument(name = "docs.update", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn update_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(slug): Path<String>,
    Form(form): Form<PageForm>,
) -> Result<Response, ApiError> {
    let doc = load_page(&state, &slug).await?;
    let problems = check_form(&state, &form, Some(&doc.slug)).await?;
    if !problems.is_empty() {
        let all = all_pages(&state).await?;
        return Ok(rejected(&ctx, Some(&doc.slug), &form, &all, &problems, htmx));
    }

    Collection::new(state.sdb(), PAGE_REVISIONS)
        .insert::<Value>(json!({
            "page_key": doc.key,
            "slug": doc.slug,
            "title": doc.title,
            "content": doc.content,
            "author": doc.author,
            "created_at": store::now(),
        }))
        .await?;
    pages(&state)
        .update::<Value>(
            &doc.key,
            json!({
                "title": form.title.trim(),
                "content": form.content,
                "parent": form.parent(),
                "author": ctx.user.username,
                "updated_at": store::now(),
            }),
        )
        .await?;
    info!(page = %doc.key, slug = %doc.slug, "page updated");
    Ok(redirect(htmx, &format!("/docs/{}", doc.slug)))
}

#[instrument(name = "docs.delete", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let doc = load_page(&state, &slug).await?;
    let children = query_count(
        state.sdb(),
        "RETURN LENGTH(FOR p IN pages FILTER p.parent == @slug RETURN 1)",
        json!({ "slug": doc.slug }),
    )
    .await?;
    if children > 0 {
        return Err(ApiError::Conflict(format!(
            "'{}' has {children} subpage(s); move or delete them first",
            doc.title
        )));
    }

    state
        .sdb()
        .sdbql(
            "FOR r IN page_revisions FILTER r.page_key == @page REMOVE r IN page_revisions",
            json!({ "page": doc.key }),
        )
        .await?;
    pages(&state).remove(&doc.key).await?;
    info!(page = %doc.key, slug = %doc.slug, "page deleted");
    Ok(redirect(htmx, "/docs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(slug: &str, parent: Option<&str>) -> DocPage {
        DocPage {
            key: slug.to_string(),
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            content: String::new(),
            parent: parent.map(str::to_string),
            position: 0,
            author: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn subpages_are_found_through_the_whole_chain() {
        let all = [
            doc("a", None),
            doc("b", Some("a")),
            doc("c", Some("b")),
            doc("d", None),
        ];
        assert!(is_below(&all, "b", "a"));
        assert!(is_below(&all, "c", "a"));
        assert!(!is_below(&all, "d", "a"));
        assert!(!is_below(&all, "a", "c"));
    }

    #[test]
    fn existing_loops_do_not_hang() {
        let all = [doc("x", Some("y")), doc("y", Some("x"))];
        assert!(!is_below(&all, "x", "z"));
    }
}
