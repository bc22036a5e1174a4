use axum::{
    Extension, Form, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::{
    sdb::{query_as, query_count, query_one},
    slug::validate_repo_name,
};
use tracing::{info, instrument};
use utils::htmx::redirect;

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, ISSUES, REPOSITORIES},
    views::{
        Section,
        repos::{self as view, Issue, IssueState, Repository, Visibility},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/repos", get(list_repos).post(create_repo))
        .route(
            "/repos/{owner}/{name}",
            get(show_repo).put(update_repo).delete(delete_repo),
        )
        .route(
            "/repos/{owner}/{name}/issues",
            get(list_issues).post(create_issue),
        )
        .route(
            "/repos/{owner}/{name}/issues/{number}/close",
            post(close_issue),
        )
}

fn repositories(state: &AppState) -> Collection<'_> {
    Collection::new(state.sdb(), REPOSITORIES)
}

/// Private repositories of other users answer 404, as if absent.
async fn visible_repo(
    state: &AppState,
    ctx: &RequestContext,
    owner: &str,
    name: &str,
) -> Result<Repository, ApiError> {
    let repo: Option<Repository> = query_one(
        state.sdb(),
        "FOR r IN repositories FILTER r.owner == @owner AND r.name == @name LIMIT 1 RETURN r",
        json!({ "owner": owner, "name": name }),
    )
    .await?;
    repo.filter(|r| r.visible_to(&ctx.user.key))
        .ok_or_else(|| ApiError::not_found("Repository"))
}

async fn owned_repo(
    state: &AppState,
    ctx: &RequestContext,
    owner: &str,
    name: &str,
) -> Result<Repository, ApiError> {
    let repo = visible_repo(state, ctx, owner, name).await?;
    if repo.owner_key != ctx.user.key {
        return Err(ApiError::Forbidden(
            "Only the owner can change repository settings".to_string(),
        ));
    }
    Ok(repo)
}

async fn visible_repos(state: &AppState, ctx: &RequestContext) -> Result<Vec<Repository>, ApiError> {
    Ok(query_as(
        state.sdb(),
        "FOR r IN repositories FILTER r.visibility != \"private\" OR r.owner_key == @user SORT r.owner ASC, r.name ASC RETURN r",
        json!({ "user": ctx.user.key }),
    )
    .await?)
}

#[instrument(name = "repos.list", skip(state, ctx), fields(user = %ctx.user.key))]
async fn list_repos(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let repos = visible_repos(&state, &ctx).await?;
    Ok(page("Repositories", Section::Repos, &ctx, view::list(&repos, &[]), htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct RepoForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: String,
}

#[instrument(name = "repos.create", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_repo(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<RepoForm>,
) -> Result<Response, ApiError> {
    let name = form.name.trim();
    let mut problems = Vec::new();
    if let Err(err) = validate_repo_name(name) {
        problems.push(format!("Repository {err}"));
    }
    let visibility = form
        .visibility
        .trim()
        .parse::<Visibility>()
        .unwrap_or_else(|err| {
            problems.push(err);
            Visibility::default()
        });
    if !problems.is_empty() {
        let repos = visible_repos(&state, &ctx).await?;
        return Ok((
            StatusCode::BAD_REQUEST,
            page("Repositories", Section::Repos, &ctx, view::list(&repos, &problems), htmx),
        )
            .into_response());
    }

    let taken = query_count(
        state.sdb(),
        "RETURN LENGTH(FOR r IN repositories FILTER r.owner_key == @user AND r.name == @name RETURN 1)",
        json!({ "user": ctx.user.key, "name": name }),
    )
    .await?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!(
            "You already have a repository named {name}"
        )));
    }

    let repo: Repository = repositories(&state)
        .insert(json!({
            "owner": ctx.user.username,
            "owner_key": ctx.user.key,
            "name": name,
            "description": form.description.trim(),
            "visibility": visibility,
            "created_at": store::now(),
        }))
        .await?;
    info!(repo = %repo.key, name = %repo.name, "repository created");
    Ok(redirect(htmx, &repo.path()))
}

#[instrument(name = "repos.show", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_repo(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let repo = visible_repo(&state, &ctx, &owner, &name).await?;
    let open_issues = query_count(
        state.sdb(),
        "RETURN LENGTH(FOR i IN issues FILTER i.repo_key == @repo AND i.state == \"open\" RETURN 1)",
        json!({ "repo": repo.key }),
    )
    .await?;
    let clone_url = repo.clone_url(&state.config().public_url);
    let body = view::detail(&repo, &clone_url, open_issues, repo.owner_key == ctx.user.key);
    let title = format!("{}/{}", repo.owner, repo.name);
    Ok(page(&title, Section::Repos, &ctx, body, htmx).into_response())
}

#[instrument(name = "repos.update", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn update_repo(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((owner, name)): Path<(String, String)>,
    Form(form): Form<RepoForm>,
) -> Result<Response, ApiError> {
    let repo = owned_repo(&state, &ctx, &owner, &name).await?;
    let visibility = form
        .visibility
        .trim()
        .parse::<Visibility>()
        .map_err(ApiError::BadRequest)?;
    repositories(&state)
        .update::<Value>(
            &repo.key,
            json!({
                "description": form.description.trim(),
                "visibility": visibility,
                "updated_at": store::now(),
            }),
        )
        .await?;
    info!(repo = %repo.key, visibility = visibility.as_str(), "repository settings updated");
    Ok(redirect(htmx, &repo.path()))
}

#[instrument(name = "repos.delete", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_repo(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let repo = owned_repo(&state, &ctx, &owner, &name).await?;
    state
        .sdb()
        .sdbql(
            "FOR i IN issues FILTER i.repo_key == @repo REMOVE i IN issues",
            json!({ "repo": repo.key }),
        )
        .await?;
    repositories(&state).remove(&repo.key).await?;
    info!(repo = %repo.key, "repository deleted");
    Ok(redirect(htmx, "/repos"))
}

async fn render_issues(
    state: &AppState,
    repo: &Repository,
    form_errors: &[String],
) -> Result<String, ApiError> {
    let list: Vec<Issue> = query_as(
        state.sdb(),
        "FOR i IN issues FILTER i.repo_key == @repo SORT i.number DESC RETURN i",
        json!({ "repo": repo.key }),
    )
    .await?;
    Ok(view::issues(repo, &list, form_errors))
}

#[instrument(name = "repos.issues", skip(state, ctx), fields(user = %ctx.user.key))]
async fn list_issues(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let repo = visible_repo(&state, &ctx, &owner, &name).await?;
    let body = render_issues(&state, &repo, &[]).await?;
    Ok(page("Issues", Section::Repos, &ctx, body, htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[instrument(name = "repos.create_issue", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_issue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((owner, name)): Path<(String, String)>,
    Form(form): Form<IssueForm>,
) -> Result<Response, ApiError> {
    let repo = visible_repo(&state, &ctx, &owner, &name).await?;
    let title = form.title.trim();
    if title.is_empty() {
        let body = render_issues(&state, &repo, &["Title is required".to_string()]).await?;
        return Ok((
            StatusCode::BAD_REQUEST,
            page("Issues", Section::Repos, &ctx, body, htmx),
        )
            .into_response());
    }

    // Issues are never deleted on their own, so the count is the last number.
    let existing = query_count(
        state.sdb(),
        "RETURN LENGTH(FOR i IN issues FILTER i.repo_key == @repo RETURN 1)",
        json!({ "repo": repo.key }),
    )
    .await?;
    let issue: Issue = Collection::new(state.sdb(), ISSUES)
        .insert(json!({
            "repo_key": repo.key,
            "number": existing + 1,
            "title": title,
            "body": form.body.trim(),
            "state": IssueState::Open,
            "author": ctx.user.username,
            "created_at": store::now(),
        }))
        .await?;
    info!(repo = %repo.key, number = issue.number, "issue opened");
    Ok(redirect(htmx, &format!("{}/issues", repo.path())))
}

#[instrument(name = "repos.close_issue", skip(state, ctx), fields(user = %ctx.user.key))]
async fn close_issue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((owner, name, number)): Path<(String, String, u64)>,
) -> Result<Response, ApiError> {
    let repo = visible_repo(&state, &ctx, &owner, &name).await?;
    let closed: Option<Issue> = query_one(
        state.sdb(),
        "FOR i IN issues FILTER i.repo_key == @repo AND i.number == @number UPDATE i WITH { state: \"closed\", closed_at: @now } IN issues RETURN NEW",
        json!({ "repo": repo.key, "number": number, "now": store::now() }),
    )
    .await?;
    let issue = closed.ok_or_else(|| ApiError::not_found("Issue"))?;
    info!(repo = %repo.key, number = issue.number, "issue closed");
    Ok(redirect(htmx, &format!("{}/issues", repo.path())))
}
