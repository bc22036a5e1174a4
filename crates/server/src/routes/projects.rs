use axum::{
    Extension, Form, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::{
    kanban::{self, FeatureProgress, Priority, Task, TaskStatus},
    sdb::query_as,
};
use tracing::{info, instrument};
use utils::htmx::{HxResponse, ToastKind, redirect};

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, FEATURES, PROJECTS, TASKS},
    views::{
        Section,
        projects::{self as view, Feature, Project},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{key}", get(show_board).delete(delete_project))
        .route("/projects/{key}/tasks", post(create_task))
        .route(
            "/projects/{key}/tasks/{task}",
            put(update_task).delete(delete_task),
        )
        .route("/projects/{key}/tasks/{task}/move", post(move_task))
        .route(
            "/projects/{key}/features",
            get(list_features).post(create_feature),
        )
        .route(
            "/projects/{key}/features/{feature}",
            delete(delete_feature),
        )
}

async fn load_project(state: &AppState, key: &str) -> Result<Project, ApiError> {
    Collection::new(state.sdb(), PROJECTS)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))
}

async fn project_tasks(state: &AppState, project: &Project) -> Result<Vec<Task>, ApiError> {
    Ok(query_as(
        state.sdb(),
        "FOR t IN tasks FILTER t.project_key == @project RETURN t",
        json!({ "project": project.key }),
    )
    .await?)
}

async fn project_features(state: &AppState, project: &Project) -> Result<Vec<Feature>, ApiError> {
    Ok(query_as(
        state.sdb(),
        "FOR f IN features FILTER f.project_key == @project SORT f.name ASC RETURN f",
        json!({ "project": project.key }),
    )
    .await?)
}

async fn load_task(state: &AppState, project: &Project, key: &str) -> Result<Task, ApiError> {
    let task: Task = Collection::new(state.sdb(), TASKS)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;
    if task.project_key != project.key {
        return Err(ApiError::not_found("Task"));
    }
    Ok(task)
}

async fn render_board(
    state: &AppState,
    project: &Project,
    form_errors: &[String],
) -> Result<String, ApiError> {
    let tasks = project_tasks(state, project).await?;
    let features = project_features(state, project).await?;
    Ok(view::board(project, &kanban::board(tasks), &features, form_errors))
}

/// Board fragment for htmx, a redirect back to the board otherwise.
async fn board_response(
    state: &AppState,
    project: &Project,
    htmx: bool,
    toast: &str,
) -> Result<Response, ApiError> {
    if !htmx {
        return Ok(redirect(false, &format!("/projects/{}", project.key)));
    }
    let body = render_board(state, project, &[]).await?;
    Ok(HxResponse::fragment(body)
        .toast(toast, ToastKind::Success)
        .into_response())
}

fn blank_to_none(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[instrument(name = "projects.list", skip(state, ctx), fields(user = %ctx.user.key))]
async fn list_projects(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let projects: Vec<Project> = Collection::new(state.sdb(), PROJECTS).all("name").await?;
    Ok(page("Projects", Section::Projects, &ctx, view::list(&projects, &[]), htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[instrument(name = "projects.create", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<ProjectForm>,
) -> Result<Response, ApiError> {
    let name = form.name.trim();
    if name.is_empty() {
        let projects: Vec<Project> = Collection::new(state.sdb(), PROJECTS).all("name").await?;
        let body = view::list(&projects, &["Name is required".to_string()]);
        return Ok((
            StatusCode::BAD_REQUEST,
            page("Projects", Section::Projects, &ctx, body, htmx),
        )
            .into_response());
    }

    let project: Project = Collection::new(state.sdb(), PROJECTS)
        .insert(json!({
            "name": name,
            "description": form.description.trim(),
            "owner": ctx.user.key,
            "created_at": store::now(),
        }))
        .await?;
    info!(project = %project.key, "project created");
    Ok(redirect(htmx, &format!("/projects/{}", project.key)))
}

#[instrument(name = "projects.board", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_board(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    let body = render_board(&state, &project, &[]).await?;
    Ok(page(&project.name, Section::Projects, &ctx, body, htmx).into_response())
}

#[instrument(name = "projects.delete", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    if project.owner != ctx.user.key {
        return Err(ApiError::Forbidden(
            "Only the project owner can delete it".to_string(),
        ));
    }

    let bind = json!({ "project": project.key });
    state
        .sdb()
        .sdbql(
            "FOR t IN tasks FILTER t.project_key == @project REMOVE t IN tasks",
            bind.clone(),
        )
        .await?;
    state
        .sdb()
        .sdbql(
            "FOR f IN features FILTER f.project_key == @project REMOVE f IN features",
            bind,
        )
        .await?;
    Collection::new(state.sdb(), PROJECTS)
        .remove(&project.key)
        .await?;
    info!(project = %project.key, "project deleted");
    Ok(redirect(htmx, "/projects"))
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub feature_key: String,
}

/// Validated task fields; blank status and priority take their defaults.
#[derive(Debug, PartialEq)]
pub struct TaskInput {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub feature_key: Option<String>,
}

impl TaskForm {
    pub fn validate(&self) -> Result<TaskInput, ApiError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("Title is required".to_string()));
        }
        let status = match self.status.trim() {
            "" => TaskStatus::default(),
            raw => raw.parse()?,
        };
        let priority = match self.priority.trim() {
            "" => Priority::default(),
            raw => raw.parse()?,
        };
        Ok(TaskInput {
            title: title.to_string(),
            description: self.description.trim().to_string(),
            status,
            priority,
            feature_key: blank_to_none(&self.feature_key),
        })
    }
}

async fn ensure_feature(
    state: &AppState,
    project: &Project,
    feature_key: Option<&str>,
) -> Result<(), ApiError> {
    let Some(feature_key) = feature_key else {
        return Ok(());
    };
    let feature: Option<Feature> = Collection::new(state.sdb(), FEATURES).get(feature_key).await?;
    match feature {
        Some(f) if f.project_key == project.key => Ok(()),
        _ => Err(ApiError::BadRequest("Unknown feature".to_string())),
    }
}

#[instrument(name = "projects.create_task", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(form): Form<TaskForm>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    let input = match form.validate() {
        Ok(input) => input,
        Err(err) => {
            let body = render_board(&state, &project, &[err.public_message()]).await?;
            return Ok((
                StatusCode::BAD_REQUEST,
                page(&project.name, Section::Projects, &ctx, body, htmx),
            )
                .into_response());
        }
    };
    ensure_feature(&state, &project, input.feature_key.as_deref()).await?;

    let tasks = project_tasks(&state, &project).await?;
    let column: Vec<Task> = tasks
        .into_iter()
        .filter(|t| t.status == input.status)
        .collect();
    let task: Task = Collection::new(state.sdb(), TASKS)
        .insert(json!({
            "project_key": project.key,
            "title": input.title,
            "description": input.description,
            "status": input.status,
            "priority": input.priority,
            "position": kanban::next_position(&column),
            "feature_key": input.feature_key,
            "created_by": ctx.user.key,
            "created_at": store::now(),
        }))
        .await?;
    info!(task = %task.key, "task created");

    board_response(&state, &project, htmx, "Task added").await
}

#[instrument(name = "projects.update_task", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((key, task_key)): Path<(String, String)>,
    Form(form): Form<TaskForm>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    let task = load_task(&state, &project, &task_key).await?;
    let input = form.validate()?;
    ensure_feature(&state, &project, input.feature_key.as_deref()).await?;

    let mut patch = json!({
        "title": input.title,
        "description": input.description,
        "priority": input.priority,
        "feature_key": input.feature_key,
        "updated_at": store::now(),
    });
    // Status only changes through an explicit move.
    if !form.status.trim().is_empty() && input.status != task.status {
        let column: Vec<Task> = project_tasks(&state, &project)
            .await?
            .into_iter()
            .filter(|t| t.status == input.status)
            .collect();
        patch["status"] = json!(input.status);
        patch["position"] = json!(kanban::next_position(&column));
    }

    Collection::new(state.sdb(), TASKS)
        .update::<Value>(&task.key, patch)
        .await?;
    info!(task = %task.key, "task updated");
    board_response(&state, &project, htmx, "Task saved").await
}

#[derive(Debug, Default, Deserialize)]
pub struct MoveForm {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub position: Option<String>,
}

#[instrument(name = "projects.move_task", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn move_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((key, task_key)): Path<(String, String)>,
    Form(form): Form<MoveForm>,
) -> Result<Response, ApiError> {
    let target: TaskStatus = form.status.parse()?;
    let index = match form.position.as_deref().map(str::trim) {
        None | Some("") => usize::MAX,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid position: {raw}")))?,
    };

    let project = load_project(&state, &key).await?;
    let task = load_task(&state, &project, &task_key).await?;

    let columns = kanban::board(project_tasks(&state, &project).await?);
    let column = columns
        .iter()
        .find(|c| c.status == target)
        .map(|c| c.tasks.as_slice())
        .unwrap_or_default();

    let tasks = Collection::new(state.sdb(), TASKS);
    for (moved_key, position) in kanban::reorder(column, &task.key, index) {
        let unchanged = column
            .iter()
            .any(|t| t.key == moved_key && t.position == position);
        if unchanged {
            continue;
        }
        tasks
            .update::<Value>(&moved_key, json!({ "status": target, "position": position }))
            .await?;
    }
    info!(task = %task.key, status = %target, "task moved");
    board_response(&state, &project, htmx, "Task moved").await
}

#[instrument(name = "projects.delete_task", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((key, task_key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    let task = load_task(&state, &project, &task_key).await?;
    Collection::new(state.sdb(), TASKS).remove(&task.key).await?;
    info!(task = %task.key, "task deleted");
    board_response(&state, &project, htmx, "Task deleted").await
}

async fn render_features(
    state: &AppState,
    project: &Project,
    form_errors: &[String],
) -> Result<String, ApiError> {
    let features = project_features(state, project).await?;
    let tasks = project_tasks(state, project).await?;
    let rows: Vec<(Feature, FeatureProgress)> = features
        .into_iter()
        .map(|feature| {
            let progress = FeatureProgress::from_tasks(
                tasks
                    .iter()
                    .filter(|t| t.feature_key.as_deref() == Some(feature.key.as_str())),
            );
            (feature, progress)
        })
        .collect();
    Ok(view::features(project, &rows, form_errors))
}

#[instrument(name = "projects.features", skip(state, ctx), fields(user = %ctx.user.key))]
async fn list_features(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    let body = render_features(&state, &project, &[]).await?;
    Ok(page(&project.name, Section::Projects, &ctx, body, htmx).into_response())
}

#[instrument(name = "projects.create_feature", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_feature(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(form): Form<ProjectForm>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    let name = form.name.trim();
    if name.is_empty() {
        let body = render_features(&state, &project, &["Name is required".to_string()]).await?;
        return Ok((
            StatusCode::BAD_REQUEST,
            page(&project.name, Section::Projects, &ctx, body, htmx),
        )
            .into_response());
    }

    let feature: Feature = Collection::new(state.sdb(), FEATURES)
        .insert(json!({
            "project_key": project.key,
            "name": name,
            "description": form.description.trim(),
            "created_at": store::now(),
        }))
        .await?;
    info!(feature = %feature.key, "feature created");

    let target = format!("/projects/{}/features", project.key);
    if !htmx {
        return Ok(redirect(false, &target));
    }
    let body = render_features(&state, &project, &[]).await?;
    Ok(HxResponse::fragment(body)
        .toast("Feature added", ToastKind::Success)
        .into_response())
}

#[instrument(name = "projects.delete_feature", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_feature(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path((key, feature_key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let project = load_project(&state, &key).await?;
    let features = Collection::new(state.sdb(), FEATURES);
    let feature: Feature = features
        .get(&feature_key)
        .await?
        .filter(|f: &Feature| f.project_key == project.key)
        .ok_or_else(|| ApiError::not_found("Feature"))?;

    state
        .sdb()
        .sdbql(
            "FOR t IN tasks FILTER t.feature_key == @feature UPDATE t WITH { feature_key: null } IN tasks",
            json!({ "feature": feature.key }),
        )
        .await?;
    features.remove(&feature.key).await?;
    info!(feature = %feature.key, "feature deleted");

    if !htmx {
        return Ok(redirect(false, &format!("/projects/{}/features", project.key)));
    }
    let body = render_features(&state, &project, &[]).await?;
    Ok(HxResponse::fragment(body)
        .toast("Feature deleted", ToastKind::Success)
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str, status: &str, priority: &str) -> TaskForm {
        TaskForm {
            title: title.into(),
            status: status.into(),
            priority: priority.into(),
            ..Default::default()
        }
    }

    #[test]
    fn task_defaults() {
        let input = form("Ship it", "", "").validate().unwrap();
        assert_eq!(input.status, TaskStatus::Todo);
        assert_eq!(input.priority, Priority::Medium);
        assert_eq!(input.feature_key, None);
    }

    #[test]
    fn task_validation() {
        assert!(matches!(form("  ", "", "").validate(), Err(ApiError::BadRequest(_))));
        assert!(matches!(form("x", "later", "").validate(), Err(ApiError::BadRequest(_))));
        assert!(matches!(form("x", "", "critical").validate(), Err(ApiError::BadRequest(_))));
        assert_eq!(form("x", "review", "urgent").validate().unwrap().status, TaskStatus::Review);
    }
}
