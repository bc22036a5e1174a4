use std::fmt::Write as _;

use serde::Deserialize;
use services::services::kanban::{Column, FeatureProgress, Priority, Task, TaskStatus};
use utils::html::{escape, options};

use super::{errors, text_input, textarea};

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    #[serde(rename = "_key")]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(rename = "_key")]
    pub key: String,
    pub project_key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn status_options(selected: TaskStatus) -> String {
    options(
        TaskStatus::ALL.iter().map(|s| (s.as_str(), s.label())),
        Some(selected.as_str()),
    )
}

fn priority_options(selected: Priority) -> String {
    options(
        Priority::ALL.iter().map(|p| (p.as_str(), p.as_str())),
        Some(selected.as_str()),
    )
}

fn feature_options(features: &[Feature], selected: Option<&str>) -> String {
    let mut out = String::from(r#"<option value="">No feature</option>"#);
    out.push_str(&options(
        features.iter().map(|f| (f.key.as_str(), f.name.as_str())),
        selected,
    ));
    out
}

pub fn list(projects: &[Project], form_errors: &[String]) -> String {
    let rows: String = projects
        .iter()
        .map(|p| {
            format!(
                r#"<li><a href="/projects/{}">{}</a> <span class="muted">{}</span></li>"#,
                escape(&p.key),
                escape(&p.name),
                escape(&p.description)
            )
        })
        .collect();
    format!(
        r##"<section id="projects">
<h1>Projects</h1>
<ul>{rows}</ul>
<h2>New project</h2>
<form method="post" action="/projects" hx-post="/projects" hx-target="#projects" hx-swap="outerHTML">
{errors}
{name}
{description}
<button type="submit">Create</button>
</form>
</section>"##,
        errors = errors(form_errors),
        name = text_input("name", "Name", "", "text", true),
        description = textarea("description", "Description", ""),
    )
}

fn task_card(project: &Project, task: &Task, features: &[Feature]) -> String {
    let feature = task
        .feature_key
        .as_deref()
        .and_then(|key| features.iter().find(|f| f.key == key))
        .map(|f| format!(r#"<span class="tag">{}</span>"#, escape(&f.name)))
        .unwrap_or_default();
    let base = format!("/projects/{}/tasks/{}", escape(&project.key), escape(&task.key));
    format!(
        r##"<li class="task priority-{priority}" id="task-{key}">
<strong>{title}</strong> {feature}
<p>{description}</p>
<form class="inline" hx-post="{base}/move" hx-target="#board" hx-swap="outerHTML">
<select name="status">{statuses}</select>
<input type="number" name="position" min="0" value="{position}">
<button type="submit">Move</button>
</form>
<details><summary>Edit</summary>
<form hx-put="{base}" hx-target="#board" hx-swap="outerHTML">
{title_input}
{description_input}
<select name="priority">{priorities}</select>
<select name="feature_key">{features}</select>
<button type="submit">Save</button>
</form></details>
<button class="link" hx-delete="{base}" hx-target="#board" hx-swap="outerHTML" hx-confirm="Delete this task?">Delete</button>
</li>"##,
        priority = task.priority.as_str(),
        key = escape(&task.key),
        title = escape(&task.title),
        description = escape(&task.description),
        statuses = status_options(task.status),
        position = task.position,
        title_input = text_input("title", "Title", &task.title, "text", true),
        description_input = textarea("description", "Description", &task.description),
        priorities = priority_options(task.priority),
        features = feature_options(features, task.feature_key.as_deref()),
    )
}

pub fn board(
    project: &Project,
    columns: &[Column],
    features: &[Feature],
    form_errors: &[String],
) -> String {
    let mut lanes = String::new();
    for column in columns {
        let cards: String = column
            .tasks
            .iter()
            .map(|t| task_card(project, t, features))
            .collect();
        let _ = write!(
            lanes,
            r#"<div class="lane" data-status="{status}"><h2>{label} <span class="count">{count}</span></h2><ul>{cards}</ul></div>"#,
            status = column.status.as_str(),
            label = column.status.label(),
            count = column.tasks.len(),
        );
    }

    format!(
        r##"<section id="board">
<h1>{name}</h1>
<p>{description}</p>
<p><a href="/projects">All projects</a> · <a href="/projects/{key}/features">Features</a></p>
<div class="lanes">{lanes}</div>
<h2>New task</h2>
<form method="post" action="/projects/{key}/tasks" hx-post="/projects/{key}/tasks" hx-target="#board" hx-swap="outerHTML">
{errors}
{title}
{task_description}
<select name="status">{statuses}</select>
<select name="priority">{priorities}</select>
<select name="feature_key">{features}</select>
<button type="submit">Add task</button>
</form>
<button class="danger" hx-delete="/projects/{key}" hx-confirm="Delete this project and all its tasks?">Delete project</button>
</section>"##,
        name = escape(&project.name),
        description = escape(&project.description),
        key = escape(&project.key),
        errors = errors(form_errors),
        title = text_input("title", "Title", "", "text", true),
        task_description = textarea("description", "Description", ""),
        statuses = status_options(TaskStatus::default()),
        priorities = priority_options(Priority::default()),
        features = feature_options(features, None),
    )
}

pub fn features(project: &Project, rows: &[(Feature, FeatureProgress)], form_errors: &[String]) -> String {
    let items: String = rows
        .iter()
        .map(|(feature, progress)| {
            format!(
                r##"<li><strong>{name}</strong> {done}/{total} <progress max="100" value="{percent}">{percent}%</progress> {percent}%
<p>{description}</p>
<button class="link" hx-delete="/projects/{project}/features/{key}" hx-target="#features" hx-swap="outerHTML" hx-confirm="Delete this feature?">Delete</button></li>"##,
                name = escape(&feature.name),
                done = progress.done,
                total = progress.total,
                percent = progress.percent(),
                description = escape(&feature.description),
                project = escape(&project.key),
                key = escape(&feature.key),
            )
        })
        .collect();
    format!(
        r##"<section id="features">
<h1>{name}: features</h1>
<p><a href="/projects/{key}">Board</a></p>
<ul>{items}</ul>
<form method="post" action="/projects/{key}/features" hx-post="/projects/{key}/features" hx-target="#features" hx-swap="outerHTML">
{errors}
{feature_name}
{description}
<button type="submit">Add feature</button>
</form>
</section>"##,
        name = escape(&project.name),
        key = escape(&project.key),
        errors = errors(form_errors),
        feature_name = text_input("name", "Name", "", "text", true),
        description = textarea("description", "Description", ""),
    )
}
