use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utils::html::{escape, options};

use super::{errors, text_input, textarea, timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("Unknown visibility '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    #[serde(rename = "_key")]
    pub key: String,
    /// Owner's username, the first path segment.
    pub owner: String,
    pub owner_key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub created_at: String,
}

impl Repository {
    pub fn visible_to(&self, user_key: &str) -> bool {
        self.visibility == Visibility::Public || self.owner_key == user_key
    }

    pub fn path(&self) -> String {
        format!(
            "/repos/{}/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.name)
        )
    }

    pub fn clone_url(&self, public_url: &str) -> String {
        format!(
            "{}/git/{}/{}.git",
            public_url.trim_end_matches('/'),
            self.owner,
            self.name
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    #[serde(rename = "_key")]
    pub key: String,
    pub repo_key: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub state: IssueState,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_at: String,
}

fn visibility_options(selected: Visibility) -> String {
    options(
        [("public", "Public"), ("private", "Private")],
        Some(selected.as_str()),
    )
}

pub fn list(repos: &[Repository], form_errors: &[String]) -> String {
    let rows: String = repos
        .iter()
        .map(|r| {
            let lock = if r.visibility == Visibility::Private { " 🔒" } else { "" };
            format!(
                r#"<li><a href="{path}">{owner}/{name}</a>{lock} <span class="muted">{description}</span></li>"#,
                path = r.path(),
                owner = escape(&r.owner),
                name = escape(&r.name),
                description = escape(&r.description),
            )
        })
        .collect();
    format!(
        r##"<section id="repos">
<h1>Repositories</h1>
<ul>{rows}</ul>
<h2>New repository</h2>
<form method="post" action="/repos" hx-post="/repos" hx-target="#repos" hx-swap="outerHTML">
{errors}
{name}
{description}
<label>Visibility <select name="visibility">{visibility}</select></label>
<button type="submit">Create</button>
</form>
</section>"##,
        errors = errors(form_errors),
        name = text_input("name", "Name", "", "text", true),
        description = textarea("description", "Description", ""),
        visibility = visibility_options(Visibility::Public),
    )
}

pub fn detail(repo: &Repository, clone_url: &str, open_issues: u64, is_owner: bool) -> String {
    let settings = if is_owner {
        format!(
            r##"<details><summary>Settings</summary>
<form hx-put="{path}" hx-target="#repo" hx-swap="outerHTML">
{description}
<label>Visibility <select name="visibility">{visibility}</select></label>
<button type="submit">Save</button>
</form>
<button class="danger" hx-delete="{path}" hx-confirm="Delete {name} and all its issues?">Delete repository</button>
</details>"##,
            path = repo.path(),
            description = textarea("description", "Description", &repo.description),
            visibility = visibility_options(repo.visibility),
            name = escape(&repo.name),
        )
    } else {
        String::new()
    };
    format!(
        r#"<section id="repo">
<h1>{owner}/{name} <span class="badge">{visibility}</span></h1>
<p>{description}</p>
<label>Clone <input readonly value="{clone_url}" onclick="this.select()"></label>
<p><a href="{path}/issues">Issues ({open_issues} open)</a> · <a href="/repos">All repositories</a></p>
{settings}
</section>"#,
        owner = escape(&repo.owner),
        name = escape(&repo.name),
        visibility = repo.visibility.as_str(),
        description = escape(&repo.description),
        clone_url = escape(clone_url),
        path = repo.path(),
    )
}

pub fn issues(repo: &Repository, list: &[Issue], form_errors: &[String]) -> String {
    let path = repo.path();
    let rows: String = list
        .iter()
        .map(|issue| {
            let close = match issue.state {
                IssueState::Open => format!(
                    r#"<form method="post" action="{path}/issues/{n}/close" class="inline"><button type="submit" class="link">Close</button></form>"#,
                    n = issue.number
                ),
                IssueState::Closed => r#"<span class="badge">closed</span>"#.to_string(),
            };
            format!(
                r#"<li class="issue"><strong>#{n}</strong> {title} <span class="muted">by {author}, {at}</span> {close}<p>{body}</p></li>"#,
                n = issue.number,
                title = escape(&issue.title),
                author = escape(&issue.author),
                at = escape(&timestamp(&issue.created_at)),
                body = escape(&issue.body),
            )
        })
        .collect();
    format!(
        r##"<section id="issues">
<h1>{owner}/{name}: issues</h1>
<p><a href="{path}">Repository</a></p>
<ul>{rows}</ul>
<h2>New issue</h2>
<form method="post" action="{path}/issues" hx-post="{path}/issues" hx-target="#issues" hx-swap="outerHTML">
{errors}
{title}
{body}
<button type="submit">Open issue</button>
</form>
</section>"##,
        owner = escape(&repo.owner),
        name = escape(&repo.name),
        errors = errors(form_errors),
        title = text_input("title", "Title", "", "text", true),
        body = textarea("body", "Description", ""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(visibility: Visibility) -> Repository {
        Repository {
            key: "r1".into(),
            owner: "ann".into(),
            owner_key: "u1".into(),
            name: "solidb.rs".into(),
            description: String::new(),
            visibility,
            created_at: String::new(),
        }
    }

    #[test]
    fn clone_url_joins_the_public_url() {
        assert_eq!(
            repo(Visibility::Public).clone_url("https://code.example.com/"),
            "https://code.example.com/git/ann/solidb.rs.git"
        );
    }

    #[test]
    fn private_repositories_are_owner_only() {
        assert!(repo(Visibility::Public).visible_to("u2"));
        assert!(repo(Visibility::Private).visible_to("u1"));
        assert!(!repo(Visibility::Private).visible_to("u2"));
    }

    #[test]
    fn visibility_defaults_to_public() {
        assert_eq!("".parse::<Visibility>(), Ok(Visibility::Public));
        assert!("internal".parse::<Visibility>().is_err());
    }
}
