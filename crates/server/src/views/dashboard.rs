//! Database administration screens.

use std::fmt::Write as _;

use serde_json::Value;
use utils::html::{escape, options};

use super::{errors, text_input};

pub const COLLECTION_TYPES: [(&str, &str); 3] =
    [("document", "Document"), ("edge", "Edge"), ("blob", "Blob")];

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

pub fn login_form(username: &str, error: Option<&str>) -> String {
    let messages: Vec<String> = error.map(str::to_string).into_iter().collect();
    format!(
        r##"<section id="dashboard-login" class="card narrow">
<h1>SoliDB dashboard</h1>
{errors}
<form method="post" action="/dashboard/login" hx-post="/dashboard/login" hx-target="#dashboard-login" hx-swap="outerHTML">
{username}
{password}
<button type="submit">Connect</button>
</form>
</section>"##,
        errors = errors(&messages),
        username = text_input("username", "Username", username, "text", true),
        password = text_input("password", "Password", "", "password", true),
    )
}

pub fn databases(names: &[String]) -> String {
    let rows: String = names
        .iter()
        .map(|name| {
            format!(
                r#"<tr><td><a href="/dashboard/{href}/collections">{name}</a></td><td><button hx-delete="/dashboard/databases/{href}" hx-confirm="Delete database {name}?" hx-target="closest tr" hx-swap="outerHTML">Delete</button></td></tr>"#,
                href = enc(name),
                name = escape(name),
            )
        })
        .collect();
    format!(
        r##"<section id="databases">
<h1>Databases</h1>
<form class="inline" method="post" action="/dashboard/databases" hx-post="/dashboard/databases" hx-target="#databases" hx-swap="outerHTML">
<input name="name" placeholder="New database" required><button type="submit">Create</button>
</form>
<table><thead><tr><th>Name</th><th></th></tr></thead><tbody>{rows}</tbody></table>
<form method="post" action="/dashboard/logout"><button type="submit">Disconnect</button></form>
</section>"##
    )
}

/// Collection row as listed by SoliDB.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

pub fn collections(db: &str, list: &[CollectionSummary]) -> String {
    let db_href = enc(db);
    let rows: String = list
        .iter()
        .map(|c| {
            let href = enc(&c.name);
            format!(
                r#"<tr><td><a href="/dashboard/{db_href}/collections/{href}/documents">{name}</a></td><td>{kind}</td><td>{count}</td><td>
<button hx-post="/dashboard/{db_href}/collections/{href}/truncate" hx-confirm="Remove every document from {name}?">Truncate</button>
<button hx-delete="/dashboard/{db_href}/collections/{href}" hx-confirm="Delete collection {name}?" hx-target="closest tr" hx-swap="outerHTML">Delete</button>
</td></tr>"#,
                name = escape(&c.name),
                kind = escape(&c.kind),
                count = c.count,
            )
        })
        .collect();
    format!(
        r##"<section id="collections">
<h1>{db}</h1>
<p><a href="/dashboard">Databases</a> · <a href="/dashboard/{db_href}/query">Query</a></p>
<form class="inline" method="post" action="/dashboard/{db_href}/collections" hx-post="/dashboard/{db_href}/collections" hx-target="#collections" hx-swap="outerHTML">
<input name="name" placeholder="New collection" required>
<select name="type">{types}</select>
<button type="submit">Create</button>
</form>
<table><thead><tr><th>Name</th><th>Type</th><th>Documents</th><th></th></tr></thead><tbody>{rows}</tbody></table>
</section>"##,
        db = escape(db),
        types = options(COLLECTION_TYPES, Some("document")),
    )
}

pub struct DocumentPage<'a> {
    pub db: &'a str,
    pub collection: &'a str,
    pub documents: &'a [Value],
    pub page: u64,
    pub per_page: u64,
    pub has_next: bool,
}

pub fn documents(view: &DocumentPage<'_>) -> String {
    let db = enc(view.db);
    let coll = enc(view.collection);
    let mut rows = String::new();
    for doc in view.documents {
        let key = doc.get("_key").and_then(Value::as_str).unwrap_or_default();
        let _ = write!(
            rows,
            r#"<tr><td><a href="/dashboard/{db}/documents/{coll}/{href}">{key}</a></td><td><code>{preview}</code></td></tr>"#,
            href = enc(key),
            key = escape(key),
            preview = escape(&preview(doc)),
        );
    }

    let mut pager = String::new();
    if view.page > 1 {
        let _ = write!(
            pager,
            r#"<a href="?page={}&per_page={}">Previous</a> "#,
            view.page - 1,
            view.per_page
        );
    }
    let _ = write!(pager, "<span>Page {}</span>", view.page);
    if view.has_next {
        let _ = write!(
            pager,
            r#" <a href="?page={}&per_page={}">Next</a>"#,
            view.page + 1,
            view.per_page
        );
    }

    format!(
        r##"<section id="documents">
<h1>{name}</h1>
<p><a href="/dashboard/{db}/collections">Collections</a></p>
<details><summary>New document</summary>
<form method="post" action="/dashboard/{db}/documents/{coll}" hx-post="/dashboard/{db}/documents/{coll}" hx-target="#documents" hx-swap="outerHTML">
<textarea name="document" rows="6">{{}}</textarea>
<button type="submit">Insert</button>
</form></details>
<table><thead><tr><th>_key</th><th>Document</th></tr></thead><tbody>{rows}</tbody></table>
<nav class="pager">{pager}</nav>
</section>"##,
        name = escape(view.collection),
    )
}

fn preview(doc: &Value) -> String {
    let text = doc.to_string();
    if text.chars().count() > 120 {
        let cut: String = text.chars().take(117).collect();
        format!("{cut}...")
    } else {
        text
    }
}

pub fn document(db: &str, collection: &str, key: &str, doc: &Value, error: Option<&str>) -> String {
    let pretty = serde_json::to_string_pretty(doc).unwrap_or_else(|_| doc.to_string());
    let messages: Vec<String> = error.map(str::to_string).into_iter().collect();
    let base = format!("/dashboard/{}/documents/{}/{}", enc(db), enc(collection), enc(key));
    format!(
        r##"<section id="document">
<h1>{collection} / {key}</h1>
{errors}
<form hx-put="{base}" hx-target="#document" hx-swap="outerHTML">
<textarea name="document" rows="16">{pretty}</textarea>
<button type="submit">Save</button>
</form>
<button hx-delete="{base}" hx-confirm="Delete this document?">Delete</button>
<p><a href="/dashboard/{db_href}/collections/{coll_href}/documents">Back</a></p>
</section>"##,
        collection = escape(collection),
        key = escape(key),
        errors = errors(&messages),
        pretty = escape(&pretty),
        db_href = enc(db),
        coll_href = enc(collection),
    )
}

/// Result of a query run from the dashboard console.
pub enum QueryOutcome<'a> {
    Rows(&'a [Value]),
    Failed(&'a str),
}

pub fn query_console(db: &str, query: &str, bind_vars: &str, outcome: Option<QueryOutcome<'_>>) -> String {
    let db_href = enc(db);
    let result = outcome.map(query_result).unwrap_or_default();
    format!(
        r##"<section id="query">
<h1>Query {db}</h1>
<p><a href="/dashboard/{db_href}/collections">Collections</a></p>
<form method="post" action="/dashboard/{db_href}/query" hx-post="/dashboard/{db_href}/query" hx-target="#query-result" hx-swap="innerHTML">
<label>SDBQL<textarea name="query" rows="6" required>{query}</textarea></label>
<label>Bind variables (JSON)<textarea name="bind_vars" rows="3">{bind_vars}</textarea></label>
<button type="submit">Run</button>
</form>
<div id="query-result">{result}</div>
</section>"##,
        db = escape(db),
        query = escape(query),
        bind_vars = escape(bind_vars),
    )
}

pub fn query_result(outcome: QueryOutcome<'_>) -> String {
    let rows = match outcome {
        QueryOutcome::Failed(message) => {
            return format!(r#"<p class="query-error" role="alert">{}</p>"#, escape(message));
        }
        QueryOutcome::Rows(rows) => rows,
    };
    if rows.is_empty() {
        return "<p>No results.</p>".to_string();
    }

    let columns = result_columns(rows);
    let head: String = columns
        .iter()
        .map(|c| format!("<th>{}</th>", escape(c)))
        .collect();
    let mut body = String::new();
    for row in rows {
        body.push_str("<tr>");
        match row {
            Value::Object(map) => {
                for column in &columns {
                    let cell = map.get(column).map(cell_text).unwrap_or_default();
                    let _ = write!(body, "<td>{}</td>", escape(&cell));
                }
            }
            other => {
                let _ = write!(body, "<td>{}</td>", escape(&cell_text(other)));
            }
        }
        body.push_str("</tr>");
    }
    format!(
        r#"<p>{count} row(s)</p><table><thead><tr>{head}</tr></thead><tbody>{body}</tbody></table>"#,
        count = rows.len()
    )
}

/// Union of object keys in first-seen order, or a single `value` column for
/// scalar results.
pub fn result_columns(rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    if columns.is_empty() {
        columns.push("value".to_string());
    }
    columns
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn columns_union_in_first_seen_order() {
        let rows = vec![json!({"b": 1, "a": 2}), json!({"a": 3, "c": 4})];
        assert_eq!(result_columns(&rows), vec!["b", "a", "c"]);
        assert_eq!(result_columns(&[json!(1), json!(2)]), vec!["value"]);
    }

    #[test]
    fn query_errors_are_escaped() {
        let html = query_result(QueryOutcome::Failed("unexpected <EOF>"));
        assert!(html.contains("unexpected &lt;EOF&gt;"));
    }

    #[test]
    fn document_links_encode_segments() {
        let html = databases(&["my db".to_string()]);
        assert!(html.contains("/dashboard/my%20db/collections"));
    }
}
