//! Screens generated from user-defined datatype schemas.

use std::fmt::Write as _;

use serde_json::{Map, Value};
use services::services::datatype::{Datatype, FieldDef, FieldError, FieldKind, display_value};
use utils::html::{escape, options};

use super::{errors, text_input};

const FIELDS_PLACEHOLDER: &str = r#"[{"name": "title", "label": "Title", "kind": "string", "required": true}]"#;

pub fn list(datatypes: &[Datatype], name: &str, fields_json: &str, form_errors: &[String]) -> String {
    let rows: String = datatypes
        .iter()
        .map(|dt| {
            format!(
                r#"<tr><td><a href="/datatypes/{key}">{name}</a></td><td><code>{collection}</code></td><td>{fields}</td></tr>"#,
                key = escape(&dt.key),
                name = escape(&dt.name),
                collection = escape(&dt.collection),
                fields = dt.fields.len(),
            )
        })
        .collect();
    let kinds = FieldKind::ALL
        .iter()
        .map(FieldKind::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r##"<section id="datatypes">
<h1>Datatypes</h1>
<table><thead><tr><th>Name</th><th>Collection</th><th>Fields</th></tr></thead><tbody>{rows}</tbody></table>
<h2>New datatype</h2>
<form method="post" action="/datatypes" hx-post="/datatypes" hx-target="#datatypes" hx-swap="outerHTML">
{errors}
{name_input}
<label>Fields (JSON)<textarea name="fields" rows="8" placeholder="{placeholder}">{fields_json}</textarea></label>
<p class="muted">Kinds: {kinds}</p>
<button type="submit">Create</button>
</form>
</section>"##,
        errors = errors(form_errors),
        name_input = text_input("name", "Name", name, "text", true),
        placeholder = escape(FIELDS_PLACEHOLDER),
        fields_json = escape(fields_json),
    )
}

pub fn detail(dt: &Datatype, records: &[Value]) -> String {
    let schema: String = dt
        .fields
        .iter()
        .map(|f| {
            format!(
                "<tr><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&f.name),
                escape(f.display_label()),
                f.kind,
                if f.required { "yes" } else { "" },
                escape(&f.options.join(", ")),
            )
        })
        .collect();

    let head: String = dt
        .fields
        .iter()
        .map(|f| format!("<th>{}</th>", escape(f.display_label())))
        .collect();
    let mut body = String::new();
    for record in records {
        let key = record.get("_key").and_then(Value::as_str).unwrap_or_default();
        body.push_str("<tr>");
        for field in &dt.fields {
            let _ = write!(body, "<td>{}</td>", escape(&display_value(record.get(&field.name))));
        }
        let _ = write!(
            body,
            r#"<td><a href="/datatypes/{dt}/records/{key}/edit">Edit</a> <button class="link" hx-delete="/datatypes/{dt}/records/{key}" hx-target="closest tr" hx-swap="outerHTML" hx-confirm="Delete this record?">Delete</button></td></tr>"#,
            dt = escape(&dt.key),
            key = escape(key),
        );
    }

    format!(
        r#"<section id="datatype">
<h1>{name}</h1>
<p><a href="/datatypes">All datatypes</a> · <a href="/datatypes/{key}/records/new" class="button">New record</a></p>
<details><summary>Schema (<code>{collection}</code>)</summary>
<table><thead><tr><th>Field</th><th>Label</th><th>Kind</th><th>Required</th><th>Options</th></tr></thead><tbody>{schema}</tbody></table>
<button class="danger" hx-delete="/datatypes/{key}" hx-confirm="Delete {name} and all its records?">Delete datatype</button>
</details>
<table><thead><tr>{head}<th></th></tr></thead><tbody>{body}</tbody></table>
</section>"#,
        name = escape(&dt.name),
        key = escape(&dt.key),
        collection = escape(&dt.collection),
    )
}

/// Form values for an existing record, as the generated inputs expect them.
pub fn record_values(dt: &Datatype, record: &Map<String, Value>) -> Vec<(String, String)> {
    dt.fields
        .iter()
        .filter_map(|f| {
            let value = match (f.kind, record.get(&f.name)) {
                (FieldKind::Boolean, Some(Value::Bool(true))) => "true".to_string(),
                (FieldKind::Boolean, _) => return None,
                (_, None | Some(Value::Null)) => String::new(),
                (_, Some(Value::String(s))) => s.clone(),
                (_, Some(other)) => other.to_string(),
            };
            Some((f.name.clone(), value))
        })
        .collect()
}

fn input(field: &FieldDef, value: &str) -> String {
    let name = escape(&field.name);
    let required = if field.required { " required" } else { "" };
    let value_attr = escape(value);
    match field.kind {
        FieldKind::Text => format!(
            r#"<textarea name="{name}" rows="4"{required}>{value_attr}</textarea>"#
        ),
        FieldKind::Boolean => {
            let checked = if value.is_empty() { "" } else { " checked" };
            format!(r#"<input type="checkbox" name="{name}" value="true"{checked}>"#)
        }
        FieldKind::Select => {
            let mut choices = String::new();
            if !field.required {
                choices.push_str(r#"<option value=""></option>"#);
            }
            choices.push_str(&options(
                field.options.iter().map(|o| (o.as_str(), o.as_str())),
                Some(value),
            ));
            format!(r#"<select name="{name}"{required}>{choices}</select>"#)
        }
        kind => {
            let (kind, extra) = match kind {
                FieldKind::Number => ("number", r#" step="any""#),
                FieldKind::Integer => ("number", r#" step="1""#),
                FieldKind::Date => ("date", ""),
                FieldKind::Email => ("email", ""),
                _ => ("text", ""),
            };
            format!(r#"<input type="{kind}" name="{name}" value="{value_attr}"{extra}{required}>"#)
        }
    }
}

/// Form generated from the schema; `record` is set when editing.
pub fn record_form(
    dt: &Datatype,
    record: Option<&str>,
    values: &[(String, String)],
    field_errors: &[FieldError],
) -> String {
    let mut fields = String::new();
    for field in &dt.fields {
        let value = values
            .iter()
            .find(|(k, _)| *k == field.name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default();
        let problem = field_errors
            .iter()
            .find(|e| e.field == field.name)
            .map(|e| format!(r#"<small class="field-error">{}</small>"#, escape(&e.message)))
            .unwrap_or_default();
        let _ = write!(
            fields,
            r#"<div class="field"><label>{label}{input}</label>{problem}</div>"#,
            label = escape(field.display_label()),
            input = input(field, value),
        );
    }

    let base = format!("/datatypes/{}/records", escape(&dt.key));
    let attrs = match record {
        Some(key) => format!(
            r##"hx-put="{base}/{key}" hx-target="#record-form" hx-swap="outerHTML""##,
            key = escape(key)
        ),
        None => format!(
            r##"method="post" action="{base}" hx-post="{base}" hx-target="#record-form" hx-swap="outerHTML""##
        ),
    };
    let summary: Vec<String> = if field_errors.is_empty() {
        Vec::new()
    } else {
        vec![format!("{} field(s) need attention", field_errors.len())]
    };
    format!(
        r#"<section id="record-form">
<h1>{name}: {action} record</h1>
{errors}
<form {attrs}>
{fields}
<button type="submit">Save</button>
</form>
<p><a href="/datatypes/{key}">Back</a></p>
</section>"#,
        name = escape(&dt.name),
        action = if record.is_some() { "edit" } else { "new" },
        errors = errors(&summary),
        key = escape(&dt.key),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn book() -> Datatype {
        Datatype::define(
            "Books",
            r#"[
                {"name": "title", "kind": "string", "required": true},
                {"name": "read", "kind": "boolean"},
                {"name": "pages", "kind": "integer"},
                {"name": "genre", "kind": "select", "options": ["novel", "essay"]}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn stored_records_become_form_values() {
        let record = json!({ "title": "Dune", "read": true, "pages": 412, "genre": null });
        let values = record_values(&book(), record.as_object().unwrap());
        assert_eq!(
            values,
            vec![
                ("title".to_string(), "Dune".to_string()),
                ("read".to_string(), "true".to_string()),
                ("pages".to_string(), "412".to_string()),
                ("genre".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn inputs_follow_field_kinds() {
        let html = record_form(&book(), None, &[], &[]);
        assert!(html.contains(r#"<input type="text" name="title" value="" required>"#));
        assert!(html.contains(r#"<input type="checkbox" name="read" value="true">"#));
        assert!(html.contains(r#"<input type="number" name="pages" value="" step="1">"#));
        assert!(html.contains(r#"<option value=""></option>"#));
    }

    #[test]
    fn field_errors_sit_next_to_their_input() {
        let errors = vec![FieldError {
            field: "pages".into(),
            message: "pages must be a whole number".into(),
        }];
        let html = record_form(&book(), Some("r1"), &[("pages".into(), "many".into())], &errors);
        assert!(html.contains("pages must be a whole number"));
        assert!(html.contains(r#"value="many""#));
        assert!(html.contains("hx-put="));
    }
}
