//! User-defined datatypes: a schema of typed fields stored as a SoliDB
//! document, with records living in their own `dt_<slug>` collection.

use std::{collections::HashSet, fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::slug::slugify;

pub const COLLECTION_PREFIX: &str = "dt_";

#[derive(Debug, Error, PartialEq)]
pub enum DatatypeError {
    #[error("datatype name is required")]
    MissingName,
    #[error("a datatype needs at least one field")]
    NoFields,
    #[error("invalid field definitions: {0}")]
    InvalidFields(String),
    #[error("field name '{0}' must start with a letter and contain only letters, digits and underscores")]
    InvalidFieldName(String),
    #[error("duplicate field name '{0}'")]
    DuplicateField(String),
    #[error("unknown field kind '{0}'")]
    UnknownKind(String),
    #[error("select field '{0}' needs at least one option")]
    MissingOptions(String),
    #[error("record is invalid")]
    Invalid(Vec<FieldError>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    String,
    Text,
    Number,
    Integer,
    Boolean,
    Date,
    Select,
    Email,
}

impl FieldKind {
    pub const ALL: [FieldKind; 8] = [
        FieldKind::String,
        FieldKind::Text,
        FieldKind::Number,
        FieldKind::Integer,
        FieldKind::Boolean,
        FieldKind::Date,
        FieldKind::Select,
        FieldKind::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Select => "select",
            FieldKind::Email => "email",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = DatatypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DatatypeError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

impl FieldDef {
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datatype {
    #[serde(rename = "_key", default)]
    pub key: String,
    pub name: String,
    pub collection: String,
    pub fields: Vec<FieldDef>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Datatype {
    /// Build a datatype from the creation form: a display name and the field
    /// list as JSON.
    pub fn define(name: &str, fields_json: &str) -> Result<Self, DatatypeError> {
        let name = name.trim();
        let slug = slugify(name).replace('-', "_");
        if name.is_empty() || slug.is_empty() {
            return Err(DatatypeError::MissingName);
        }

        let fields: Vec<FieldDef> = serde_json::from_str(fields_json)
            .map_err(|e| DatatypeError::InvalidFields(e.to_string()))?;
        Self::validate_fields(&fields)?;

        Ok(Self {
            key: String::new(),
            name: name.to_string(),
            collection: format!("{COLLECTION_PREFIX}{slug}"),
            fields,
        })
    }

    fn validate_fields(fields: &[FieldDef]) -> Result<(), DatatypeError> {
        if fields.is_empty() {
            return Err(DatatypeError::NoFields);
        }
        let mut seen = HashSet::new();
        for field in fields {
            if !is_identifier(&field.name) {
                return Err(DatatypeError::InvalidFieldName(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DatatypeError::DuplicateField(field.name.clone()));
            }
            if field.kind == FieldKind::Select && field.options.is_empty() {
                return Err(DatatypeError::MissingOptions(field.name.clone()));
            }
        }
        Ok(())
    }

    /// Coerce submitted form values into a record document.
    ///
    /// Every field is checked and all errors come back together.
    pub fn parse_record(&self, form: &[(String, String)]) -> Result<Map<String, Value>, DatatypeError> {
        let lookup = |name: &str| {
            form.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.trim())
        };

        let mut record = Map::new();
        let mut errors = Vec::new();

        for field in &self.fields {
            let raw = lookup(&field.name);

            if field.kind == FieldKind::Boolean {
                let checked = matches!(raw, Some(v) if !v.is_empty() && v != "false" && v != "0");
                record.insert(field.name.clone(), Value::Bool(checked));
                continue;
            }

            let Some(raw) = raw.filter(|v| !v.is_empty()) else {
                if field.required {
                    errors.push(FieldError {
                        field: field.name.clone(),
                        message: format!("{} is required", field.display_label()),
                    });
                } else {
                    record.insert(field.name.clone(), Value::Null);
                }
                continue;
            };

            match coerce(field, raw) {
                Ok(value) => {
                    record.insert(field.name.clone(), value);
                }
                Err(message) => errors.push(FieldError {
                    field: field.name.clone(),
                    message,
                }),
            }
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(DatatypeError::Invalid(errors))
        }
    }
}

fn coerce(field: &FieldDef, raw: &str) -> Result<Value, String> {
    let label = field.display_label();
    match field.kind {
        FieldKind::String | FieldKind::Text => Ok(Value::String(raw.to_string())),
        FieldKind::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("{label} must be a number")),
        FieldKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("{label} must be a whole number")),
        FieldKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| format!("{label} must be a date (YYYY-MM-DD)")),
        FieldKind::Select => {
            if field.options.iter().any(|o| o == raw) {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(format!("{label} must be one of: {}", field.options.join(", ")))
            }
        }
        FieldKind::Email => {
            if raw.contains('@') {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(format!("{label} must be an email address"))
            }
        }
        FieldKind::Boolean => Ok(Value::Bool(true)),
    }
}

/// Plain-text rendering of a stored value for tables.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(true)) => "yes".to_string(),
        Some(Value::Bool(false)) => "no".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &str = r#"[
        {"name": "title", "label": "Title", "kind": "string", "required": true},
        {"name": "pages", "kind": "integer"},
        {"name": "rating", "kind": "number"},
        {"name": "read", "kind": "boolean"},
        {"name": "published", "kind": "date"},
        {"name": "genre", "kind": "select", "options": ["novel", "essay"], "required": true},
        {"name": "contact", "kind": "email"}
    ]"#;

    fn form(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn define_derives_collection_name() {
        let dt = Datatype::define("Reading List", FIELDS).unwrap();
        assert_eq!(dt.collection, "dt_reading_list");
        assert_eq!(dt.fields.len(), 7);
        assert_eq!(dt.fields[1].kind, FieldKind::Integer);
    }

    #[test]
    fn define_rejects_bad_fields() {
        assert_eq!(
            Datatype::define("Books", r#"[{"name": "a"}, {"name": "a"}]"#).unwrap_err(),
            DatatypeError::DuplicateField("a".into())
        );
        assert_eq!(
            Datatype::define("Books", r#"[{"name": "2fast"}]"#).unwrap_err(),
            DatatypeError::InvalidFieldName("2fast".into())
        );
        assert_eq!(
            Datatype::define("Books", "[]").unwrap_err(),
            DatatypeError::NoFields
        );
        assert!(matches!(
            Datatype::define("Books", r#"[{"name": "x", "kind": "blob"}]"#),
            Err(DatatypeError::InvalidFields(_))
        ));
        assert_eq!(
            Datatype::define("  ", FIELDS).unwrap_err(),
            DatatypeError::MissingName
        );
    }

    #[test]
    fn record_values_are_coerced() {
        let dt = Datatype::define("Books", FIELDS).unwrap();
        let record = dt
            .parse_record(&form(&[
                ("title", "Dune"),
                ("pages", "412"),
                ("rating", "4.5"),
                ("read", "on"),
                ("published", "1965-08-01"),
                ("genre", "novel"),
            ]))
            .unwrap();
        assert_eq!(record["title"], "Dune");
        assert_eq!(record["pages"], 412);
        assert_eq!(record["rating"], 4.5);
        assert_eq!(record["read"], true);
        assert_eq!(record["contact"], Value::Null);
    }

    #[test]
    fn every_field_error_is_reported() {
        let dt = Datatype::define("Books", FIELDS).unwrap();
        let err = dt
            .parse_record(&form(&[
                ("pages", "many"),
                ("published", "yesterday"),
                ("genre", "poetry"),
                ("contact", "nobody"),
            ]))
            .unwrap_err();
        let DatatypeError::Invalid(errors) = err else {
            panic!("expected field errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["title", "pages", "published", "genre", "contact"]);
        assert_eq!(errors[0].message, "Title is required");
    }

    #[test]
    fn unchecked_boolean_is_false() {
        let dt = Datatype::define("Flags", r#"[{"name": "done", "kind": "boolean", "required": true}]"#).unwrap();
        let record = dt.parse_record(&[]).unwrap();
        assert_eq!(record["done"], false);
    }
}
