//! Server-rendered HTML.
//!
//! Every controller renders through [`Page`]: full documents for browser
//! navigation, the bare fragment when htmx asks.

use axum::{http::StatusCode, response::Html};
use utils::html::escape;

use crate::auth::{Flash, SessionUser};

pub mod auth;
pub mod belote;
pub mod billing;
pub mod calendar;
pub mod dashboard;
pub mod datatypes;
pub mod docs;
pub mod mailbox;
pub mod projects;
pub mod repos;
pub mod talks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Home,
    Auth,
    Dashboard,
    Talks,
    Projects,
    Billing,
    Mailbox,
    Calendar,
    Repos,
    Docs,
    Datatypes,
    Belote,
}

const NAV: &[(Section, &str, &str)] = &[
    (Section::Talks, "/talks", "Talks"),
    (Section::Projects, "/projects", "Projects"),
    (Section::Billing, "/billing/invoices", "Billing"),
    (Section::Mailbox, "/mailbox", "Mailbox"),
    (Section::Calendar, "/calendar", "Calendar"),
    (Section::Repos, "/repos", "Repositories"),
    (Section::Docs, "/docs", "Docs"),
    (Section::Datatypes, "/datatypes", "Datatypes"),
    (Section::Belote, "/belote", "Belote"),
    (Section::Dashboard, "/dashboard", "Database"),
];

const TOAST_SCRIPT: &str = r#"
document.body.addEventListener("showToast", function (evt) {
  var d = evt.detail || {};
  var el = document.createElement("div");
  el.className = "toast toast-" + (d.type || "info");
  el.textContent = d.message || "";
  document.getElementById("toasts").appendChild(el);
  setTimeout(function () { el.remove(); }, 4000);
});
htmx.config.responseHandling = [{code: "204", swap: false}, {code: "[23]..", swap: true}, {code: "4..", swap: true, error: false}, {code: "...", swap: false, error: true}];
"#;

pub struct Page<'a> {
    title: String,
    section: Section,
    user: Option<&'a SessionUser>,
    flash: Option<Flash>,
    body: String,
}

impl<'a> Page<'a> {
    pub fn new(title: impl Into<String>, section: Section, body: String) -> Self {
        Self {
            title: title.into(),
            section,
            user: None,
            flash: None,
            body,
        }
    }

    pub fn user(mut self, user: &'a SessionUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn flash(mut self, flash: Option<Flash>) -> Self {
        self.flash = flash;
        self
    }

    pub fn render(self, htmx: bool) -> Html<String> {
        if htmx {
            return Html(self.body);
        }
        Html(self.document())
    }

    fn document(&self) -> String {
        let nav: String = NAV
            .iter()
            .map(|(section, href, label)| {
                let class = if *section == self.section { r#" class="active""# } else { "" };
                format!(r#"<a href="{href}"{class}>{label}</a>"#)
            })
            .collect();
        let account = match self.user {
            Some(user) => format!(
                r#"<span class="who">{}</span><a href="/auth/2fa/setup">Security</a><form method="post" action="/auth/logout" class="inline"><button type="submit">Log out</button></form>"#,
                escape(&user.username)
            ),
            None => r#"<a href="/auth/login">Log in</a>"#.to_string(),
        };
        let flash = self
            .flash
            .as_ref()
            .map(|f| {
                format!(
                    r#"<div class="flash flash-{}">{}</div>"#,
                    escape(&f.kind),
                    escape(&f.message)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · SoliDB</title>
<link rel="stylesheet" href="/static/app.css">
<script src="https://unpkg.com/htmx.org@2.0.4"></script>
</head>
<body>
<header><a href="/" class="brand">SoliDB</a><nav>{nav}</nav><div class="account">{account}</div></header>
<main id="main">{flash}{body}</main>
<div id="toasts"></div>
<script>{TOAST_SCRIPT}</script>
</body>
</html>"#,
            title = escape(&self.title),
            body = self.body,
        )
    }
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let title = status.canonical_reason().unwrap_or("Error");
    Page::new(
        title,
        Section::Home,
        format!(
            r#"<section class="error"><h1>{} {}</h1><p>{}</p><p><a href="/">Back to start</a></p></section>"#,
            status.as_u16(),
            escape(title),
            escape(message)
        ),
    )
    .document()
}

pub fn home(user: &SessionUser) -> String {
    let tiles: String = NAV
        .iter()
        .map(|(_, href, label)| format!(r#"<li><a href="{href}">{label}</a></li>"#))
        .collect();
    format!(
        r#"<section><h1>Welcome, {}</h1><ul class="tiles">{tiles}</ul></section>"#,
        escape(&user.username)
    )
}

/// Inline list of validation messages above a form.
pub fn errors(messages: &[String]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", escape(m)))
        .collect();
    format!(r#"<ul class="form-errors" role="alert">{items}</ul>"#)
}

pub fn text_input(name: &str, label: &str, value: &str, kind: &str, required: bool) -> String {
    let required = if required { " required" } else { "" };
    format!(
        r#"<label>{label}<input type="{kind}" name="{name}" value="{value}"{required}></label>"#,
        label = escape(label),
        name = escape(name),
        value = escape(value),
    )
}

pub fn textarea(name: &str, label: &str, value: &str) -> String {
    format!(
        r#"<label>{}<textarea name="{}" rows="6">{}</textarea></label>"#,
        escape(label),
        escape(name),
        escape(value)
    )
}

/// Short relative-free timestamp for lists (`2026-03-14 09:30`).
pub fn timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.chars().take(16).collect::<String>().replace('T', " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> SessionUser {
        SessionUser {
            key: "u1".into(),
            username: "<ann>".into(),
            email: "ann@example.com".into(),
            issued_at: 0,
        }
    }

    #[test]
    fn htmx_gets_only_the_fragment() {
        let user = user();
        let Html(body) = Page::new("Talks", Section::Talks, "<p>hi</p>".into())
            .user(&user)
            .render(true);
        assert_eq!(body, "<p>hi</p>");
    }

    #[test]
    fn full_page_escapes_and_marks_section() {
        let user = user();
        let Html(body) = Page::new("Talks", Section::Talks, "<p>hi</p>".into())
            .user(&user)
            .render(false);
        assert!(body.starts_with("<!DOCTYPE html>"));
        assert!(body.contains(r#"<a href="/talks" class="active">Talks</a>"#));
        assert!(body.contains("&lt;ann&gt;"));
    }

    #[test]
    fn timestamps_are_shortened() {
        assert_eq!(timestamp("2026-03-14T09:30:12Z"), "2026-03-14 09:30");
        assert_eq!(timestamp("2026-03-14T09:30:12"), "2026-03-14 09:30");
    }
}
