use std::{fmt, str::FromStr};

use serde::Deserialize;
use utils::html::escape;

use super::{errors, text_input, textarea, timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Folder {
    #[default]
    Inbox,
    Sent,
    Archive,
}

impl Folder {
    pub const ALL: [Folder; 3] = [Folder::Inbox, Folder::Sent, Folder::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Folder::Inbox => "inbox",
            Folder::Sent => "sent",
            Folder::Archive => "archive",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Folder::Inbox => "Inbox",
            Folder::Sent => "Sent",
            Folder::Archive => "Archive",
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Folder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Folder::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown folder '{s}'"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mail {
    #[serde(rename = "_key")]
    pub key: String,
    pub from_key: String,
    #[serde(default)]
    pub from_name: String,
    pub to_key: String,
    #[serde(default)]
    pub to_name: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub read: bool,
    /// Users who moved this mail to their archive.
    #[serde(default)]
    pub archived_by: Vec<String>,
    #[serde(default)]
    pub created_at: String,
}

impl Mail {
    pub fn involves(&self, user_key: &str) -> bool {
        self.from_key == user_key || self.to_key == user_key
    }

    pub fn is_unread_for(&self, user_key: &str) -> bool {
        self.to_key == user_key && !self.read
    }
}

/// Values of the compose form, echoed back when it is rejected.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub fn folder(current: Folder, mails: &[Mail], unread: u64, viewer: &str) -> String {
    let tabs: String = Folder::ALL
        .iter()
        .map(|f| {
            let class = if *f == current { r#" class="active""# } else { "" };
            let badge = if *f == Folder::Inbox && unread > 0 {
                format!(r#" <span class="count">{unread}</span>"#)
            } else {
                String::new()
            };
            format!(
                r#"<a href="/mailbox?folder={}"{class}>{}{badge}</a> "#,
                f.as_str(),
                f.label()
            )
        })
        .collect();

    let rows: String = mails
        .iter()
        .map(|mail| {
            let (label, who) = if mail.from_key == viewer {
                ("To", &mail.to_name)
            } else {
                ("From", &mail.from_name)
            };
            let class = if mail.is_unread_for(viewer) { "unread" } else { "" };
            format!(
                r#"<tr class="{class}"><td>{label} {who}</td><td><a href="/mailbox/messages/{key}">{subject}</a></td><td>{at}</td></tr>"#,
                who = escape(who),
                key = escape(&mail.key),
                subject = escape(&mail.subject),
                at = escape(&timestamp(&mail.created_at)),
            )
        })
        .collect();

    let table = if rows.is_empty() {
        "<p class=\"muted\">No messages.</p>".to_string()
    } else {
        format!("<table><tbody>{rows}</tbody></table>")
    };

    format!(
        r#"<section id="mailbox">
<h1>Mailbox</h1>
<p><a href="/mailbox/compose" class="button">Compose</a></p>
<nav class="tabs">{tabs}</nav>
{table}
</section>"#
    )
}

pub fn message(mail: &Mail, viewer: &str) -> String {
    let archive = if mail.archived_by.iter().any(|k| k == viewer) {
        String::new()
    } else {
        format!(
            r#"<form method="post" action="/mailbox/messages/{}/archive" class="inline"><button type="submit">Archive</button></form>"#,
            escape(&mail.key)
        )
    };
    format!(
        r#"<section id="mail">
<h1>{subject}</h1>
<p>From <strong>{from}</strong> to <strong>{to}</strong> <time>{at}</time></p>
<div class="mail-body">{body}</div>
<div class="actions">{archive}
<button class="danger" hx-delete="/mailbox/messages/{key}" hx-confirm="Delete this message?">Delete</button>
</div>
<p><a href="/mailbox">Back to inbox</a></p>
</section>"#,
        subject = escape(&mail.subject),
        from = escape(&mail.from_name),
        to = escape(&mail.to_name),
        at = escape(&timestamp(&mail.created_at)),
        body = escape(&mail.body).replace('\n', "<br>"),
        key = escape(&mail.key),
    )
}

pub fn compose(draft: &Draft, form_errors: &[String]) -> String {
    format!(
        r##"<section id="compose">
<h1>New message</h1>
{errors}
<form method="post" action="/mailbox/messages" hx-post="/mailbox/messages" hx-target="#compose" hx-swap="outerHTML">
{to}
{subject}
{body}
<button type="submit">Send</button>
</form>
</section>"##,
        errors = errors(form_errors),
        to = text_input("to", "To (username or email)", &draft.to, "text", true),
        subject = text_input("subject", "Subject", &draft.subject, "text", false),
        body = textarea("body", "Message", &draft.body),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(read: bool) -> Mail {
        Mail {
            key: "m1".into(),
            from_key: "u1".into(),
            from_name: "ann".into(),
            to_key: "u2".into(),
            to_name: "bob".into(),
            subject: "Lunch".into(),
            body: "Noon?".into(),
            read,
            archived_by: Vec::new(),
            created_at: "2026-03-02T12:00:00Z".into(),
        }
    }

    #[test]
    fn folders_parse_from_query_values() {
        assert_eq!("sent".parse::<Folder>(), Ok(Folder::Sent));
        assert!("spam".parse::<Folder>().is_err());
    }

    #[test]
    fn unread_only_counts_for_the_recipient() {
        assert!(mail(false).is_unread_for("u2"));
        assert!(!mail(false).is_unread_for("u1"));
        assert!(!mail(true).is_unread_for("u2"));
    }

    #[test]
    fn inbox_shows_unread_badge() {
        let html = folder(Folder::Inbox, &[mail(false)], 1, "u2");
        assert!(html.contains(r#"<span class="count">1</span>"#));
        assert!(html.contains(r#"<tr class="unread">"#));
        assert!(html.contains("From ann"));
    }
}
