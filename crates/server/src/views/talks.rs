use serde::Deserialize;
use utils::html::escape;

use super::{errors, timestamp};

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    #[serde(rename = "_key")]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub member_names: Vec<String>,
    #[serde(default)]
    pub created_by: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Channel,
    Dm,
}

impl Channel {
    pub fn is_member(&self, user_key: &str) -> bool {
        self.members.iter().any(|m| m == user_key)
    }

    pub fn can_read(&self, user_key: &str) -> bool {
        !self.private || self.is_member(user_key)
    }

    /// Heading shown to `viewer`: `#name`, or the other participant of a DM.
    pub fn title_for(&self, viewer: &str) -> String {
        match self.kind {
            ChannelKind::Channel => format!("#{}", self.name),
            ChannelKind::Dm => self
                .members
                .iter()
                .zip(&self.member_names)
                .find(|(key, _)| key.as_str() != viewer)
                .map(|(_, name)| format!("@{name}"))
                .unwrap_or_else(|| "@me".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(rename = "_key")]
    pub key: String,
    pub channel_key: String,
    pub sender_key: String,
    #[serde(default)]
    pub sender_name: String,
    pub body: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Person {
    #[serde(rename = "_key")]
    pub key: String,
    pub username: String,
}

pub struct Overview<'a> {
    pub viewer: &'a str,
    pub channels: &'a [Channel],
    pub direct: &'a [Channel],
    pub people: &'a [Person],
}

fn channel_link(channel: &Channel, viewer: &str) -> String {
    let lock = if channel.private && channel.kind == ChannelKind::Channel {
        " 🔒"
    } else {
        ""
    };
    format!(
        r#"<li><a href="/talks/channels/{}">{}</a>{lock}</li>"#,
        escape(&channel.key),
        escape(&channel.title_for(viewer))
    )
}

pub fn overview(view: &Overview<'_>, form_errors: &[String]) -> String {
    let channels: String = view
        .channels
        .iter()
        .map(|c| channel_link(c, view.viewer))
        .collect();
    let direct: String = view
        .direct
        .iter()
        .map(|c| channel_link(c, view.viewer))
        .collect();
    let people: String = view
        .people
        .iter()
        .map(|p| {
            format!(
                r#"<li><form method="post" action="/talks/dm/{key}" class="inline"><button type="submit" class="link">@{name}</button></form></li>"#,
                key = escape(&p.key),
                name = escape(&p.username)
            )
        })
        .collect();

    format!(
        r##"<section id="talks" class="talks">
<h1>Talks</h1>
<div class="columns">
<div>
<h2>Channels</h2>
<ul>{channels}</ul>
<form method="post" action="/talks/channels" hx-post="/talks/channels" hx-target="#talks" hx-swap="outerHTML">
{errors}
<input name="name" placeholder="new-channel" maxlength="80" required>
<label><input type="checkbox" name="private" value="true"> Private</label>
<button type="submit">Create</button>
</form>
</div>
<div>
<h2>Direct messages</h2>
<ul>{direct}</ul>
<h3>People</h3>
<ul>{people}</ul>
</div>
</div>
</section>"##,
        errors = errors(form_errors),
    )
}

pub fn message(msg: &Message, viewer: &str) -> String {
    let delete = if msg.sender_key == viewer {
        format!(
            r#"<button class="link" hx-delete="/talks/messages/{}" hx-target="closest li" hx-swap="outerHTML" hx-confirm="Delete this message?">Delete</button>"#,
            escape(&msg.key)
        )
    } else {
        String::new()
    };
    format!(
        r#"<li id="msg-{key}" class="message"><strong>{sender}</strong> <time>{at}</time> {delete}<div>{body}</div></li>"#,
        key = escape(&msg.key),
        sender = escape(&msg.sender_name),
        at = escape(&timestamp(&msg.created_at)),
        body = escape(&msg.body).replace('\n', "<br>"),
    )
}

pub fn channel(channel: &Channel, messages: &[Message], viewer: &str) -> String {
    let list: String = messages.iter().map(|m| message(m, viewer)).collect();
    let membership = match channel.kind {
        ChannelKind::Dm => String::new(),
        ChannelKind::Channel if channel.is_member(viewer) => format!(
            r#"<form method="post" action="/talks/channels/{}/leave" class="inline"><button type="submit">Leave</button></form>"#,
            escape(&channel.key)
        ),
        ChannelKind::Channel => format!(
            r#"<form method="post" action="/talks/channels/{}/join" class="inline"><button type="submit">Join</button></form>"#,
            escape(&channel.key)
        ),
    };
    format!(
        r##"<section id="channel" class="channel" data-channel="{key}" data-livequery="/talks/livequery/token">
<h1>{title}</h1>
<p><a href="/talks">All channels</a> {membership}</p>
<ul id="messages" class="messages">{list}</ul>
<form hx-post="/talks/channels/{key}/messages" hx-target="#messages" hx-swap="beforeend" hx-on::after-request="if(event.detail.successful) this.reset()">
<textarea name="body" rows="2" maxlength="4000" required></textarea>
<button type="submit">Send</button>
</form>
</section>"##,
        key = escape(&channel.key),
        title = escape(&channel.title_for(viewer)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm() -> Channel {
        Channel {
            key: "c1".into(),
            name: "dm".into(),
            private: true,
            kind: ChannelKind::Dm,
            members: vec!["u1".into(), "u2".into()],
            member_names: vec!["ann".into(), "bob".into()],
            created_by: "u1".into(),
        }
    }

    #[test]
    fn dm_title_names_the_other_participant() {
        assert_eq!(dm().title_for("u1"), "@bob");
        assert_eq!(dm().title_for("u2"), "@ann");
    }

    #[test]
    fn private_channels_need_membership() {
        let channel = dm();
        assert!(channel.can_read("u1"));
        assert!(!channel.can_read("u3"));
    }

    #[test]
    fn only_the_author_sees_delete() {
        let msg = Message {
            key: "m1".into(),
            channel_key: "c1".into(),
            sender_key: "u1".into(),
            sender_name: "ann".into(),
            body: "<hi>".into(),
            created_at: "2026-01-01T10:00:00Z".into(),
        };
        assert!(message(&msg, "u1").contains("hx-delete"));
        assert!(!message(&msg, "u2").contains("hx-delete"));
        assert!(message(&msg, "u2").contains("&lt;hi&gt;"));
    }
}
