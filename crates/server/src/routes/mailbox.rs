use axum::{
    Extension, Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::sdb::{query_as, query_count, query_one};
use tracing::{info, instrument};
use utils::htmx::redirect;

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, MAILS},
    views::{
        Section,
        mailbox::{self as view, Draft, Folder, Mail},
    },
};

pub const DEFAULT_SUBJECT: &str = "(no subject)";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mailbox", get(list_folder))
        .route("/mailbox/compose", get(compose))
        .route("/mailbox/messages", post(send_mail))
        .route(
            "/mailbox/messages/{key}",
            get(show_mail).delete(delete_mail),
        )
        .route("/mailbox/messages/{key}/archive", post(archive_mail))
}

fn mails(state: &AppState) -> Collection<'_> {
    Collection::new(state.sdb(), MAILS)
}

/// Load a mail the viewer sent or received.
async fn own_mail(state: &AppState, key: &str, ctx: &RequestContext) -> Result<Mail, ApiError> {
    let mail: Mail = mails(state)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    if !mail.involves(&ctx.user.key) {
        return Err(ApiError::Forbidden(
            "This message belongs to someone else".to_string(),
        ));
    }
    Ok(mail)
}

fn folder_query(folder: Folder) -> &'static str {
    match folder {
        Folder::Inbox => {
            "FOR m IN mails FILTER m.to_key == @user AND @user NOT IN m.archived_by SORT m.created_at DESC RETURN m"
        }
        Folder::Sent => {
            "FOR m IN mails FILTER m.from_key == @user AND @user NOT IN m.archived_by SORT m.created_at DESC RETURN m"
        }
        Folder::Archive => {
            "FOR m IN mails FILTER (m.to_key == @user OR m.from_key == @user) AND @user IN m.archived_by SORT m.created_at DESC RETURN m"
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FolderQuery {
    pub folder: Option<String>,
}

#[instrument(name = "mailbox.folder", skip(state, ctx), fields(user = %ctx.user.key))]
async fn list_folder(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Query(query): Query<FolderQuery>,
) -> Result<Response, ApiError> {
    let folder = match query.folder.as_deref().map(str::trim) {
        None | Some("") => Folder::default(),
        Some(raw) => raw.parse::<Folder>().map_err(ApiError::BadRequest)?,
    };
    let user = json!({ "user": ctx.user.key });
    let list: Vec<Mail> = query_as(state.sdb(), folder_query(folder), user.clone()).await?;
    let unread = query_count(
        state.sdb(),
        "RETURN LENGTH(FOR m IN mails FILTER m.to_key == @user AND m.read != true AND @user NOT IN m.archived_by RETURN 1)",
        user,
    )
    .await?;

    let body = view::folder(folder, &list, unread, &ctx.user.key);
    Ok(page(folder.label(), Section::Mailbox, &ctx, body, htmx).into_response())
}

#[instrument(name = "mailbox.show", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_mail(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let mut mail = own_mail(&state, &key, &ctx).await?;
    if mail.is_unread_for(&ctx.user.key) {
        mails(&state)
            .update::<Value>(&mail.key, json!({ "read": true }))
            .await?;
        mail.read = true;
    }
    let body = view::message(&mail, &ctx.user.key);
    Ok(page(&mail.subject, Section::Mailbox, &ctx, body, htmx).into_response())
}

async fn compose(Extension(ctx): Extension<RequestContext>, Htmx(htmx): Htmx) -> Response {
    let body = view::compose(&Draft::default(), &[]);
    page("New message", Section::Mailbox, &ctx, body, htmx).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct ComposeForm {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    #[serde(rename = "_key")]
    key: String,
    username: String,
}

#[instrument(name = "mailbox.send", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn send_mail(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<ComposeForm>,
) -> Result<Response, ApiError> {
    let to = form.to.trim();
    let recipient: Option<Recipient> = if to.is_empty() {
        None
    } else {
        query_one(
            state.sdb(),
            "FOR u IN users FILTER u.username == @to OR u.email == @to LIMIT 1 RETURN { _key: u._key, username: u.username }",
            json!({ "to": to }),
        )
        .await?
    };
    let Some(recipient) = recipient else {
        let problem = if to.is_empty() {
            "Recipient is required".to_string()
        } else {
            format!("Unknown recipient '{to}'")
        };
        let draft = Draft {
            to: form.to.clone(),
            subject: form.subject.clone(),
            body: form.body.clone(),
        };
        return Ok((
            StatusCode::BAD_REQUEST,
            page(
                "New message",
                Section::Mailbox,
                &ctx,
                view::compose(&draft, &[problem]),
                htmx,
            ),
        )
            .into_response());
    };

    let subject = match form.subject.trim() {
        "" => DEFAULT_SUBJECT,
        subject => subject,
    };
    let mail: Mail = mails(&state)
        .insert(json!({
            "from_key": ctx.user.key,
            "from_name": ctx.user.username,
            "to_key": recipient.key,
            "to_name": recipient.username,
            "subject": subject,
            "body": form.body,
            "read": false,
            "archived_by": [],
            "created_at": store::now(),
        }))
        .await?;
    info!(mail = %mail.key, to = %mail.to_key, "mail sent");

    Ok(redirect(htmx, &format!("/mailbox?folder={}", Folder::Sent)))
}

#[instrument(name = "mailbox.archive", skip(state, ctx), fields(user = %ctx.user.key))]
async fn archive_mail(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let mail = own_mail(&state, &key, &ctx).await?;
    if !mail.archived_by.contains(&ctx.user.key) {
        let mut archived_by = mail.archived_by.clone();
        archived_by.push(ctx.user.key.clone());
        mails(&state)
            .update::<Value>(&mail.key, json!({ "archived_by": archived_by }))
            .await?;
        info!(mail = %mail.key, "mail archived");
    }
    Ok(redirect(htmx, "/mailbox"))
}

#[instrument(name = "mailbox.delete", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_mail(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let mail = own_mail(&state, &key, &ctx).await?;
    mails(&state).remove(&mail.key).await?;
    info!(mail = %mail.key, "mail deleted");
    Ok(redirect(htmx, "/mailbox"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_folder_filters_on_the_viewer() {
        for folder in Folder::ALL {
            assert!(folder_query(folder).contains("@user"));
        }
        assert!(folder_query(Folder::Archive).contains("@user IN m.archived_by"));
    }
}
