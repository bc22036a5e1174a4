use axum::{
    Extension, Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;
use services::services::{
    sdb::{LiveQueryToken, query_as, query_one},
    slug::channel_name,
};
use tracing::{info, instrument};
use utils::htmx::{HxResponse, ToastKind, redirect};

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, CHANNELS, Collection, MESSAGES},
    views::{
        Section,
        talks::{self as view, Channel, ChannelKind, Message, Overview, Person},
    },
};

pub const MAX_MESSAGE_LEN: usize = 4000;
pub const HISTORY_LEN: u32 = 50;

/// Event fired after a message is posted so the composer can reset.
pub const MESSAGE_SENT_EVENT: &str = "messageSent";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/talks", get(overview))
        .route("/talks/livequery/token", get(livequery_token))
        .route("/talks/channels", post(create_channel))
        .route("/talks/channels/{key}", get(show_channel))
        .route("/talks/channels/{key}/messages", post(post_message))
        .route("/talks/channels/{key}/join", post(join_channel))
        .route("/talks/channels/{key}/leave", post(leave_channel))
        .route("/talks/dm/{user_key}", post(direct_message))
        .route("/talks/messages/{key}", delete(delete_message))
}

fn channels(state: &AppState) -> Collection<'_> {
    Collection::new(state.sdb(), CHANNELS)
}

async fn load_channel(state: &AppState, key: &str) -> Result<Channel, ApiError> {
    channels(state)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel"))
}

async fn readable_channel(
    state: &AppState,
    key: &str,
    ctx: &RequestContext,
) -> Result<Channel, ApiError> {
    let channel = load_channel(state, key).await?;
    if !channel.can_read(&ctx.user.key) {
        return Err(ApiError::Forbidden(
            "You are not a member of this channel".to_string(),
        ));
    }
    Ok(channel)
}

/// Trimmed message body, or why it cannot be posted.
pub fn validate_message(body: &str) -> Result<&str, ApiError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
    }
    if body.chars().count() > MAX_MESSAGE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Message is longer than {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(body)
}

/// Key shared by both participants of a direct conversation.
pub fn dm_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

async fn render_overview(
    state: &AppState,
    ctx: &RequestContext,
    form_errors: &[String],
) -> Result<String, ApiError> {
    let user = json!({ "user": ctx.user.key });
    let channels: Vec<Channel> = query_as(
        state.sdb(),
        "FOR c IN channels FILTER c.kind != \"dm\" AND (c.private != true OR @user IN c.members) SORT c.name ASC RETURN c",
        user.clone(),
    )
    .await?;
    let direct: Vec<Channel> = query_as(
        state.sdb(),
        "FOR c IN channels FILTER c.kind == \"dm\" AND @user IN c.members SORT c.created_at DESC RETURN c",
        user.clone(),
    )
    .await?;
    let people: Vec<Person> = query_as(
        state.sdb(),
        "FOR u IN users FILTER u._key != @user SORT u.username ASC RETURN { _key: u._key, username: u.username }",
        user,
    )
    .await?;

    Ok(view::overview(
        &Overview {
            viewer: &ctx.user.key,
            channels: &channels,
            direct: &direct,
            people: &people,
        },
        form_errors,
    ))
}

#[instrument(name = "talks.overview", skip(state, ctx), fields(user = %ctx.user.key))]
async fn overview(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
) -> Result<Response, ApiError> {
    let body = render_overview(&state, &ctx, &[]).await?;
    Ok(page("Talks", Section::Talks, &ctx, body, htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub private: Option<String>,
}

#[instrument(name = "talks.create_channel", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_channel(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<ChannelForm>,
) -> Result<Response, ApiError> {
    let name = match channel_name(&form.name) {
        Ok(name) => name,
        Err(err) => {
            let body = render_overview(&state, &ctx, &[err.to_string()]).await?;
            return Ok((
                StatusCode::BAD_REQUEST,
                page("Talks", Section::Talks, &ctx, body, htmx),
            )
                .into_response());
        }
    };

    let existing: Option<String> = query_one(
        state.sdb(),
        "FOR c IN channels FILTER c.kind != \"dm\" AND c.name == @name LIMIT 1 RETURN c._key",
        json!({ "name": name }),
    )
    .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "A channel named #{name} already exists"
        )));
    }

    let private = form
        .private
        .as_deref()
        .is_some_and(|v| !v.is_empty() && v != "false");
    let channel: Channel = channels(&state)
        .insert(json!({
            "name": name,
            "private": private,
            "kind": ChannelKind::Channel,
            "members": [ctx.user.key],
            "created_by": ctx.user.key,
            "created_at": store::now(),
        }))
        .await?;
    info!(channel = %channel.key, "channel created");

    Ok(redirect(htmx, &format!("/talks/channels/{}", channel.key)))
}

#[instrument(name = "talks.channel", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_channel(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let channel = readable_channel(&state, &key, &ctx).await?;
    let mut messages: Vec<Message> = query_as(
        state.sdb(),
        "FOR m IN messages FILTER m.channel_key == @channel SORT m.created_at DESC LIMIT @limit RETURN m",
        json!({ "channel": channel.key, "limit": HISTORY_LEN }),
    )
    .await?;
    messages.reverse();

    let title = channel.title_for(&ctx.user.key);
    let body = view::channel(&channel, &messages, &ctx.user.key);
    Ok(page(&title, Section::Talks, &ctx, body, htmx).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageForm {
    #[serde(default)]
    pub body: String,
}

#[instrument(name = "talks.post_message", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn post_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(key): Path<String>,
    Form(form): Form<MessageForm>,
) -> Result<Response, ApiError> {
    let body = validate_message(&form.body)?;
    let channel = readable_channel(&state, &key, &ctx).await?;

    let message: Message = Collection::new(state.sdb(), MESSAGES)
        .insert(json!({
            "channel_key": channel.key,
            "sender_key": ctx.user.key,
            "sender_name": ctx.user.username,
            "body": body,
            "created_at": store::now(),
        }))
        .await?;
    info!(message = %message.key, channel = %channel.key, "message posted");

    Ok(HxResponse::fragment(view::message(&message, &ctx.user.key))
        .trigger(MESSAGE_SENT_EVENT)
        .into_response())
}

#[instrument(name = "talks.join", skip(state, ctx), fields(user = %ctx.user.key))]
async fn join_channel(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let channel = load_channel(&state, &key).await?;
    if channel.kind == ChannelKind::Dm || channel.private {
        return Err(ApiError::Forbidden(
            "Private channels are invite only".to_string(),
        ));
    }
    if !channel.is_member(&ctx.user.key) {
        let mut members = channel.members.clone();
        members.push(ctx.user.key.clone());
        channels(&state)
            .update::<serde_json::Value>(&channel.key, json!({ "members": members }))
            .await?;
        info!(channel = %channel.key, "joined channel");
    }
    Ok(redirect(htmx, &format!("/talks/channels/{}", channel.key)))
}

#[instrument(name = "talks.leave", skip(state, ctx), fields(user = %ctx.user.key))]
async fn leave_channel(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let channel = load_channel(&state, &key).await?;
    if channel.kind == ChannelKind::Dm {
        return Err(ApiError::BadRequest(
            "Direct conversations cannot be left".to_string(),
        ));
    }
    if channel.is_member(&ctx.user.key) {
        let members: Vec<&String> = channel
            .members
            .iter()
            .filter(|m| **m != ctx.user.key)
            .collect();
        channels(&state)
            .update::<serde_json::Value>(&channel.key, json!({ "members": members }))
            .await?;
        info!(channel = %channel.key, "left channel");
    }
    Ok(redirect(htmx, "/talks"))
}

#[instrument(name = "talks.dm", skip(state, ctx), fields(user = %ctx.user.key))]
async fn direct_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(user_key): Path<String>,
) -> Result<Response, ApiError> {
    if user_key == ctx.user.key {
        return Err(ApiError::BadRequest(
            "You cannot message yourself".to_string(),
        ));
    }
    let other: Person = query_one(
        state.sdb(),
        "FOR u IN users FILTER u._key == @key LIMIT 1 RETURN { _key: u._key, username: u.username }",
        json!({ "key": user_key }),
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    let pair = dm_key(&ctx.user.key, &other.key);
    let existing: Option<String> = query_one(
        state.sdb(),
        "FOR c IN channels FILTER c.kind == \"dm\" AND c.dm_key == @pair LIMIT 1 RETURN c._key",
        json!({ "pair": pair }),
    )
    .await?;

    let key = match existing {
        Some(key) => key,
        None => {
            let channel: Channel = channels(&state)
                .insert(json!({
                    "name": pair,
                    "private": true,
                    "kind": ChannelKind::Dm,
                    "dm_key": pair,
                    "members": [ctx.user.key, other.key],
                    "member_names": [ctx.user.username, other.username],
                    "created_by": ctx.user.key,
                    "created_at": store::now(),
                }))
                .await?;
            info!(channel = %channel.key, "direct conversation opened");
            channel.key
        }
    };
    Ok(redirect(htmx, &format!("/talks/channels/{key}")))
}

#[instrument(name = "talks.delete_message", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let messages = Collection::new(state.sdb(), MESSAGES);
    let message: Message = messages
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    if message.sender_key != ctx.user.key {
        return Err(ApiError::Forbidden(
            "Only the author can delete a message".to_string(),
        ));
    }
    messages.remove(&message.key).await?;
    info!(message = %message.key, "message deleted");
    Ok(HxResponse::empty()
        .toast("Message deleted", ToastKind::Success)
        .into_response())
}

async fn livequery_token(
    State(state): State<AppState>,
    Extension(_ctx): Extension<RequestContext>,
) -> Result<Json<LiveQueryToken>, ApiError> {
    Ok(Json(state.sdb().service_livequery_token().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_length_is_bounded() {
        assert!(matches!(validate_message("   "), Err(ApiError::BadRequest(_))));
        assert_eq!(validate_message("  hi ").unwrap(), "hi");
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(validate_message(&long).is_err());
        assert!(validate_message(&long[1..]).is_ok());
    }

    #[test]
    fn dm_key_is_order_independent() {
        assert_eq!(dm_key("b", "a"), "a:b");
        assert_eq!(dm_key("a", "b"), "a:b");
    }
}
