use axum::{
    Extension, Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{Value, json};
use services::services::{
    calendar::{CalendarEvent, EventWindow, Month, STORAGE_FORMAT},
    sdb::query_as,
};
use tracing::{info, instrument};
use utils::htmx::redirect;

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    extract::Htmx,
    routes::page,
    store::{self, Collection, EVENTS},
    views::{
        Section,
        calendar::{self as view, EventFormValues},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/calendar", get(show_month))
        .route("/calendar/events", post(create_event))
        .route(
            "/calendar/events/{key}",
            put(update_event).delete(delete_event),
        )
}

fn events(state: &AppState) -> Collection<'_> {
    Collection::new(state.sdb(), EVENTS)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Default, Deserialize)]
pub struct EventForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub starts_at: String,
    #[serde(default)]
    pub ends_at: String,
    #[serde(default)]
    pub all_day: Option<String>,
    #[serde(default)]
    pub location: String,
}

impl EventForm {
    fn all_day(&self) -> bool {
        self.all_day
            .as_deref()
            .is_some_and(|v| !v.is_empty() && v != "false")
    }

    fn values(&self) -> EventFormValues {
        EventFormValues {
            title: self.title.clone(),
            starts_at: self.starts_at.clone(),
            ends_at: self.ends_at.clone(),
            all_day: self.all_day(),
            location: self.location.clone(),
        }
    }

    /// Title and time window, or every problem with the submission.
    pub fn validate(&self) -> Result<(String, EventWindow), Vec<String>> {
        let mut problems = Vec::new();
        let title = self.title.trim();
        if title.is_empty() {
            problems.push("Title is required".to_string());
        }
        let window = EventWindow::parse(&self.starts_at, &self.ends_at, self.all_day())
            .map_err(|e| problems.push(e.to_string()))
            .ok();
        match window {
            Some(window) if problems.is_empty() => Ok((title.to_string(), window)),
            _ => Err(problems),
        }
    }

    fn document(&self, title: String, window: EventWindow) -> Value {
        let location = self.location.trim();
        json!({
            "title": title,
            "starts_at": window.starts_at.format(STORAGE_FORMAT).to_string(),
            "ends_at": window.ends_at.format(STORAGE_FORMAT).to_string(),
            "all_day": self.all_day(),
            "location": (!location.is_empty()).then_some(location),
        })
    }
}

async fn month_events(
    state: &AppState,
    ctx: &RequestContext,
    month: Month,
) -> Result<Vec<CalendarEvent>, ApiError> {
    let (start, end) = month.storage_range();
    Ok(query_as(
        state.sdb(),
        "FOR e IN calendar_events FILTER e.owner == @user AND e.starts_at < @end AND e.ends_at >= @start SORT e.starts_at ASC RETURN e",
        json!({ "user": ctx.user.key, "start": start, "end": end }),
    )
    .await?)
}

fn month_link(month: Month) -> String {
    format!("/calendar?year={}&month={}", month.year, month.month)
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[instrument(name = "calendar.month", skip(state, ctx), fields(user = %ctx.user.key))]
async fn show_month(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Query(query): Query<MonthQuery>,
) -> Result<Response, ApiError> {
    let today = today();
    let current = Month::containing(today);
    let month = Month::new(
        query.year.unwrap_or(current.year),
        query.month.unwrap_or(current.month),
    )?;
    let list = month_events(&state, &ctx, month).await?;
    let body = view::month(month, today, &list, &EventFormValues::default(), &[]);
    Ok(page(&month.label(), Section::Calendar, &ctx, body, htmx).into_response())
}

#[instrument(name = "calendar.create", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn create_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Form(form): Form<EventForm>,
) -> Result<Response, ApiError> {
    let (title, window) = match form.validate() {
        Ok(valid) => valid,
        Err(problems) => {
            let today = today();
            let month = Month::containing(today);
            let list = month_events(&state, &ctx, month).await?;
            let body = view::month(month, today, &list, &form.values(), &problems);
            return Ok((
                StatusCode::BAD_REQUEST,
                page(&month.label(), Section::Calendar, &ctx, body, htmx),
            )
                .into_response());
        }
    };

    let mut doc = form.document(title, window);
    doc["owner"] = json!(ctx.user.key);
    doc["created_at"] = json!(store::now());
    let event: CalendarEvent = events(&state).insert(doc).await?;
    info!(event = %event.key, starts_at = %event.starts_at, "event created");

    Ok(redirect(
        htmx,
        &month_link(Month::containing(window.starts_at.date())),
    ))
}

async fn owned_event(
    state: &AppState,
    ctx: &RequestContext,
    key: &str,
) -> Result<CalendarEvent, ApiError> {
    let event: CalendarEvent = events(state)
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    if event.owner != ctx.user.key {
        return Err(ApiError::Forbidden(
            "Only the owner can change this event".to_string(),
        ));
    }
    Ok(event)
}

#[instrument(name = "calendar.update", skip(state, ctx, form), fields(user = %ctx.user.key))]
async fn update_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
    Form(form): Form<EventForm>,
) -> Result<Response, ApiError> {
    let event = owned_event(&state, &ctx, &key).await?;
    let (title, window) = form
        .validate()
        .map_err(|problems| ApiError::BadRequest(problems.join("; ")))?;
    events(&state)
        .update::<Value>(&event.key, form.document(title, window))
        .await?;
    info!(event = %event.key, "event updated");
    Ok(redirect(
        htmx,
        &month_link(Month::containing(window.starts_at.date())),
    ))
}

#[instrument(name = "calendar.delete", skip(state, ctx), fields(user = %ctx.user.key))]
async fn delete_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Htmx(htmx): Htmx,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let event = owned_event(&state, &ctx, &key).await?;
    events(&state).remove(&event.key).await?;
    info!(event = %event.key, "event deleted");
    let back = event
        .window()
        .map(|w| month_link(Month::containing(w.starts_at.date())))
        .unwrap_or_else(|| "/calendar".to_string());
    Ok(redirect(htmx, &back))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str, starts_at: &str, ends_at: &str) -> EventForm {
        EventForm {
            title: title.into(),
            starts_at: starts_at.into(),
            ends_at: ends_at.into(),
            ..Default::default()
        }
    }

    #[test]
    fn end_before_start_is_a_form_error() {
        let problems = form("Review", "2026-04-02T10:00", "2026-04-02T09:00")
            .validate()
            .unwrap_err();
        assert_eq!(problems, vec!["event cannot end before it starts".to_string()]);
    }

    #[test]
    fn every_problem_is_reported() {
        let problems = form("", "tomorrow", "").validate().unwrap_err();
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn documents_use_storage_format() {
        let f = EventForm {
            all_day: Some("true".into()),
            location: "  ".into(),
            ..form("Holiday", "2026-04-02", "")
        };
        let (title, window) = f.validate().unwrap();
        let doc = f.document(title, window);
        assert_eq!(doc["starts_at"], "2026-04-02T00:00:00");
        assert_eq!(doc["ends_at"], "2026-04-02T23:59:59");
        assert_eq!(doc["all_day"], true);
        assert!(doc["location"].is_null());
    }
}
