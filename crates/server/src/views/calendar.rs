use std::fmt::Write as _;

use chrono::{Datelike, NaiveDate};
use services::services::calendar::{CalendarEvent, Month};
use utils::html::escape;

use super::{errors, text_input};

/// Values of the new-event form, echoed back when it is rejected.
#[derive(Debug, Clone, Default)]
pub struct EventFormValues {
    pub title: String,
    pub starts_at: String,
    pub ends_at: String,
    pub all_day: bool,
    pub location: String,
}

impl EventFormValues {
    pub fn from_event(event: &CalendarEvent) -> Self {
        // datetime-local inputs want minutes precision
        let trim = |raw: &str| raw.get(..16).unwrap_or(raw).to_string();
        Self {
            title: event.title.clone(),
            starts_at: trim(&event.starts_at),
            ends_at: trim(&event.ends_at),
            all_day: event.all_day,
            location: event.location.clone().unwrap_or_default(),
        }
    }
}

fn event_fields(values: &EventFormValues) -> String {
    let checked = if values.all_day { " checked" } else { "" };
    format!(
        r#"{title}
{starts}
{ends}
<label><input type="checkbox" name="all_day" value="true"{checked}> All day</label>
{location}"#,
        title = text_input("title", "Title", &values.title, "text", true),
        starts = text_input("starts_at", "Starts", &values.starts_at, "datetime-local", true),
        ends = text_input("ends_at", "Ends", &values.ends_at, "datetime-local", false),
        location = text_input("location", "Location", &values.location, "text", false),
    )
}

fn event_item(event: &CalendarEvent) -> String {
    let location = event
        .location
        .as_deref()
        .filter(|l| !l.is_empty())
        .map(|l| format!(r#" <span class="muted">@ {}</span>"#, escape(l)))
        .unwrap_or_default();
    format!(
        r#"<li class="event"><details><summary><time>{time}</time> {title}{location}</summary>
<form hx-put="/calendar/events/{key}">
{fields}
<button type="submit">Save</button>
<button type="button" class="danger" hx-delete="/calendar/events/{key}" hx-confirm="Delete this event?">Delete</button>
</form></details></li>"#,
        time = escape(&event.time_label()),
        title = escape(&event.title),
        key = escape(&event.key),
        fields = event_fields(&EventFormValues::from_event(event)),
    )
}

/// Month grid with the viewer's events, plus the new-event form.
pub fn month(
    month: Month,
    today: NaiveDate,
    events: &[CalendarEvent],
    values: &EventFormValues,
    form_errors: &[String],
) -> String {
    let windows: Vec<_> = events.iter().map(|e| (e, e.window())).collect();

    let mut grid = String::new();
    for week in month.weeks() {
        grid.push_str("<tr>");
        for day in week {
            let mut class = Vec::new();
            if day.month() != month.month {
                class.push("outside");
            }
            if day == today {
                class.push("today");
            }
            let items: String = windows
                .iter()
                .filter(|(_, w)| w.is_some_and(|w| w.overlaps_day(day)))
                .map(|(e, _)| event_item(e))
                .collect();
            let _ = write!(
                grid,
                r#"<td class="{class}"><span class="day">{n}</span><ul>{items}</ul></td>"#,
                class = class.join(" "),
                n = day.day(),
            );
        }
        grid.push_str("</tr>");
    }

    let prev = month.previous();
    let next = month.next();
    format!(
        r##"<section id="calendar">
<h1>{label}</h1>
<nav class="pager"><a href="/calendar?year={py}&month={pm}">Previous</a> <a href="/calendar">Today</a> <a href="/calendar?year={ny}&month={nm}">Next</a></nav>
<table class="month"><thead><tr><th>Mon</th><th>Tue</th><th>Wed</th><th>Thu</th><th>Fri</th><th>Sat</th><th>Sun</th></tr></thead>
<tbody>{grid}</tbody></table>
<h2>New event</h2>
<form method="post" action="/calendar/events" hx-post="/calendar/events" hx-target="#calendar" hx-swap="outerHTML">
{errors}
{fields}
<button type="submit">Add event</button>
</form>
</section>"##,
        label = escape(&month.label()),
        py = prev.year,
        pm = prev.month,
        ny = next.year,
        nm = next.month,
        errors = errors(form_errors),
        fields = event_fields(values),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(starts_at: &str, ends_at: &str) -> CalendarEvent {
        CalendarEvent {
            key: "e1".into(),
            owner: "u1".into(),
            title: "Standup".into(),
            starts_at: starts_at.into(),
            ends_at: ends_at.into(),
            all_day: false,
            location: Some("Room 4".into()),
        }
    }

    #[test]
    fn events_land_on_every_day_they_cover() {
        let month_view = Month::new(2026, 3).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let html = month(
            month_view,
            today,
            &[event("2026-03-10T09:00:00", "2026-03-11T10:00:00")],
            &EventFormValues::default(),
            &[],
        );
        assert_eq!(html.matches(r#"<li class="event">"#).count(), 2);
        assert!(html.contains("March 2026"));
        assert!(html.contains("year=2026&month=4"));
    }

    #[test]
    fn edit_values_use_minute_precision() {
        let values = EventFormValues::from_event(&event("2026-03-10T09:00:00", "2026-03-10T10:30:00"));
        assert_eq!(values.starts_at, "2026-03-10T09:00");
        assert_eq!(values.ends_at, "2026-03-10T10:30");
        assert_eq!(values.location, "Room 4");
    }
}
