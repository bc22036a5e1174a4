//! Month grids and event time parsing for the calendar.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("invalid date '{0}', expected YYYY-MM-DD or YYYY-MM-DDTHH:MM")]
    InvalidDate(String),
    #[error("event cannot end before it starts")]
    EndBeforeStart,
    #[error("invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
}

/// Storage format for event timestamps (sortable as strings).
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Accepts `YYYY-MM-DDTHH:MM`, `YYYY-MM-DDTHH:MM:SS` or a bare date, which
/// is read as midnight.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, CalendarError> {
    let raw = input.trim();
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| CalendarError::InvalidDate(input.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

impl EventWindow {
    /// An empty `ends_at` means the event ends when it starts, or at the end
    /// of the day for all-day events.
    pub fn parse(starts_at: &str, ends_at: &str, all_day: bool) -> Result<Self, CalendarError> {
        let mut start = parse_datetime(starts_at)?;
        let mut end = if ends_at.trim().is_empty() {
            start
        } else {
            parse_datetime(ends_at)?
        };
        if all_day {
            start = start.date().and_time(NaiveTime::MIN);
            end = end.date().and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1);
        }
        if end < start {
            return Err(CalendarError::EndBeforeStart);
        }
        Ok(Self {
            starts_at: start,
            ends_at: end,
        })
    }

    pub fn overlaps_day(&self, day: NaiveDate) -> bool {
        self.starts_at.date() <= day && self.ends_at.date() >= day
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(rename = "_key")]
    pub key: String,
    pub owner: String,
    pub title: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub location: Option<String>,
}

impl CalendarEvent {
    pub fn window(&self) -> Option<EventWindow> {
        let starts_at = parse_datetime(&self.starts_at).ok()?;
        let ends_at = parse_datetime(&self.ends_at).ok()?;
        Some(EventWindow { starts_at, ends_at })
    }

    pub fn time_label(&self) -> String {
        match self.window() {
            Some(_) if self.all_day => "All day".to_string(),
            Some(w) => w.starts_at.format("%H:%M").to_string(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self, CalendarError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|_| Self { year, month })
            .ok_or(CalendarError::InvalidMonth { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn label(&self) -> String {
        self.first_day().format("%B %Y").to_string()
    }

    /// Half-open `[start, end)` range in storage format, for SDBQL filters.
    pub fn storage_range(&self) -> (String, String) {
        let start = self.first_day().and_time(NaiveTime::MIN);
        let end = self.next().first_day().and_time(NaiveTime::MIN);
        (
            start.format(STORAGE_FORMAT).to_string(),
            end.format(STORAGE_FORMAT).to_string(),
        )
    }

    /// Full weeks, Monday first, covering every day of the month.
    pub fn weeks(&self) -> Vec<[NaiveDate; 7]> {
        let first = self.first_day();
        let last = self.next().first_day() - Duration::days(1);
        let mut cursor = first - Duration::days(first.weekday().num_days_from_monday() as i64);

        let mut weeks = Vec::new();
        while cursor <= last {
            let mut week = [cursor; 7];
            for (offset, day) in week.iter_mut().enumerate() {
                *day = cursor + Duration::days(offset as i64);
            }
            weeks.push(week);
            cursor += Duration::days(7);
        }
        weeks
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;

    #[test]
    fn parses_both_input_forms() {
        let dt = parse_datetime("2026-03-14T09:30").unwrap();
        assert_eq!(dt.format(STORAGE_FORMAT).to_string(), "2026-03-14T09:30:00");
        let midnight = parse_datetime("2026-03-14").unwrap();
        assert_eq!(midnight.time(), NaiveTime::MIN);
        assert!(parse_datetime("14/03/2026").is_err());
    }

    #[test]
    fn end_before_start_is_rejected() {
        assert_eq!(
            EventWindow::parse("2026-03-14T10:00", "2026-03-14T09:00", false),
            Err(CalendarError::EndBeforeStart)
        );
        let w = EventWindow::parse("2026-03-14", "", true).unwrap();
        assert!(w.overlaps_day(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()));
        assert!(!w.overlaps_day(NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()));
    }

    #[test]
    fn weeks_start_on_monday_and_cover_the_month() {
        // February 2026 starts on a Sunday.
        let month = Month::new(2026, 2).unwrap();
        let weeks = month.weeks();
        assert_eq!(weeks[0][0], NaiveDate::from_ymd_opt(2026, 1, 26).unwrap());
        assert!(weeks.iter().all(|w| w[0].weekday() == Weekday::Mon));
        let last = weeks.last().unwrap();
        assert!(last.contains(&NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()));
        assert_eq!(weeks.len(), 5);
    }

    #[test]
    fn month_navigation_wraps_years() {
        let dec = Month::new(2025, 12).unwrap();
        assert_eq!(dec.next(), Month { year: 2026, month: 1 });
        assert_eq!(dec.next().previous(), dec);
        assert!(Month::new(2026, 13).is_err());
        assert_eq!(
            dec.storage_range(),
            ("2025-12-01T00:00:00".to_string(), "2026-01-01T00:00:00".to_string())
        );
    }
}
