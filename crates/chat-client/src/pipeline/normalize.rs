use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use shared::calendar::{
    ALL_DAY_LABEL, DateRange, NormalizedEvent, NormalizedEventTable, events_found_summary,
};
use shared::timezone::weekday_name;

use super::google::{RawCalendarEvent, RawEventTime};
use super::params::TimeWindow;

/// Flattens provider events into the answer-stage table.
///
/// Pure: the output depends only on the arguments. Event order is kept as
/// returned by the provider, which already sorts by start time.
pub fn normalize_events(
    events: &[RawCalendarEvent],
    window: &TimeWindow,
    time_zone: Tz,
) -> NormalizedEventTable {
    let normalized = events
        .iter()
        .map(|event| normalize_event(event, time_zone))
        .collect::<Vec<_>>();
    let total_events = normalized.len();

    NormalizedEventTable {
        events: normalized,
        summary: events_found_summary(total_events),
        date_range: DateRange {
            start: window.start.to_rfc3339(),
            end: window.end.to_rfc3339(),
        },
        total_events,
        has_more_events: total_events >= window.max_results as usize,
    }
}

fn normalize_event(event: &RawCalendarEvent, time_zone: Tz) -> NormalizedEvent {
    let start = event.start.as_ref().map(|start| resolve_time(start, time_zone));
    let end = event.end.as_ref().map(|end| resolve_time(end, time_zone));

    let (date, time, is_all_day) = match (start, end) {
        (Some(EventTime::AllDay(date)), _) => (Some(date), ALL_DAY_LABEL.to_string(), true),
        (Some(EventTime::Timed { date, time }), Some(EventTime::Timed { time: end, .. })) => {
            (Some(date), format!("{time} - {end}"), false)
        }
        (Some(EventTime::Timed { date, time }), _) => (Some(date), time, false),
        (Some(EventTime::Unparsed), _) | (None, _) => (None, String::new(), false),
    };

    NormalizedEvent {
        id: text_or_empty(&event.id),
        title: text_or_empty(&event.summary),
        date: date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        time,
        day_of_week: date.map(weekday_name).unwrap_or_default().to_string(),
        location: text_or_empty(&event.location),
        description: text_or_empty(&event.description),
        status: text_or_empty(&event.status),
        link: text_or_empty(&event.html_link),
        is_all_day,
        is_recurring: event
            .recurring_event_id
            .as_deref()
            .is_some_and(|series| !series.trim().is_empty()),
    }
}

enum EventTime {
    AllDay(NaiveDate),
    Timed { date: NaiveDate, time: String },
    Unparsed,
}

fn resolve_time(raw: &RawEventTime, time_zone: Tz) -> EventTime {
    if let Some(date_time) = raw.date_time.as_deref() {
        return match DateTime::parse_from_rfc3339(date_time.trim()) {
            Ok(parsed) => {
                let local = parsed.with_timezone(&time_zone);
                EventTime::Timed {
                    date: local.date_naive(),
                    time: local.format("%H:%M").to_string(),
                }
            }
            Err(_) => EventTime::Unparsed,
        };
    }

    raw.date
        .as_deref()
        .and_then(|date| NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok())
        .map_or(EventTime::Unparsed, EventTime::AllDay)
}

fn text_or_empty(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}
