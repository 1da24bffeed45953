use reqwest::Url;
use serde::Deserialize;

use super::params::TimeWindow;
use crate::error::TransportError;
use crate::transport::{join_path, send_json};

#[derive(Debug, Deserialize)]
struct GoogleCalendarEventsResponse {
    #[serde(default)]
    items: Vec<RawCalendarEvent>,
}

/// A provider event as returned by the events list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCalendarEvent {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub html_link: Option<String>,
    pub recurring_event_id: Option<String>,
    pub start: Option<RawEventTime>,
    pub end: Option<RawEventTime>,
}

/// Either `dateTime` (timed) or `date` (all-day) is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
}

impl RawEventTime {
    pub fn timed(date_time: impl Into<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            date: None,
        }
    }

    pub fn all_day(date: impl Into<String>) -> Self {
        Self {
            date_time: None,
            date: Some(date.into()),
        }
    }
}

pub(crate) async fn fetch_calendar_events(
    client: &reqwest::Client,
    api_base_url: &Url,
    calendar_id: &str,
    provider_token: &str,
    window: &TimeWindow,
) -> Result<Vec<RawCalendarEvent>, TransportError> {
    let url = join_path(api_base_url, &["calendars", calendar_id, "events"])?;
    let time_min = window.start.to_rfc3339();
    let time_max = window.end.to_rfc3339();
    let max_results = window.max_results.to_string();
    let request = client.get(url).bearer_auth(provider_token).query(&[
        ("singleEvents", "true"),
        ("orderBy", "startTime"),
        ("timeMin", time_min.as_str()),
        ("timeMax", time_max.as_str()),
        ("maxResults", max_results.as_str()),
    ]);

    let payload: GoogleCalendarEventsResponse = send_json(request).await?;
    Ok(payload.items)
}
