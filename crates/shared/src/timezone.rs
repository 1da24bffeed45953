use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

pub const DEFAULT_USER_TIME_ZONE: &str = "UTC";

pub fn normalize_time_zone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<Tz>().ok().map(|tz| tz.name().to_string())
}

pub fn parse_time_zone_or_default(value: &str) -> Tz {
    normalize_time_zone(value)
        .and_then(|normalized| normalized.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::UTC)
}

pub fn user_local_date(now_utc: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    now_utc.with_timezone(tz).date_naive()
}

pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
