use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use shared::config::CalendarPipelineConfig;
use thiserror::Error;

/// Search parameters as chosen by the parameter model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedParams {
    pub days: u32,
    pub max_results: Option<u32>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterParseError {
    #[error("parameter response is not a JSON object")]
    NotAnObject,
    #[error("parameter response is missing days")]
    MissingDays,
    #[error("days value {0} is not an allowed bucket")]
    DaysNotAllowed(String),
}

/// Resolved fetch window, anchored at the time the pipeline started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub max_results: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSource {
    Model,
    Default,
}

impl ParameterSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Default => "default",
        }
    }
}

/// Removes a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_parameters(
    raw: &str,
    day_buckets: &[u32],
) -> Result<ParsedParams, ParameterParseError> {
    let value = serde_json::from_str::<Value>(strip_code_fences(raw))
        .map_err(|_| ParameterParseError::NotAnObject)?;
    let object = value.as_object().ok_or(ParameterParseError::NotAnObject)?;

    let days_value = object
        .get("days")
        .filter(|value| !value.is_null())
        .ok_or(ParameterParseError::MissingDays)?;
    let days = days_value
        .as_u64()
        .and_then(|days| u32::try_from(days).ok())
        .filter(|days| day_buckets.contains(days))
        .ok_or_else(|| ParameterParseError::DaysNotAllowed(days_value.to_string()))?;

    let max_results = object
        .get("maxResults")
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0);

    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ParsedParams {
        days,
        max_results,
        reasoning,
    })
}

/// Turns parsed parameters into a concrete window, or the default one when parsing failed.
pub fn resolve_window(
    parsed: &Result<ParsedParams, ParameterParseError>,
    now: DateTime<Utc>,
    config: &CalendarPipelineConfig,
) -> (TimeWindow, ParameterSource) {
    match parsed {
        Ok(params) => (
            TimeWindow {
                start: now,
                end: now + Duration::days(i64::from(params.days)),
                max_results: params
                    .max_results
                    .unwrap_or(config.default_max_results)
                    .min(config.max_results_cap),
            },
            ParameterSource::Model,
        ),
        Err(_) => (default_window(now, config), ParameterSource::Default),
    }
}

pub fn default_window(now: DateTime<Utc>, config: &CalendarPipelineConfig) -> TimeWindow {
    TimeWindow {
        start: now,
        end: now + Duration::days(i64::from(config.default_window_days)),
        max_results: config.default_max_results.min(config.max_results_cap),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use shared::config::CalendarPipelineConfig;

    use super::{
        ParameterParseError, ParameterSource, parse_parameters, resolve_window, strip_code_fences,
    };

    const BUCKETS: [u32; 4] = [10, 30, 100, 300];

    #[test]
    fn strips_fenced_and_bare_payloads() {
        assert_eq!(strip_code_fences("```json\n{\"days\":10}\n```"), "{\"days\":10}");
        assert_eq!(strip_code_fences("```\n{\"days\":10}```"), "{\"days\":10}");
        assert_eq!(strip_code_fences("  {\"days\":10} "), "{\"days\":10}");
    }

    #[test]
    fn parses_model_output_inside_fence() {
        let parsed = parse_parameters(
            "```json\n{\"days\": 30, \"maxResults\": 20, \"reasoning\": \"next few weeks\"}\n```",
            &BUCKETS,
        )
        .expect("valid parameters");

        assert_eq!(parsed.days, 30);
        assert_eq!(parsed.max_results, Some(20));
        assert_eq!(parsed.reasoning, "next few weeks");
    }

    #[test]
    fn rejects_missing_or_unlisted_days() {
        assert_eq!(
            parse_parameters("{\"maxResults\": 5}", &BUCKETS),
            Err(ParameterParseError::MissingDays)
        );
        assert_eq!(
            parse_parameters("{\"days\": 7}", &BUCKETS),
            Err(ParameterParseError::DaysNotAllowed("7".to_string()))
        );
        assert_eq!(
            parse_parameters("{\"days\": \"10\"}", &BUCKETS),
            Err(ParameterParseError::DaysNotAllowed("\"10\"".to_string()))
        );
        assert_eq!(
            parse_parameters("sure! here you go", &BUCKETS),
            Err(ParameterParseError::NotAnObject)
        );
    }

    #[test]
    fn invalid_parameters_fall_back_to_default_window() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let config = CalendarPipelineConfig::default();

        let (window, source) =
            resolve_window(&parse_parameters("not json", &BUCKETS), now, &config);

        assert_eq!(source, ParameterSource::Default);
        assert_eq!(window.start, now);
        assert_eq!(window.end, now + Duration::days(7));
        assert_eq!(window.max_results, 50);
    }

    #[test]
    fn model_window_clamps_max_results_to_cap() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let config = CalendarPipelineConfig::default();

        let (window, source) = resolve_window(
            &parse_parameters("{\"days\": 100, \"maxResults\": 9000}", &BUCKETS),
            now,
            &config,
        );
        assert_eq!(source, ParameterSource::Model);
        assert_eq!(window.end, now + Duration::days(100));
        assert_eq!(window.max_results, 250);

        let (window, _) =
            resolve_window(&parse_parameters("{\"days\": 10}", &BUCKETS), now, &config);
        assert_eq!(window.max_results, 50);
    }
}
