use std::path::PathBuf;

use thiserror::Error;

use crate::config_env::{
    http_url_env, optional_trimmed_env, parse_u32_env, parse_u32_list_env, parse_u64_env,
    parse_usize_env, require_env, validate_http_url,
};
use crate::timezone::normalize_time_zone;

pub const DEFAULT_CALENDAR_DAY_BUCKETS: [u32; 4] = [10, 30, 100, 300];
pub const DEFAULT_CALENDAR_WINDOW_DAYS: u32 = 7;
pub const DEFAULT_CALENDAR_MAX_RESULTS: u32 = 50;
pub const DEFAULT_CALENDAR_MAX_RESULTS_CAP: u32 = 250;
pub const DEFAULT_HISTORY_WINDOW: usize = 20;
pub const DEFAULT_CHAT_HISTORY_MAX_TURNS: usize = 40;
pub const DEFAULT_DESCRIPTION_MAX_CHARS: usize = 50;

const DEFAULT_GOOGLE_CALENDAR_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    pub clerk_jwks_url: String,
    pub clerk_issuer: String,
    pub clerk_audience: String,
    pub clerk_jwks_cache_ttl_seconds: u64,
    pub clerk_jwks_stale_ttl_seconds: u64,
    pub calendar_description_max_chars: usize,
    pub chat_history_max_turns: usize,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub calendar_api_base_url: String,
    pub calendar_id: String,
    pub history_window: usize,
    pub request_timeout_ms: u64,
    pub stage_timeout_ms: u64,
    pub time_zone: String,
    pub calendar: CalendarPipelineConfig,
}

/// Tuning for the calendar pipeline's parameter stage.
///
/// `day_buckets` is the closed set of look-ahead windows the parameter model
/// may choose from; it is kept sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarPipelineConfig {
    pub day_buckets: Vec<u32>,
    pub default_window_days: u32,
    pub default_max_results: u32,
    pub max_results_cap: u32,
}

impl Default for CalendarPipelineConfig {
    fn default() -> Self {
        Self {
            day_buckets: DEFAULT_CALENDAR_DAY_BUCKETS.to_vec(),
            default_window_days: DEFAULT_CALENDAR_WINDOW_DAYS,
            default_max_results: DEFAULT_CALENDAR_MAX_RESULTS,
            max_results_cap: DEFAULT_CALENDAR_MAX_RESULTS_CAP,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let clerk_jwks_url = require_env("CLERK_JWKS_URL")?;
        validate_http_url("CLERK_JWKS_URL", &clerk_jwks_url)?;

        Ok(Self {
            bind_addr: optional_trimmed_env("API_BIND_ADDR")
                .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            database_url: optional_trimmed_env("DATABASE_URL"),
            database_max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 10)?,
            migrations_dir: optional_trimmed_env("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations")
                }),
            clerk_jwks_url,
            clerk_issuer: require_env("CLERK_ISSUER")?,
            clerk_audience: require_env("CLERK_AUDIENCE")?,
            clerk_jwks_cache_ttl_seconds: parse_u64_env("CLERK_JWKS_CACHE_TTL_SECONDS", 300)?,
            clerk_jwks_stale_ttl_seconds: parse_u64_env("CLERK_JWKS_STALE_TTL_SECONDS", 300)?,
            calendar_description_max_chars: parse_usize_env(
                "CALENDAR_DESCRIPTION_MAX_CHARS",
                DEFAULT_DESCRIPTION_MAX_CHARS,
            )?,
            chat_history_max_turns: parse_usize_env(
                "CHAT_HISTORY_MAX_TURNS",
                DEFAULT_CHAT_HISTORY_MAX_TURNS,
            )?,
        })
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let time_zone = match optional_trimmed_env("JARVIS_TIME_ZONE") {
            Some(raw) => normalize_time_zone(&raw).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "JARVIS_TIME_ZONE is not a known IANA time zone: {raw}"
                ))
            })?,
            None => crate::timezone::DEFAULT_USER_TIME_ZONE.to_string(),
        };

        let calendar = CalendarPipelineConfig {
            day_buckets: parse_u32_list_env("CALENDAR_DAY_BUCKETS", &DEFAULT_CALENDAR_DAY_BUCKETS)?,
            default_window_days: parse_u32_env(
                "CALENDAR_DEFAULT_WINDOW_DAYS",
                DEFAULT_CALENDAR_WINDOW_DAYS,
            )?,
            default_max_results: parse_u32_env(
                "CALENDAR_DEFAULT_MAX_RESULTS",
                DEFAULT_CALENDAR_MAX_RESULTS,
            )?,
            max_results_cap: parse_u32_env(
                "CALENDAR_MAX_RESULTS_CAP",
                DEFAULT_CALENDAR_MAX_RESULTS_CAP,
            )?,
        };
        if calendar.max_results_cap == 0 || calendar.default_max_results == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "calendar result limits must be greater than 0".to_string(),
            ));
        }

        let history_window = validate_history_window(parse_usize_env(
            "JARVIS_HISTORY_WINDOW",
            DEFAULT_HISTORY_WINDOW,
        )?)?;

        Ok(Self {
            api_base_url: http_url_env("JARVIS_API_BASE_URL", DEFAULT_API_BASE_URL)?,
            calendar_api_base_url: http_url_env(
                "GOOGLE_CALENDAR_API_BASE_URL",
                DEFAULT_GOOGLE_CALENDAR_API_BASE_URL,
            )?,
            calendar_id: optional_trimmed_env("GOOGLE_CALENDAR_ID")
                .unwrap_or_else(|| "primary".to_string()),
            history_window,
            request_timeout_ms: parse_u64_env("JARVIS_REQUEST_TIMEOUT_MS", 60_000)?,
            stage_timeout_ms: parse_u64_env("JARVIS_STAGE_TIMEOUT_MS", 30_000)?,
            time_zone,
            calendar,
        })
    }

    /// Defaults for everything except the app endpoint base URL.
    pub fn with_api_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            calendar_api_base_url: DEFAULT_GOOGLE_CALENDAR_API_BASE_URL.to_string(),
            calendar_id: "primary".to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            request_timeout_ms: 60_000,
            stage_timeout_ms: 30_000,
            time_zone: crate::timezone::DEFAULT_USER_TIME_ZONE.to_string(),
            calendar: CalendarPipelineConfig::default(),
        }
    }
}

/// The window plus the new user turn must fit the server's default
/// `CHAT_HISTORY_MAX_TURNS`, or every chat request is rejected as too long.
fn validate_history_window(history_window: usize) -> Result<usize, ConfigError> {
    if history_window >= DEFAULT_CHAT_HISTORY_MAX_TURNS {
        return Err(ConfigError::InvalidConfiguration(format!(
            "JARVIS_HISTORY_WINDOW must be below {DEFAULT_CHAT_HISTORY_MAX_TURNS}, got {history_window}"
        )));
    }
    Ok(history_window)
}
