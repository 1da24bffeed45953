use std::env;

use url::Url;

use crate::config::ConfigError;

pub(crate) fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_trimmed_env(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

pub(crate) fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match optional_trimmed_env(key) {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_trimmed_env(key) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match optional_trimmed_env(key) {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_u32_list_env(key: &str, default: &[u32]) -> Result<Vec<u32>, ConfigError> {
    let Some(raw) = optional_trimmed_env(key) else {
        return Ok(default.to_vec());
    };

    parse_u32_list(key, &raw)
}

pub(crate) fn parse_u32_list(key: &str, raw: &str) -> Result<Vec<u32>, ConfigError> {
    let mut values = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u32>()
                .map_err(|_| ConfigError::ParseInt(key.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if values.is_empty() {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{key} must list at least one value"
        )));
    }

    values.sort_unstable();
    values.dedup();
    Ok(values)
}

pub(crate) fn http_url_env(key: &str, default: &str) -> Result<String, ConfigError> {
    let raw = optional_trimmed_env(key).unwrap_or_else(|| default.to_string());
    validate_http_url(key, &raw)?;
    Ok(raw.trim_end_matches('/').to_string())
}

pub(crate) fn validate_http_url(key: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(raw).map_err(|_| {
        ConfigError::InvalidConfiguration(format!("{key} must be an absolute URL"))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{key} must start with http:// or https://"
        )));
    }

    Ok(())
}

pub(crate) fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
