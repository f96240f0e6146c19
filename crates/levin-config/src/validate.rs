//! Field validation for loaded configuration.

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::LevinConfig;

/// Validate every section of the configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first offending field.
pub fn validate(config: &LevinConfig) -> ConfigResult<()> {
    let settings = &config.settings;
    non_negative_gb("min_free_gb", settings.min_free_gb)?;
    non_negative_gb("max_storage_gb", settings.max_storage_gb)?;

    if !(0.0..=1.0).contains(&settings.min_free_percentage) {
        return Err(invalid(
            "settings",
            "min_free_percentage",
            Some(settings.min_free_percentage.to_string()),
            "must be between 0 and 1",
        ));
    }
    if settings.disk_check_interval_secs == 0 {
        return Err(invalid(
            "settings",
            "disk_check_interval_secs",
            Some("0".to_string()),
            "must be greater than zero",
        ));
    }
    if settings.stun_server.trim().is_empty() {
        return Err(invalid("settings", "stun_server", None, "must not be empty"));
    }

    let fetch = &config.fetch;
    if fetch.max_attempts == 0 {
        return Err(invalid(
            "fetch",
            "max_attempts",
            Some("0".to_string()),
            "must be greater than zero",
        ));
    }
    if fetch.timeout_secs == 0 {
        return Err(invalid(
            "fetch",
            "timeout_secs",
            Some("0".to_string()),
            "must be greater than zero",
        ));
    }
    match Url::parse(&fetch.manifest_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(invalid(
                "fetch",
                "manifest_url",
                Some(fetch.manifest_url.clone()),
                "must be an absolute http(s) URL",
            ));
        }
    }

    for (field, path) in [
        ("watch_dir", &config.paths.watch_dir),
        ("data_dir", &config.paths.data_dir),
        ("state_dir", &config.paths.state_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(invalid("paths", field, None, "must not be empty"));
        }
    }
    Ok(())
}

fn non_negative_gb(field: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(
            "settings",
            field,
            Some(value.to_string()),
            "must be a non-negative number",
        ))
    }
}

const fn invalid(
    section: &'static str,
    field: &'static str,
    value: Option<String>,
    reason: &'static str,
) -> ConfigError {
    ConfigError::InvalidField {
        section,
        field,
        value,
        reason,
    }
}
