//! Configuration discovery, parsing and path expansion.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::LevinConfig;
use crate::validate::validate;

/// Default config file location: `$XDG_CONFIG_HOME/levin/levin.toml`,
/// falling back to `~/.config/levin/levin.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("levin").join(defaults::CONFIG_FILE))
}

/// Load, expand and validate the configuration.
///
/// `path` overrides discovery. A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file exists but cannot be read,
/// [`ConfigError::Parse`] for malformed TOML or unknown keys, and the
/// validation errors of [`validate`].
pub fn load(path: Option<&Path>) -> ConfigResult<LevinConfig> {
    let resolved = path.map(Path::to_path_buf).or_else(default_config_path);
    let mut config = match resolved {
        Some(path) => read_file(&path)?,
        None => {
            debug!("no configuration directory available; using defaults");
            LevinConfig::default()
        }
    };

    let home = dirs::home_dir();
    let lookup = |name: &str| env::var(name).ok();
    for dir in [
        &mut config.paths.watch_dir,
        &mut config.paths.data_dir,
        &mut config.paths.state_dir,
    ] {
        let raw = dir.to_string_lossy().into_owned();
        *dir = expand_path(&raw, home.as_deref(), lookup)?;
    }

    validate(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> ConfigResult<LevinConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "configuration file not found; using defaults");
            return Ok(LevinConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                operation: "read_config",
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Render the configuration as TOML.
///
/// # Errors
///
/// Returns [`ConfigError::Serialize`] if rendering fails.
pub fn to_toml(config: &LevinConfig) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize { source })
}

/// Expand a leading `~` to `home` and `$VAR`/`${VAR}` references via `lookup`.
///
/// Unset variables expand to nothing; a `$` not followed by a name is kept.
///
/// # Errors
///
/// Returns [`ConfigError::HomeUnavailable`] when the path starts with `~`
/// and no home directory is known, and [`ConfigError::InvalidField`] for an
/// unclosed `${`.
pub fn expand_path<F>(raw: &str, home: Option<&Path>, lookup: F) -> ConfigResult<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;

    if rest == "~" || rest.starts_with("~/") {
        let home = home.ok_or_else(|| ConfigError::HomeUnavailable {
            raw: raw.to_string(),
        })?;
        expanded.push_str(&home.to_string_lossy());
        rest = &rest[1..];
    }

    let mut chars = rest.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            expanded.push(ch);
            continue;
        }
        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == '}' {
                    closed = true;
                    break;
                }
                name.push(next);
            }
            if !closed {
                return Err(ConfigError::InvalidField {
                    section: "paths",
                    field: "path",
                    value: Some(raw.to_string()),
                    reason: "unclosed variable reference",
                });
            }
        } else {
            while let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                expanded.push('$');
                continue;
            }
        }
        if let Some(value) = lookup(&name) {
            expanded.push_str(&value);
        }
    }

    Ok(PathBuf::from(expanded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(name: &str) -> Option<String> {
        match name {
            "XDG_DATA_HOME" => Some("/xdg/data".to_string()),
            "USER" => Some("ada".to_string()),
            _ => None,
        }
    }

    #[test]
    fn expands_home_and_variables() -> ConfigResult<()> {
        let home = Path::new("/home/ada");
        assert_eq!(
            expand_path("~/.cache/levin", Some(home), vars)?,
            PathBuf::from("/home/ada/.cache/levin")
        );
        assert_eq!(
            expand_path("$XDG_DATA_HOME/levin", Some(home), vars)?,
            PathBuf::from("/xdg/data/levin")
        );
        assert_eq!(
            expand_path("/srv/${USER}_seed/$MISSING/x", Some(home), vars)?,
            PathBuf::from("/srv/ada_seed//x")
        );
        assert_eq!(
            expand_path("/opt/~cache", Some(home), vars)?,
            PathBuf::from("/opt/~cache")
        );
        Ok(())
    }

    #[test]
    fn bare_dollar_signs_are_kept() -> ConfigResult<()> {
        let home = Path::new("/home/ada");
        assert_eq!(
            expand_path("/srv/$", Some(home), vars)?,
            PathBuf::from("/srv/$")
        );
        assert_eq!(expand_path("$/x", Some(home), vars)?, PathBuf::from("$/x"));
        assert_eq!(
            expand_path("/srv/$$USER", Some(home), vars)?,
            PathBuf::from("/srv/$ada")
        );
        Ok(())
    }

    #[test]
    fn unclosed_braces_are_rejected() {
        let err = expand_path("/srv/${USER/x", None, vars).expect_err("unclosed brace");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                reason: "unclosed variable reference",
                ..
            }
        ));
    }

    #[test]
    fn tilde_without_home_is_an_error() {
        let err = expand_path("~/x", None, vars).expect_err("home required");
        assert!(matches!(err, ConfigError::HomeUnavailable { .. }));
    }
}
