//! Process settings read from environment variables.
//!
//! | Variable              | Meaning                                  |
//! |-----------------------|------------------------------------------|
//! | `ADHOCRACY_WS_URL`    | websocket subscriber; unset disables it  |
//! | `ADHOCRACY_LOG_LEVEL` | trace, debug, info, warn or error        |
//! | `ADHOCRACY_LOG_DIR`   | absolute log directory; unset logs to stderr |
//! | `ADHOCRACY_DB_PATH`   | SQLite file; unset uses an in-memory db  |
//!
//! Empty values count as unset.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use url::Url;

pub const WS_URL_VAR: &str = "ADHOCRACY_WS_URL";
pub const LOG_LEVEL_VAR: &str = "ADHOCRACY_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "ADHOCRACY_LOG_DIR";
pub const DB_PATH_VAR: &str = "ADHOCRACY_DB_PATH";

#[derive(Debug)]
pub enum ConfigError {
    InvalidUrl {
        value: String,
        source: url::ParseError,
    },
    /// Parsed, but not a `ws://` or `wss://` URL.
    UnsupportedScheme(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl { value, source } => {
                write!(f, "invalid {WS_URL_VAR} `{value}`: {source}")
            }
            Self::UnsupportedScheme(value) => {
                write!(f, "{WS_URL_VAR} must use ws:// or wss://, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidUrl { source, .. } => Some(source),
            Self::UnsupportedScheme(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub ws_url: Option<Url>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ws_url: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            db_path: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let ws_url = read(WS_URL_VAR).map(|value| parse_ws_url(&value)).transpose()?;
        Ok(Self {
            ws_url,
            log_level: read(LOG_LEVEL_VAR).unwrap_or_else(|| default_log_level().to_string()),
            log_dir: read(LOG_DIR_VAR).map(PathBuf::from),
            db_path: read(DB_PATH_VAR).map(PathBuf::from),
        })
    }
}

fn parse_ws_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        value: value.to_string(),
        source,
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Settings, DB_PATH_VAR, LOG_LEVEL_VAR, WS_URL_VAR};
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_disables_notifications() {
        let settings = settings(&[]).expect("defaults");
        assert_eq!(settings, Settings::default());
        assert!(settings.ws_url.is_none());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let settings = settings(&[(WS_URL_VAR, "  "), (DB_PATH_VAR, "")]).expect("settings");
        assert!(settings.ws_url.is_none());
        assert!(settings.db_path.is_none());
    }

    #[test]
    fn reads_url_and_level() {
        let settings = settings(&[
            (WS_URL_VAR, "ws://localhost:8080"),
            (LOG_LEVEL_VAR, "warn"),
        ])
        .expect("settings");
        assert_eq!(
            settings.ws_url.map(|url| url.to_string()),
            Some("ws://localhost:8080/".to_string())
        );
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn rejects_invalid_and_non_websocket_urls() {
        let invalid = settings(&[(WS_URL_VAR, "not a url")]).expect_err("invalid");
        assert!(matches!(invalid, ConfigError::InvalidUrl { .. }));

        let http = settings(&[(WS_URL_VAR, "http://localhost:8080")]).expect_err("scheme");
        assert!(matches!(http, ConfigError::UnsupportedScheme(_)));
    }
}
