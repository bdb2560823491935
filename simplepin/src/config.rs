use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::preferences::{PreferencesError, default_preferences_path};

const DEFAULT_API_URL: &str = "https://api.pinboard.in";
const DEFAULT_POLL_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REACHABILITY_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SIMPLEPIN_API_URL is not a valid url: {0}")]
    InvalidApiUrl(#[from] url::ParseError),
    #[error("home directory is unavailable for {0}")]
    MissingHomeDir(String),
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_url: Url,
    pub preferences_path: PathBuf,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub reachability_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), dirs::home_dir())
    }

    fn from_lookup<F>(lookup: F, home: Option<PathBuf>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = Url::parse(
            lookup("SIMPLEPIN_API_URL")
                .as_deref()
                .unwrap_or(DEFAULT_API_URL),
        )?;
        let preferences_path = match lookup("SIMPLEPIN_PREFS_PATH") {
            Some(value) if value.starts_with('~') => {
                let home = home.ok_or_else(|| ConfigError::MissingHomeDir(value.clone()))?;
                expand_with_home(&value, &home)
            }
            Some(value) => PathBuf::from(value),
            None => default_preferences_path()?,
        };
        let poll_interval = Duration::from_secs(read_u64(
            lookup("SIMPLEPIN_POLL_SECS"),
            DEFAULT_POLL_SECS,
        ));
        let request_timeout = Duration::from_secs(read_u64(
            lookup("SIMPLEPIN_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));
        let reachability_timeout = Duration::from_millis(read_u64(
            lookup("SIMPLEPIN_REACHABILITY_TIMEOUT_MS"),
            DEFAULT_REACHABILITY_TIMEOUT_MS,
        ));

        Ok(Self {
            api_url,
            preferences_path,
            poll_interval,
            request_timeout,
            reachability_timeout,
        })
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
