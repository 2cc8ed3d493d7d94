use directories::ProjectDirs;
use log::{info, warn};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::view::DEFAULT_PAGE_SIZE;

pub const DEFAULT_API_BASE: &str = concat!(
    "https://script.google.com/macros/s/",
    "AKfycbx7ghGSC47jyKY5ArI2s1JpO3UILEHVzmfaHxYxG3sLYfN3QDyFYWnXFStRLHvdJGtXRQ/exec"
);
const DEFAULT_TIMEOUT_SECS: &str = "30";
const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_PUBLIC_URL: &str = "http://127.0.0.1:3000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {key} value: {message}")]
    Invalid { key: String, message: String },
}

/// Runtime settings shared by the terminal client and the web front end
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Script endpoint every action is sent to
    pub api_base: String,

    pub page_size: usize,

    /// Per-request timeout; `None` waits as long as the server takes
    pub timeout: Option<Duration>,

    /// Request `callback(...)` wrapped replies
    pub jsonp: bool,

    /// Where the terminal client keeps token and company between runs
    pub session_file: PathBuf,

    /// Listen address of the web front end
    pub bind: String,

    /// Base URL used in shareable dashboard links
    pub public_url: String,
}

impl Config {
    /// Read the `NEXCARD_*` environment variables, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::load`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let page_size: usize =
            try_load(&lookup, "NEXCARD_PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())?;
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "NEXCARD_PAGE_SIZE".into(),
                message: "page size must be at least 1".into(),
            });
        }
        let timeout_secs: u64 = try_load(&lookup, "NEXCARD_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let session_file = match lookup("NEXCARD_SESSION_FILE") {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => default_session_file(),
        };

        Ok(Config {
            api_base: try_load(&lookup, "NEXCARD_API_BASE", DEFAULT_API_BASE)?,
            page_size,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            jsonp: try_load(&lookup, "NEXCARD_JSONP", "false")?,
            session_file,
            bind: try_load(&lookup, "NEXCARD_BIND", DEFAULT_BIND)?,
            public_url: try_load(&lookup, "NEXCARD_PUBLIC_URL", DEFAULT_PUBLIC_URL)?,
        })
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        });
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        }
    })
}

fn default_session_file() -> PathBuf {
    match ProjectDirs::from("com", "nexcard", "nexcard-panel") {
        Some(dirs) => dirs.data_dir().join("session.json"),
        None => {
            warn!("No home directory found, keeping the session next to the binary");
            PathBuf::from("nexcard-session.json")
        }
    }
}
