//! Service configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub host: String,
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Period of the in-process notification ticker. `None` leaves passes to
    /// an external scheduler calling `/tasks/notify`.
    pub notify_interval: Option<Duration>,
    /// Directory for the daily rolling log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            db_path: PathBuf::from("./data/task-reminder.db"),
            notify_interval: Some(Duration::from_secs(60)),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Read `REMINDER_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let notify_interval = match get("REMINDER_NOTIFY_INTERVAL_SECS") {
            Some(raw) => match parse::<u64>("REMINDER_NOTIFY_INTERVAL_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => defaults.notify_interval,
        };

        Ok(Self {
            host: get("REMINDER_HOST").unwrap_or(defaults.host),
            port: get("REMINDER_PORT")
                .map(|raw| parse("REMINDER_PORT", &raw))
                .transpose()?
                .unwrap_or(defaults.port),
            db_path: get("REMINDER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            notify_interval,
            log_dir: get("REMINDER_LOG_DIR").map(PathBuf::from),
        })
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}
