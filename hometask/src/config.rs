use crate::integrations::rest::Credentials;
use crate::services::alarm_sync::DEFAULT_NOTIFY_BEFORE_MINUTES;
use chrono::TimeDelta;
use chrono_tz::Tz;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_SYNC_CRON: &str = "0 */15 * * * *";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub database_url: String,
    pub session_file: String,
    pub credentials: Option<Credentials>,
    pub notify_before: TimeDelta,
    pub sync_cron: String,
    pub timezone: Tz,
    pub bind: String,
    pub notify_command: Option<String>,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {}", e);
            }
        }
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).filter(|v| !v.trim().is_empty()).cloned();

        let api_url = get("HOMETASK_API_URL").ok_or(ConfigError::Missing("HOMETASK_API_URL"))?;

        let credentials = match (get("HOMETASK_USERNAME"), get("HOMETASK_PASSWORD")) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        let notify_before = match get("HOMETASK_NOTIFY_BEFORE_MINUTES") {
            Some(value) => match value.parse::<i64>() {
                Ok(minutes) if minutes >= 0 => TimeDelta::minutes(minutes),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "HOMETASK_NOTIFY_BEFORE_MINUTES",
                        value,
                    });
                }
            },
            None => TimeDelta::minutes(DEFAULT_NOTIFY_BEFORE_MINUTES),
        };

        let timezone = match get("HOMETASK_TIMEZONE") {
            Some(value) => value.parse::<Tz>().map_err(|_| ConfigError::Invalid {
                name: "HOMETASK_TIMEZONE",
                value,
            })?,
            None => Tz::UTC,
        };

        Ok(Self {
            api_url,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "hometask.db".to_string()),
            session_file: get("HOMETASK_SESSION_FILE")
                .unwrap_or_else(|| "session.json".to_string()),
            credentials,
            notify_before,
            sync_cron: get("HOMETASK_SYNC_CRON").unwrap_or_else(|| DEFAULT_SYNC_CRON.to_string()),
            timezone,
            bind: get("HOMETASK_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            notify_command: get("HOMETASK_NOTIFY_COMMAND"),
        })
    }
}
