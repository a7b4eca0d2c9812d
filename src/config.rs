use std::env;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_LINE_QUANTITY_CAP: u32 = 25;
const DEFAULT_EVENT_SUBJECT_PREFIX: &str = "dealer_po";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    Invalid { key: &'static str, expected: &'static str, value: String },

    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Runtime configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres connection string. Without it the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    pub event_subject_prefix: String,
    /// Upper bound for a single add and for a line's total quantity.
    pub line_quantity_cap: u32,
    /// JSON seed for the in-memory store.
    pub seed_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            port: DEFAULT_PORT,
            nats_url: None,
            event_subject_prefix: DEFAULT_EVENT_SUBJECT_PREFIX.to_string(),
            line_quantity_cap: DEFAULT_LINE_QUANTITY_CAP,
            seed_file: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            database_url: text("DATABASE_URL"),
            max_connections: parse_or(text("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", "integer", defaults.max_connections)?,
            port: parse_or(text("PORT"), "PORT", "port number", defaults.port)?,
            nats_url: text("NATS_URL"),
            event_subject_prefix: text("PO_EVENT_SUBJECT_PREFIX").unwrap_or(defaults.event_subject_prefix),
            line_quantity_cap: parse_or(text("PO_LINE_QUANTITY_CAP"), "PO_LINE_QUANTITY_CAP", "integer", defaults.line_quantity_cap)?,
            seed_file: text("SEED_FILE"),
        };

        if config.line_quantity_cap == 0 { return Err(ConfigError::Zero("PO_LINE_QUANTITY_CAP")); }
        if config.max_connections == 0 { return Err(ConfigError::Zero("DB_MAX_CONNECTIONS")); }
        Ok(config)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, expected, value }),
    }
}
