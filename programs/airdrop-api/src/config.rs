use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::constants::DEFAULT_TOTAL_SUPPLY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid {expected}: {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL; `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub db_idle_timeout: Duration,
    pub cors_origin: String,
    /// `None` disables admin operations.
    pub admin_token: Option<String>,
    pub environment: Environment,
    pub launch_date: NaiveDate,
    pub total_supply: i64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            host: "0.0.0.0".to_owned(),
            port: 3000,
            db_max_connections: 10,
            db_acquire_timeout: Duration::from_secs(10),
            db_idle_timeout: Duration::from_secs(30),
            cors_origin: "*".to_owned(),
            admin_token: None,
            environment: Environment::Production,
            launch_date: NaiveDate::from_ymd_opt(2025, 1, 12).unwrap_or_default(),
            total_supply: DEFAULT_TOTAL_SUPPLY,
            rate_limit_max_requests: 100,
            rate_limit_window: Duration::from_secs(15 * 60),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let environment = match get("APP_ENV").as_deref() {
            None => defaults.environment,
            Some(v) if v.eq_ignore_ascii_case("development") || v.eq_ignore_ascii_case("dev") => {
                Environment::Development
            }
            Some(v) if v.eq_ignore_ascii_case("production") || v.eq_ignore_ascii_case("prod") => {
                Environment::Production
            }
            Some(v) => {
                return Err(ConfigError::Invalid {
                    key: "APP_ENV",
                    expected: "environment (development|production)",
                    value: v.to_owned(),
                })
            }
        };

        let launch_date = match get("LAUNCH_DATE") {
            None => defaults.launch_date,
            Some(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|_| ConfigError::Invalid {
                key: "LAUNCH_DATE",
                expected: "date (YYYY-MM-DD)",
                value: v,
            })?,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", defaults.port)?,
            db_max_connections: parse(&get, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_acquire_timeout: Duration::from_secs(parse(
                &get,
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.db_acquire_timeout.as_secs(),
            )?),
            db_idle_timeout: Duration::from_secs(parse(
                &get,
                "DB_IDLE_TIMEOUT_SECS",
                defaults.db_idle_timeout.as_secs(),
            )?),
            cors_origin: get("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            admin_token: get("ADMIN_TOKEN"),
            environment,
            launch_date,
            total_supply: parse(&get, "TOTAL_SUPPLY", defaults.total_supply)?,
            rate_limit_max_requests: parse(
                &get,
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            )?,
            rate_limit_window: Duration::from_secs(parse(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window.as_secs(),
            )?),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected: "number",
            value,
        }),
    }
}
