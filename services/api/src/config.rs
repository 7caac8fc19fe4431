//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{FixedOffset, Offset, Utc};
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Signs e-mail confirmation and password reset links.
    pub secret_key: String,
    /// Absolute base URL used in links sent by e-mail.
    pub public_url: String,
    pub cors_origin: String,
    pub google_key: Option<String>,
    pub geocode_base_url: String,
    pub weather_key: Option<String>,
    pub weather_base_url: String,
    pub sendgrid_key: Option<String>,
    pub sendgrid_base_url: String,
    pub email_from: String,
    pub geocode_daily_limit: i32,
    pub weather_daily_limit: i32,
    pub email_daily_limit: i32,
    /// Caps the number of accounts that can be registered.
    pub max_users: Option<i64>,
    /// The time zone "today" is computed in.
    pub utc_offset: FixedOffset,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let secret_key = std::env::var("SECRET_KEY")
            .map_err(|_| ConfigError::MissingVar("SECRET_KEY".to_string()))?;
        if secret_key.len() < 16 {
            return Err(ConfigError::InvalidValue(
                "SECRET_KEY".to_string(),
                "must be at least 16 characters".to_string(),
            ));
        }

        let public_url = var_or("PUBLIC_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        // --- Load Provider Keys (as optional) ---
        let google_key = std::env::var("GOOGLE_KEY").ok();
        let weather_key = std::env::var("WEATHER_KEY").ok();
        let sendgrid_key = std::env::var("SENDGRID_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let geocode_base_url = var_or("GEOCODE_BASE_URL", "https://maps.googleapis.com");
        let weather_base_url = var_or("WEATHER_BASE_URL", "https://api.pirateweather.net");
        let sendgrid_base_url = var_or("SENDGRID_BASE_URL", "https://api.sendgrid.com");
        let email_from = var_or("EMAIL_FROM", "support@weathertoride.com");

        let geocode_daily_limit = parsed_or("GEOCODE_DAILY_LIMIT", 2500)?;
        let weather_daily_limit = parsed_or("WEATHER_DAILY_LIMIT", 1000)?;
        let email_daily_limit = parsed_or("EMAIL_DAILY_LIMIT", 50)?;

        let max_users = match std::env::var("MAX_USERS") {
            Ok(raw) => Some(raw.trim().parse::<i64>().map_err(|e| {
                ConfigError::InvalidValue("MAX_USERS".to_string(), e.to_string())
            })?),
            Err(_) => None,
        };

        let offset_minutes: i32 = parsed_or("UTC_OFFSET_MINUTES", 0)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            ConfigError::InvalidValue(
                "UTC_OFFSET_MINUTES".to_string(),
                format!("{offset_minutes} is outside of +/- 24 hours"),
            )
        })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            secret_key,
            public_url,
            cors_origin,
            google_key,
            geocode_base_url,
            weather_key,
            weather_base_url,
            sendgrid_key,
            sendgrid_base_url,
            email_from,
            geocode_daily_limit,
            weather_daily_limit,
            email_daily_limit,
            max_users,
            utc_offset,
        })
    }

    /// A configuration suitable for tests; nothing is read from the environment.
    pub fn test_default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: "postgres://localhost/weather_to_ride_test".to_string(),
            log_level: Level::DEBUG,
            secret_key: "test-secret-key-0123456789".to_string(),
            public_url: "http://localhost:3000".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            google_key: None,
            geocode_base_url: "http://localhost:9001".to_string(),
            weather_key: None,
            weather_base_url: "http://localhost:9002".to_string(),
            sendgrid_key: None,
            sendgrid_base_url: "http://localhost:9003".to_string(),
            email_from: "support@weathertoride.com".to_string(),
            geocode_daily_limit: 2500,
            weather_daily_limit: 1000,
            email_daily_limit: 50,
            max_users: None,
            utc_offset: Utc.fix(),
        }
    }
}
