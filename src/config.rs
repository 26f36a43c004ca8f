use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::user_service::AuthSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Credentials for Google sign-in. Present only when all three variables are set.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_expire: Duration,
    pub frontend_url: String,
    pub bcrypt_cost: u32,
    pub overdue_sweep_interval: Duration,
    pub google: Option<GoogleConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let google = match (
            lookup("GOOGLE_CLIENT_ID"),
            lookup("GOOGLE_CLIENT_SECRET"),
            lookup("GOOGLE_CALLBACK_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(callback_url)) => Some(GoogleConfig {
                client_id,
                client_secret,
                callback_url,
            }),
            _ => None,
        };

        Ok(Self {
            port: parse("PORT", &or_default("PORT", "5000"))?,
            mongo_uri: required("MONGO_URI")?,
            database_name: or_default("DATABASE_NAME", "task_manager"),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expire: duration("JWT_EXPIRE", &or_default("JWT_EXPIRE", "7d"))?,
            frontend_url: or_default("FRONTEND_URL", "http://localhost:3000"),
            bcrypt_cost: parse("BCRYPT_COST", &or_default("BCRYPT_COST", "10"))?,
            overdue_sweep_interval: duration(
                "OVERDUE_SWEEP_INTERVAL",
                &or_default("OVERDUE_SWEEP_INTERVAL", "1h"),
            )?,
            google,
        })
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            jwt_secret: self.jwt_secret.clone(),
            jwt_ttl: self.jwt_expire,
            bcrypt_cost: self.bcrypt_cost,
            frontend_url: self.frontend_url.clone(),
        }
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn duration(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let parsed = humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if parsed.is_zero() {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}
