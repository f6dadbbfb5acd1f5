//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use cv_builder_core::AutoSaveConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
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
    /// Where staged profile images are written before they are encoded.
    pub upload_dir: PathBuf,
    pub autosave_interval: Duration,
    pub flush_timeout: Duration,
    pub allowed_origin: String,
    pub auth_session_days: i64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server and Database Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));

        // --- Auto-save Tuning ---
        let autosave_interval = Duration::from_secs(positive_number(
            &lookup,
            "AUTOSAVE_INTERVAL_SECS",
            AutoSaveConfig::DEFAULT_INTERVAL.as_secs(),
        )?);
        let flush_timeout = Duration::from_secs(positive_number(
            &lookup,
            "FLUSH_TIMEOUT_SECS",
            AutoSaveConfig::DEFAULT_FLUSH_TIMEOUT.as_secs(),
        )?);

        // --- Browser Access ---
        let allowed_origin =
            lookup("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());
        let auth_session_days = positive_number(&lookup, "AUTH_SESSION_DAYS", 30)? as i64;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            upload_dir,
            autosave_interval,
            flush_timeout,
            allowed_origin,
            auth_session_days,
        })
    }

    /// Engine settings for each editor connection.
    pub fn autosave(&self) -> AutoSaveConfig {
        AutoSaveConfig::default()
            .with_interval(self.autosave_interval)
            .with_flush_timeout(self.flush_timeout)
    }
}

fn positive_number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a positive whole number", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/cv")]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.autosave_interval, Duration::from_secs(10));
        assert_eq!(config.flush_timeout, Duration::from_secs(30));
        assert_eq!(config.auth_session_days, 30);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(var)) if var == "DATABASE_URL"));
    }

    #[test]
    fn interval_overrides_flow_into_engine_config() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/cv"),
            ("AUTOSAVE_INTERVAL_SECS", "3"),
            ("FLUSH_TIMEOUT_SECS", "7"),
        ])
        .unwrap();
        let autosave = config.autosave();
        assert_eq!(autosave.interval, Duration::from_secs(3));
        assert_eq!(autosave.flush_timeout, Duration::from_secs(7));
        assert_eq!(autosave.saved_display, Duration::from_secs(2));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/cv"),
            ("AUTOSAVE_INTERVAL_SECS", "0"),
        ]);
        assert!(matches!(result, Err(ConfigError::InvalidValue(var, _)) if var == "AUTOSAVE_INTERVAL_SECS"));
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/cv"),
            ("RUST_LOG", "chatty"),
        ]);
        assert!(matches!(result, Err(ConfigError::InvalidValue(var, _)) if var == "RUST_LOG"));
    }
}
