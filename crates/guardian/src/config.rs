//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use repositories::RetentionPolicy;
use safety_api::BackendConfig;

const DEFAULT_DATABASE_URL: &str = "sqlite:guardian.db?mode=rwc";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL.
    pub database_url: String,
    /// Remote backend connection.
    pub backend: BackendConfig,
    /// Account the alerts and locations belong to.
    pub user_id: String,
    /// Location history retention.
    pub retention: RetentionPolicy,
    /// Periodic sync pass interval.
    pub sync_interval: Duration,
    /// Backend health probe interval.
    pub health_interval: Duration,
    /// Whether the emergency call may be placed.
    pub call_permission: bool,
    /// Whether emergency texts may be sent.
    pub sms_permission: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `GUARDIAN_DATABASE_URL` | SQLite database URL | `sqlite:guardian.db?mode=rwc` |
    /// | `GUARDIAN_BACKEND_URL` | Backend base URL | `http://127.0.0.1:8000/safewomen/api` |
    /// | `GUARDIAN_AUTH_TOKEN` | Bearer token | none |
    /// | `GUARDIAN_USER_ID` | Account id | (required) |
    /// | `GUARDIAN_RETENTION_DAYS` | Location history age limit | `30` |
    /// | `GUARDIAN_MAX_LOCATIONS` | Location history size limit | `100` |
    /// | `GUARDIAN_SYNC_INTERVAL_SECS` | Periodic sync interval | `900` |
    /// | `GUARDIAN_HEALTH_INTERVAL_SECS` | Health probe interval | `30` |
    /// | `GUARDIAN_CALL_PERMISSION` | Calls allowed | `true` |
    /// | `GUARDIAN_SMS_PERMISSION` | Texts allowed | `true` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("GUARDIAN_DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let mut backend = BackendConfig::default();
        if let Some(url) = var("GUARDIAN_BACKEND_URL") {
            backend.base_url = url;
        }
        if let Some(token) = var("GUARDIAN_AUTH_TOKEN") {
            backend = backend.with_token(token);
        }

        let user_id = var("GUARDIAN_USER_ID").ok_or(ConfigError::MissingUserId)?;

        let defaults = RetentionPolicy::default();
        let retention = RetentionPolicy {
            max_age: match var("GUARDIAN_RETENTION_DAYS") {
                Some(v) => Duration::from_secs(parse::<u64>("GUARDIAN_RETENTION_DAYS", &v)? * 86_400),
                None => defaults.max_age,
            },
            max_samples: match var("GUARDIAN_MAX_LOCATIONS") {
                Some(v) => parse("GUARDIAN_MAX_LOCATIONS", &v)?,
                None => defaults.max_samples,
            },
        };

        let sync_interval = seconds(&var, "GUARDIAN_SYNC_INTERVAL_SECS", 15 * 60)?;
        let health_interval = seconds(&var, "GUARDIAN_HEALTH_INTERVAL_SECS", 30)?;

        let call_permission = flag(&var, "GUARDIAN_CALL_PERMISSION")?;
        let sms_permission = flag(&var, "GUARDIAN_SMS_PERMISSION")?;

        Ok(Self {
            database_url,
            backend,
            user_id,
            retention,
            sync_interval,
            health_interval,
            call_permission,
            sms_permission,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn seconds(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = match var(key) {
        Some(v) => parse::<u64>(key, &v)?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn flag(var: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<bool, ConfigError> {
    let Some(value) = var(key) else {
        return Ok(true);
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GUARDIAN_USER_ID environment variable is required")]
    MissingUserId,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
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
    fn test_defaults() {
        let config = load(&[("GUARDIAN_USER_ID", "42")]).unwrap();
        assert_eq!(config.user_id, "42");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.backend.base_url, safety_api::config::DEFAULT_BASE_URL);
        assert_eq!(config.backend.auth_token, None);
        assert_eq!(config.retention.max_samples, 100);
        assert_eq!(config.retention.max_age, Duration::from_secs(30 * 86_400));
        assert_eq!(config.sync_interval, Duration::from_secs(900));
        assert_eq!(config.health_interval, Duration::from_secs(30));
        assert!(config.call_permission);
        assert!(config.sms_permission);
    }

    #[test]
    fn test_user_id_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingUserId)));
        assert!(matches!(
            load(&[("GUARDIAN_USER_ID", "  ")]),
            Err(ConfigError::MissingUserId)
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("GUARDIAN_USER_ID", "42"),
            ("GUARDIAN_BACKEND_URL", "https://safety.example.org/api"),
            ("GUARDIAN_AUTH_TOKEN", "secret"),
            ("GUARDIAN_RETENTION_DAYS", "7"),
            ("GUARDIAN_MAX_LOCATIONS", "20"),
            ("GUARDIAN_SYNC_INTERVAL_SECS", "60"),
            ("GUARDIAN_CALL_PERMISSION", "no"),
            ("GUARDIAN_SMS_PERMISSION", "1"),
        ])
        .unwrap();
        assert_eq!(config.backend.base_url, "https://safety.example.org/api");
        assert_eq!(config.backend.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.retention.max_age, Duration::from_secs(7 * 86_400));
        assert_eq!(config.retention.max_samples, 20);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert!(!config.call_permission);
        assert!(config.sms_permission);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("GUARDIAN_USER_ID", "42"), ("GUARDIAN_MAX_LOCATIONS", "many")]),
            Err(ConfigError::Invalid { key: "GUARDIAN_MAX_LOCATIONS", .. })
        ));
        assert!(matches!(
            load(&[("GUARDIAN_USER_ID", "42"), ("GUARDIAN_HEALTH_INTERVAL_SECS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            load(&[("GUARDIAN_USER_ID", "42"), ("GUARDIAN_SMS_PERMISSION", "maybe")]),
            Err(ConfigError::Invalid { key: "GUARDIAN_SMS_PERMISSION", .. })
        ));
    }
}
