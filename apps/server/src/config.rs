//! Application configuration.
//!
//! Read from the process environment (after `.env` is loaded) and then
//! overridden by command-line flags in `main`.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("History retention ({retention_secs}s) must be longer than the dedup window ({window_secs}s)")]
    RetentionTooShort { retention_secs: u64, window_secs: u64 },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Telegram bot token.
    pub bot_token: Option<String>,
    /// Static default destination for alerts.
    pub notification_group_id: Option<String>,
    /// sqlx SQLite URL.
    pub database_url: String,
    /// Interval used when the `check_interval` setting is unset.
    pub check_interval: Duration,
    /// Threshold (%) for pairs added without an explicit one.
    pub default_threshold: f64,
    /// Minimum time between two findings for the same combination.
    pub dedup_window: Duration,
    /// Notified findings older than this are purged.
    pub history_retention_days: u64,
    /// Optional Binance API key.
    pub binance_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            notification_group_id: None,
            database_url: "sqlite://divergence.db".to_string(),
            check_interval: Duration::from_secs(3600),
            default_threshold: 5.0,
            dedup_window: Duration::from_secs(3600),
            history_retention_days: 30,
            binance_api_key: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            bot_token: get("BOT_TOKEN"),
            notification_group_id: get("NOTIFICATION_GROUP_ID"),
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            check_interval: match get("CHECK_INTERVAL") {
                Some(raw) => Duration::from_secs(parse_positive("CHECK_INTERVAL", &raw)?),
                None => defaults.check_interval,
            },
            default_threshold: match get("DEFAULT_DIVERGENCE_THRESHOLD") {
                Some(raw) => parse_threshold("DEFAULT_DIVERGENCE_THRESHOLD", &raw)?,
                None => defaults.default_threshold,
            },
            dedup_window: match get("DEDUP_WINDOW_SECS") {
                Some(raw) => Duration::from_secs(parse_positive("DEDUP_WINDOW_SECS", &raw)?),
                None => defaults.dedup_window,
            },
            history_retention_days: match get("HISTORY_RETENTION_DAYS") {
                Some(raw) => parse_positive("HISTORY_RETENTION_DAYS", &raw)?,
                None => defaults.history_retention_days,
            },
            binance_api_key: get("BINANCE_API_KEY"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retention_secs = self.history_retention().as_secs();
        let window_secs = self.dedup_window.as_secs();
        if retention_secs <= window_secs {
            return Err(ConfigError::RetentionTooShort {
                retention_secs,
                window_secs,
            });
        }
        Ok(())
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_days.saturating_mul(86_400))
    }

    /// The bot token, required unless running dry.
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token
            .as_deref()
            .ok_or(ConfigError::Missing("BOT_TOKEN"))
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Parse a threshold in percent: finite and greater than zero.
///
/// `key` names the source of `raw` in the error.
pub fn parse_threshold(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(t) if t.is_finite() && t > 0.0 => Ok(t),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.check_interval, Duration::from_secs(3600));
        assert_eq!(config.default_threshold, 5.0);
        assert_eq!(config.require_bot_token(), Err(ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("BOT_TOKEN", "123:abc"),
            ("NOTIFICATION_GROUP_ID", " -1001234567890 "),
            ("DATABASE_URL", "sqlite::memory:"),
            ("CHECK_INTERVAL", "600"),
            ("DEFAULT_DIVERGENCE_THRESHOLD", "2.5"),
            ("DEDUP_WINDOW_SECS", "1800"),
            ("HISTORY_RETENTION_DAYS", "7"),
            ("BINANCE_API_KEY", ""),
        ])
        .unwrap();

        assert_eq!(config.require_bot_token(), Ok("123:abc"));
        assert_eq!(config.notification_group_id.as_deref(), Some("-1001234567890"));
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.check_interval, Duration::from_secs(600));
        assert_eq!(config.default_threshold, 2.5);
        assert_eq!(config.dedup_window, Duration::from_secs(1800));
        assert_eq!(config.history_retention(), Duration::from_secs(7 * 86_400));
        assert_eq!(config.binance_api_key, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("CHECK_INTERVAL", "0")]),
            Err(ConfigError::Invalid { key: "CHECK_INTERVAL", .. })
        ));
        assert!(matches!(
            load(&[("CHECK_INTERVAL", "hourly")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            load(&[("DEFAULT_DIVERGENCE_THRESHOLD", "-1")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(parse_threshold("threshold", "NaN").is_err());
    }

    #[test]
    fn test_threshold_error_names_its_source() {
        assert_eq!(parse_threshold("--threshold", " 2.5 "), Ok(2.5));
        assert_eq!(
            parse_threshold("--threshold", "0"),
            Err(ConfigError::Invalid {
                key: "--threshold",
                value: "0".to_string(),
            })
        );
        assert_eq!(
            load(&[("DEFAULT_DIVERGENCE_THRESHOLD", "abc")]),
            Err(ConfigError::Invalid {
                key: "DEFAULT_DIVERGENCE_THRESHOLD",
                value: "abc".to_string(),
            })
        );
    }

    #[test]
    fn test_retention_must_exceed_window() {
        let result = load(&[
            ("DEDUP_WINDOW_SECS", "172800"),
            ("HISTORY_RETENTION_DAYS", "1"),
        ]);
        assert!(matches!(result, Err(ConfigError::RetentionTooShort { .. })));
    }
}
