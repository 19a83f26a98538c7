//! Operator commands: runtime settings and pair maintenance.
//!
//! Settings written here are picked up by the running bot on its next cycle.

use crate::config::{parse_threshold, AppConfig, ConfigError};
use divergence_alerts::{Database, DbError};
use divergence_core::{settings, PairId, SettingValue, SettingsStore, StoreError, WatchedPair};
use thiserror::Error;
use tracing::info;

/// Settings an operator may change.
pub const SETTING_KEYS: [&str; 3] = [
    settings::CHECK_INTERVAL,
    settings::BOT_ACTIVE,
    settings::NOTIFICATION_GROUP_ID,
];

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Unknown setting {0:?}, expected one of: check_interval, bot_active, notification_group_id")]
    UnknownSetting(String),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Pair not found: {0}")]
    PairNotFound(PairId),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Validate `raw` for a known setting key.
pub fn parse_setting(key: &str, raw: &str) -> Result<(&'static str, SettingValue), AdminError> {
    let key = SETTING_KEYS
        .iter()
        .copied()
        .find(|k| *k == key.trim())
        .ok_or_else(|| AdminError::UnknownSetting(key.to_string()))?;

    let invalid = || AdminError::InvalidValue {
        key,
        value: raw.to_string(),
    };

    let value = match (key, SettingValue::parse(raw)) {
        (settings::CHECK_INTERVAL, SettingValue::Int(secs)) if secs > 0 => SettingValue::Int(secs),
        (settings::CHECK_INTERVAL, _) => return Err(invalid()),
        (settings::BOT_ACTIVE, SettingValue::Bool(b)) => SettingValue::Bool(b),
        (settings::BOT_ACTIVE, _) => return Err(invalid()),
        (_, SettingValue::Text(t)) if t.is_empty() => return Err(invalid()),
        // Chat ids and @channel names are both fine
        (_, value @ (SettingValue::Int(_) | SettingValue::Text(_))) => value,
        (_, SettingValue::Bool(_)) => return Err(invalid()),
    };
    Ok((key, value))
}

pub async fn set_setting(
    store: &dyn SettingsStore,
    key: &str,
    raw: &str,
) -> Result<SettingValue, AdminError> {
    let (key, value) = parse_setting(key, raw)?;
    store.set(key, value.clone()).await?;
    info!(key = key, value = ?value, "Setting updated");
    Ok(value)
}

/// Effective value of every operator setting, with config fallbacks applied.
pub async fn show_settings(
    store: &dyn SettingsStore,
    config: &AppConfig,
) -> Result<Vec<(&'static str, String)>, AdminError> {
    let default_secs = i64::try_from(config.check_interval.as_secs()).unwrap_or(i64::MAX);
    let interval = match store.get_int(settings::CHECK_INTERVAL, default_secs).await? {
        secs if secs > 0 => secs,
        _ => default_secs,
    };
    let active = store.get_bool(settings::BOT_ACTIVE, true).await?;
    let group = store.get_string(settings::NOTIFICATION_GROUP_ID, "").await?;
    let group = match (group.trim(), &config.notification_group_id) {
        ("", Some(fallback)) => format!("{fallback} (default)"),
        ("", None) => "unset".to_string(),
        (dynamic, _) => dynamic.to_string(),
    };

    Ok(vec![
        (settings::CHECK_INTERVAL, format!("{interval}s")),
        (settings::BOT_ACTIVE, active.to_string()),
        (settings::NOTIFICATION_GROUP_ID, group),
    ])
}

/// Flip a pair between active and inactive. Returns the updated pair.
pub async fn toggle_pair(db: &Database, id: PairId) -> Result<WatchedPair, AdminError> {
    let mut pair = db.get_pair(id).await?.ok_or(AdminError::PairNotFound(id))?;
    pair.is_active = !pair.is_active;
    if !db.set_pair_active(id, pair.is_active).await? {
        return Err(AdminError::PairNotFound(id));
    }
    info!(id = id, symbol = %pair.symbol, active = pair.is_active, "Pair toggled");
    Ok(pair)
}

pub async fn set_threshold(db: &Database, id: PairId, raw: &str) -> Result<WatchedPair, AdminError> {
    let threshold = parse_threshold("threshold", raw)?;
    if !db.set_pair_threshold(id, threshold).await? {
        return Err(AdminError::PairNotFound(id));
    }
    let pair = db.get_pair(id).await?.ok_or(AdminError::PairNotFound(id))?;
    info!(id = id, symbol = %pair.symbol, threshold = threshold, "Threshold updated");
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use divergence_core::PairRegistry;
    use pretty_assertions::assert_eq;

    async fn db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[test]
    fn test_parse_setting_validates_per_key() {
        assert_eq!(
            parse_setting("check_interval", "600").unwrap(),
            (settings::CHECK_INTERVAL, SettingValue::Int(600))
        );
        assert_eq!(
            parse_setting("bot_active", "off").unwrap(),
            (settings::BOT_ACTIVE, SettingValue::Bool(false))
        );
        assert_eq!(
            parse_setting("notification_group_id", "-1001234567890").unwrap(),
            (settings::NOTIFICATION_GROUP_ID, SettingValue::Int(-1001234567890))
        );
        assert_eq!(
            parse_setting("notification_group_id", "@alerts").unwrap(),
            (settings::NOTIFICATION_GROUP_ID, SettingValue::Text("@alerts".into()))
        );

        assert!(matches!(
            parse_setting("check_interval", "0"),
            Err(AdminError::InvalidValue { key: "check_interval", .. })
        ));
        assert!(matches!(
            parse_setting("check_interval", "hourly"),
            Err(AdminError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_setting("bot_active", "maybe"),
            Err(AdminError::InvalidValue { key: "bot_active", .. })
        ));
        assert!(matches!(
            parse_setting("notification_group_id", "  "),
            Err(AdminError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_setting("dedup_window", "60"),
            Err(AdminError::UnknownSetting(_))
        ));
    }

    #[tokio::test]
    async fn test_set_and_show_settings() {
        let db = db().await;
        let config = AppConfig {
            notification_group_id: Some("-100999".into()),
            ..Default::default()
        };

        assert_eq!(
            show_settings(&db, &config).await.unwrap(),
            vec![
                (settings::CHECK_INTERVAL, "3600s".to_string()),
                (settings::BOT_ACTIVE, "true".to_string()),
                (settings::NOTIFICATION_GROUP_ID, "-100999 (default)".to_string()),
            ]
        );

        set_setting(&db, "check_interval", "900").await.unwrap();
        set_setting(&db, "bot_active", "false").await.unwrap();
        set_setting(&db, "notification_group_id", "-100123").await.unwrap();
        assert!(set_setting(&db, "bot_active", "later").await.is_err());

        assert_eq!(
            show_settings(&db, &config).await.unwrap(),
            vec![
                (settings::CHECK_INTERVAL, "900s".to_string()),
                (settings::BOT_ACTIVE, "false".to_string()),
                (settings::NOTIFICATION_GROUP_ID, "-100123".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_toggle_pair() {
        let db = db().await;
        let btc = db.add_pair("BTCUSDT", 5.0).await.unwrap();
        let eth = db.add_pair("ETHUSDT", 3.0).await.unwrap();

        let toggled = toggle_pair(&db, btc.id).await.unwrap();
        assert!(!toggled.is_active);
        assert_eq!(db.list_active().await.unwrap(), vec![eth]);

        assert!(toggle_pair(&db, btc.id).await.unwrap().is_active);
        assert_eq!(db.list_active().await.unwrap().len(), 2);

        assert!(matches!(
            toggle_pair(&db, 999).await,
            Err(AdminError::PairNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_set_threshold() {
        let db = db().await;
        let btc = db.add_pair("BTCUSDT", 5.0).await.unwrap();

        let updated = set_threshold(&db, btc.id, "2.5").await.unwrap();
        assert_eq!(updated.divergence_threshold, 2.5);
        assert_eq!(db.list_pairs().await.unwrap()[0].divergence_threshold, 2.5);

        assert!(matches!(
            set_threshold(&db, btc.id, "0").await,
            Err(AdminError::Config(ConfigError::Invalid { key: "threshold", .. }))
        ));
        assert!(matches!(
            set_threshold(&db, 999, "1.0").await,
            Err(AdminError::PairNotFound(999))
        ));
        assert_eq!(db.get_pair(btc.id).await.unwrap().unwrap().divergence_threshold, 2.5);
    }
}
