//! Runtime setting keys and values.

use serde::{Deserialize, Serialize};

/// Detection interval in seconds.
pub const CHECK_INTERVAL: &str = "check_interval";
/// Global notification switch.
pub const BOT_ACTIVE: &str = "bot_active";
/// Destination chat for alerts.
pub const NOTIFICATION_GROUP_ID: &str = "notification_group_id";

/// A typed setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl SettingValue {
    /// Parse user input: integers first, then booleans, otherwise text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return SettingValue::Int(n);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" => SettingValue::Bool(true),
            "false" | "off" | "no" => SettingValue::Bool(false),
            _ => SettingValue::Text(trimmed.to_string()),
        }
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}
