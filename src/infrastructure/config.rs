use crate::infrastructure::audio::AlarmSound;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub alarm_sound: AlarmSound,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub debug_logging: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            alarm_sound: AlarmSound::default(),
            notifications_enabled: default_notifications_enabled(),
            debug_logging: false,
        }
    }
}

impl AppConfig {
    pub fn timezone(&self) -> Result<Tz, InfraError> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| InfraError::InvalidConfig(format!("unknown timezone: {}", self.timezone)))
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_app_json() -> serde_json::Value {
    serde_json::json!({
        "schema": SUPPORTED_SCHEMA,
        "timezone": "UTC",
        "alarmSound": "chime",
        "notificationsEnabled": true,
        "debugLogging": false
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_json())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let value = read_config(&path)?;
    let config: AppConfig = serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;
    config.timezone()?;
    Ok(config)
}
