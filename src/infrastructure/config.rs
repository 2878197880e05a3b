use crate::domain::tracker::{MAX_DAY_DURATION_HOURS, RolloverPolicy};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_STORAGE_KEY: &str = "timeTracker";
const DEFAULT_DAY_DURATION_MINUTES: u32 = 7 * 60;
const DEFAULT_REFRESH_INTERVAL_SECONDS: u32 = 1;
const MAX_DAY_DURATION_MINUTES: u32 = MAX_DAY_DURATION_HOURS as u32 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RolloverConfig {
    pub reset_on_rollover: bool,
    pub rollover_window_hours: u32,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        let policy = RolloverPolicy::default();
        Self {
            reset_on_rollover: policy.reset_on_rollover,
            rollover_window_hours: policy.rollover_window.num_hours() as u32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    pub storage_key: String,
    pub day_duration_minutes: u32,
    pub rollover: RolloverConfig,
    pub refresh_interval_seconds: u32,
    /// IANA name used when rendering wall-clock times; the local zone when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA as u8,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            day_duration_minutes: DEFAULT_DAY_DURATION_MINUTES,
            rollover: RolloverConfig::default(),
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECONDS,
            timezone: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.storage_key.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "storageKey must not be empty".to_string(),
            ));
        }
        if self.day_duration_minutes == 0 || self.day_duration_minutes > MAX_DAY_DURATION_MINUTES {
            return Err(InfraError::InvalidConfig(format!(
                "dayDurationMinutes must be between 1 and {MAX_DAY_DURATION_MINUTES}"
            )));
        }
        if self.rollover.rollover_window_hours == 0 {
            return Err(InfraError::InvalidConfig(
                "rollover.rolloverWindowHours must be > 0".to_string(),
            ));
        }
        if self.refresh_interval_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "refreshIntervalSeconds must be > 0".to_string(),
            ));
        }
        self.timezone()?;
        Ok(())
    }

    pub fn storage_key(&self) -> &str {
        self.storage_key.trim()
    }

    pub fn day_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.day_duration_minutes))
    }

    pub fn rollover_policy(&self) -> RolloverPolicy {
        RolloverPolicy {
            reset_on_rollover: self.rollover.reset_on_rollover,
            rollover_window: chrono::Duration::hours(i64::from(
                self.rollover.rollover_window_hours,
            )),
        }
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.refresh_interval_seconds))
    }

    pub fn timezone(&self) -> Result<Option<Tz>, InfraError> {
        let Some(name) = self
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return Ok(None);
        };
        name.parse::<Tz>().map(Some).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}"))
        })
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(APP_JSON)
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_path(config_dir);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
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

pub fn load_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_path(config_dir);
    let value = read_config(&path)?;
    let config: AppConfig = serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}
