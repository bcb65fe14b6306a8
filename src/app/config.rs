use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AdbSettings {
    /// Path to the adb executable. Empty means `adb` from PATH.
    pub command_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutSettings {
    pub probe_secs: u64,
    pub devices_secs: u64,
    pub packages_secs: u64,
    pub uninstall_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            probe_secs: 5,
            devices_secs: 10,
            packages_secs: 60,
            uninstall_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub poll_interval_ms: u64,
    pub status_max_chars: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            status_max_chars: 100,
        }
    }
}

impl NotificationSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    pub refresh_interval_secs: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ADB_APP_MANAGER_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    home_dir().join(".adb_app_manager_config.json")
}

pub fn backup_config_path() -> PathBuf {
    home_dir().join(".adb_app_manager_config.backup.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

pub fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = TimeoutSettings::default();
    if config.timeouts.probe_secs == 0 {
        config.timeouts.probe_secs = defaults.probe_secs;
    }
    if config.timeouts.devices_secs == 0 {
        config.timeouts.devices_secs = defaults.devices_secs;
    }
    if config.timeouts.packages_secs == 0 {
        config.timeouts.packages_secs = defaults.packages_secs;
    }
    if config.timeouts.uninstall_secs == 0 {
        config.timeouts.uninstall_secs = defaults.uninstall_secs;
    }
    if !(10..=5_000).contains(&config.notifications.poll_interval_ms) {
        config.notifications.poll_interval_ms = 100;
    }
    if config.notifications.status_max_chars < 10 {
        config.notifications.status_max_chars = 100;
    }
    if config.device.refresh_interval_secs == 0 {
        config.device.refresh_interval_secs = 10;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = "info".to_string();
    }
    config
}
