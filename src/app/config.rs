use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const CONFIG_PATH_ENV: &str = "ADB_TOOLKIT_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolSettings {
    /// Directory holding bundled `adb`/`fastboot` binaries.
    pub bin_dir: String,
    pub adb_path: String,
    pub fastboot_path: String,
    pub scrcpy_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSettings {
    pub refresh_interval_secs: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallSettings {
    pub replace_existing: bool,
    pub allow_downgrade: bool,
    pub grant_permissions: bool,
    pub allow_test_packages: bool,
    pub extra_args: String,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            replace_existing: true,
            allow_downgrade: false,
            grant_permissions: false,
            allow_test_packages: false,
            extra_args: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MirrorSettings {
    pub fps: u32,
    pub bitrate_mbps: u32,
    pub max_size: u32,
    pub window_title: String,
    pub turn_screen_off: bool,
    pub stay_awake: bool,
    pub always_on_top: bool,
    pub enable_audio: bool,
    pub extra_args: String,
    pub startup_grace_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            fps: 60,
            bitrate_mbps: 8,
            max_size: 1920,
            window_title: "ADB Toolkit - Screen Mirror".to_string(),
            turn_screen_off: true,
            stay_awake: true,
            always_on_top: true,
            enable_audio: true,
            extra_args: String::new(),
            startup_grace_ms: 1000,
            stop_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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
    pub tools: ToolSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub install: InstallSettings,
    #[serde(default)]
    pub mirror: MirrorSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    home_dir().join(".adb_toolkit_config.json")
}

pub fn backup_config_path() -> PathBuf {
    let path = config_path();
    path.with_extension("backup.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
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
    let payload = serde_json::to_string_pretty(&validate_config(config.clone()))
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

pub fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = MirrorSettings::default();
    if config.device.refresh_interval_secs < 1 {
        config.device.refresh_interval_secs = DeviceSettings::default().refresh_interval_secs;
    }
    if config.mirror.fps == 0 {
        config.mirror.fps = defaults.fps;
    }
    if config.mirror.bitrate_mbps == 0 {
        config.mirror.bitrate_mbps = defaults.bitrate_mbps;
    }
    if config.mirror.max_size == 0 {
        config.mirror.max_size = defaults.max_size;
    }
    if config.mirror.startup_grace_ms == 0 {
        config.mirror.startup_grace_ms = defaults.startup_grace_ms;
    }
    if config.mirror.stop_timeout_ms == 0 {
        config.mirror.stop_timeout_ms = defaults.stop_timeout_ms;
    }
    if config.mirror.window_title.trim().is_empty() {
        config.mirror.window_title = defaults.window_title;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = LoggingSettings::default().log_level;
    }
    config
}
