use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::app::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Device,
    Offline,
    Unauthorized,
    Recovery,
    Bootloader,
    Unknown,
}

impl DeviceState {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "device" => DeviceState::Device,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "recovery" => DeviceState::Recovery,
            "bootloader" => DeviceState::Bootloader,
            _ => DeviceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Device => "device",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Recovery => "recovery",
            DeviceState::Bootloader => "bootloader",
            DeviceState::Unknown => "unknown",
        }
    }
}

/// One roster entry as reported by `adb devices -l`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
    /// Every `key:value` token that followed the state column.
    pub properties: BTreeMap<String, String>,
}

impl Device {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.property("model")
    }

    pub fn product(&self) -> Option<&str> {
        self.property("product")
    }

    pub fn usb(&self) -> Option<&str> {
        self.property("usb")
    }

    pub fn transport_id(&self) -> Option<&str> {
        self.property("transport_id")
    }

    pub fn is_online(&self) -> bool {
        self.state == DeviceState::Device
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeviceInfoSnapshot {
    pub serial: String,
    pub model: Option<String>,
    pub brand: Option<String>,
    pub device: Option<String>,
    pub android_version: Option<String>,
    pub sdk_version: Option<String>,
    pub serial_number: Option<String>,
    pub bootloader: Option<String>,
    pub radio: Option<String>,
    pub cpu_abi: Option<String>,
    pub resolution: Option<String>,
    pub density: Option<String>,
    pub battery: Option<String>,
    pub boot_completed: Option<bool>,
    pub total_storage: Option<String>,
    pub free_storage: Option<String>,
    pub total_ram: Option<String>,
    pub free_ram: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RootCapability {
    pub available: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub roster: Vec<Device>,
    pub selected_serial: Option<String>,
    pub root: Option<RootCapability>,
    pub wireless_address: Option<String>,
    pub mirror_running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSelection {
    pub serial: String,
    pub root: RootCapability,
    pub info: DeviceInfoSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterUpdate {
    pub devices: Vec<Device>,
    /// Serial whose selection was dropped because it left the roster.
    pub cleared_selection: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchItemResult {
    pub identifier: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub results: Vec<BatchItemResult>,
    pub success_count: usize,
    pub total: usize,
}

impl BatchSummary {
    pub fn summary_line(&self) -> String {
        format!("Completed: {}/{}", self.success_count, self.total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub current: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size_bytes: Option<u64>,
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PackageInfo {
    pub package_name: String,
    pub version_name: Option<String>,
    pub apk_path: Option<String>,
    pub size: Option<String>,
    pub first_install_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScreenInfo {
    pub physical_size: Option<String>,
    pub override_size: Option<String>,
    pub physical_density: Option<String>,
    pub override_density: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenshotResult {
    pub serial: String,
    pub path: Option<String>,
    pub data_url: Option<String>,
    pub captured_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootloaderDevice {
    pub serial: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    pub command_path: String,
    pub version_output: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostCommandResult {
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RebootMode {
    #[default]
    Normal,
    Recovery,
    Bootloader,
    Fastboot,
}

impl RebootMode {
    pub fn parse(value: &str, trace_id: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "" | "normal" | "system" => Ok(RebootMode::Normal),
            "recovery" => Ok(RebootMode::Recovery),
            "bootloader" => Ok(RebootMode::Bootloader),
            "fastboot" | "fastbootd" => Ok(RebootMode::Fastboot),
            other => Err(AppError::validation(
                format!("Unsupported reboot mode: {other}"),
                trace_id,
            )),
        }
    }

    /// Argument passed after `reboot`; `None` reboots into the system.
    pub fn target(&self) -> Option<&'static str> {
        match self {
            RebootMode::Normal => None,
            RebootMode::Recovery => Some("recovery"),
            RebootMode::Bootloader => Some("bootloader"),
            RebootMode::Fastboot => Some("fastboot"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootloaderRebootMode {
    #[default]
    System,
    Recovery,
    Bootloader,
}

impl BootloaderRebootMode {
    pub fn parse(value: &str, trace_id: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "" | "system" | "normal" | "fastboot" => Ok(BootloaderRebootMode::System),
            "recovery" => Ok(BootloaderRebootMode::Recovery),
            "bootloader" => Ok(BootloaderRebootMode::Bootloader),
            other => Err(AppError::validation(
                format!("Unsupported bootloader reboot mode: {other}"),
                trace_id,
            )),
        }
    }

    pub fn target(&self) -> Option<&'static str> {
        match self {
            BootloaderRebootMode::System => None,
            BootloaderRebootMode::Recovery => Some("recovery"),
            BootloaderRebootMode::Bootloader => Some("bootloader"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstallErrorCode {
    Success,
    InstallFailedAlreadyExists,
    InstallFailedUpdateIncompatible,
    InstallFailedDuplicatePackage,
    InstallFailedOlderSdk,
    InstallFailedVersionDowngrade,
    InstallFailedInsufficientStorage,
    InstallFailedUserRestricted,
    InstallFailedVerificationFailure,
    InstallFailedInvalidApk,
    InstallFailedAborted,
    InstallFailedNoMatchingAbis,
    InstallFailedTestOnly,
    InstallParseFailedNotApk,
    InstallParseFailedNoCertificates,
    UnconfirmedResult,
    UnknownError,
}

impl InstallErrorCode {
    pub const FAILURE_CODES: [InstallErrorCode; 14] = [
        InstallErrorCode::InstallFailedAlreadyExists,
        InstallErrorCode::InstallFailedUpdateIncompatible,
        InstallErrorCode::InstallFailedDuplicatePackage,
        InstallErrorCode::InstallFailedOlderSdk,
        InstallErrorCode::InstallFailedVersionDowngrade,
        InstallErrorCode::InstallFailedInsufficientStorage,
        InstallErrorCode::InstallFailedUserRestricted,
        InstallErrorCode::InstallFailedVerificationFailure,
        InstallErrorCode::InstallFailedInvalidApk,
        InstallErrorCode::InstallFailedAborted,
        InstallErrorCode::InstallFailedNoMatchingAbis,
        InstallErrorCode::InstallFailedTestOnly,
        InstallErrorCode::InstallParseFailedNotApk,
        InstallErrorCode::InstallParseFailedNoCertificates,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            InstallErrorCode::Success => "SUCCESS",
            InstallErrorCode::InstallFailedAlreadyExists => "INSTALL_FAILED_ALREADY_EXISTS",
            InstallErrorCode::InstallFailedUpdateIncompatible => {
                "INSTALL_FAILED_UPDATE_INCOMPATIBLE"
            }
            InstallErrorCode::InstallFailedDuplicatePackage => "INSTALL_FAILED_DUPLICATE_PACKAGE",
            InstallErrorCode::InstallFailedOlderSdk => "INSTALL_FAILED_OLDER_SDK",
            InstallErrorCode::InstallFailedVersionDowngrade => "INSTALL_FAILED_VERSION_DOWNGRADE",
            InstallErrorCode::InstallFailedInsufficientStorage => {
                "INSTALL_FAILED_INSUFFICIENT_STORAGE"
            }
            InstallErrorCode::InstallFailedUserRestricted => "INSTALL_FAILED_USER_RESTRICTED",
            InstallErrorCode::InstallFailedVerificationFailure => {
                "INSTALL_FAILED_VERIFICATION_FAILURE"
            }
            InstallErrorCode::InstallFailedInvalidApk => "INSTALL_FAILED_INVALID_APK",
            InstallErrorCode::InstallFailedAborted => "INSTALL_FAILED_ABORTED",
            InstallErrorCode::InstallFailedNoMatchingAbis => "INSTALL_FAILED_NO_MATCHING_ABIS",
            InstallErrorCode::InstallFailedTestOnly => "INSTALL_FAILED_TEST_ONLY",
            InstallErrorCode::InstallParseFailedNotApk => "INSTALL_PARSE_FAILED_NOT_APK",
            InstallErrorCode::InstallParseFailedNoCertificates => {
                "INSTALL_PARSE_FAILED_NO_CERTIFICATES"
            }
            InstallErrorCode::UnconfirmedResult => "UNCONFIRMED_RESULT",
            InstallErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            InstallErrorCode::Success => "Installation successful",
            InstallErrorCode::InstallFailedAlreadyExists => {
                "App already installed with different signature"
            }
            InstallErrorCode::InstallFailedUpdateIncompatible => {
                "Update incompatible with existing installation"
            }
            InstallErrorCode::InstallFailedDuplicatePackage => "Package already exists on device",
            InstallErrorCode::InstallFailedOlderSdk => {
                "Device Android version too old for this APK"
            }
            InstallErrorCode::InstallFailedVersionDowngrade => {
                "Cannot downgrade - allow downgrade or uninstall first"
            }
            InstallErrorCode::InstallFailedInsufficientStorage => {
                "Not enough storage space on device"
            }
            InstallErrorCode::InstallFailedUserRestricted => "User restricted from installing apps",
            InstallErrorCode::InstallFailedVerificationFailure => "Package verification failed",
            InstallErrorCode::InstallFailedInvalidApk => "APK file is corrupted or invalid",
            InstallErrorCode::InstallFailedAborted => "Installation was aborted",
            InstallErrorCode::InstallFailedNoMatchingAbis => {
                "APK not compatible with device CPU architecture"
            }
            InstallErrorCode::InstallFailedTestOnly => "Test-only APK - allow test packages",
            InstallErrorCode::InstallParseFailedNotApk => "File is not a valid APK",
            InstallErrorCode::InstallParseFailedNoCertificates => "APK is not signed",
            InstallErrorCode::UnconfirmedResult => {
                "Installer exited cleanly without reporting Success"
            }
            InstallErrorCode::UnknownError => "Unknown installation error",
        }
    }
}
