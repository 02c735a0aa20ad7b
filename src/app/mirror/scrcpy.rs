use serde::{Deserialize, Serialize};

use crate::app::config::MirrorSettings;
use crate::app::error::AppError;

/// Major version assumed when `scrcpy --version` cannot be parsed.
pub const DEFAULT_MAJOR_VERSION: u32 = 2;

/// Per-launch overrides. Absent fields fall back to the configured settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorOptions {
    pub fps: Option<u32>,
    pub bitrate_mbps: Option<u32>,
    pub max_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMirrorOptions {
    pub fps: u32,
    pub bitrate_mbps: u32,
    pub max_size: u32,
}

/// Rejects explicit zeros; everything else resolves against `settings`, whose
/// zeros were already replaced by defaults when the config was loaded.
pub fn resolve_options(
    options: &MirrorOptions,
    settings: &MirrorSettings,
    trace_id: &str,
) -> Result<ResolvedMirrorOptions, AppError> {
    let defaults = MirrorSettings::default();
    let pick = |value: Option<u32>, configured: u32, fallback: u32, field: &str| {
        match value {
            Some(0) => Err(AppError::validation(
                format!("{field} must be a positive integer"),
                trace_id,
            )),
            Some(value) => Ok(value),
            None if configured > 0 => Ok(configured),
            None => Ok(fallback),
        }
    };
    Ok(ResolvedMirrorOptions {
        fps: pick(options.fps, settings.fps, defaults.fps, "fps")?,
        bitrate_mbps: pick(
            options.bitrate_mbps,
            settings.bitrate_mbps,
            defaults.bitrate_mbps,
            "bitrate",
        )?,
        max_size: pick(options.max_size, settings.max_size, defaults.max_size, "max_size")?,
    })
}

/// Arguments after the program name. The bit-rate flag was renamed in 2.0.
pub fn build_scrcpy_args(
    serial: &str,
    options: &ResolvedMirrorOptions,
    settings: &MirrorSettings,
    major_version: u32,
) -> Vec<String> {
    let mut args = vec!["-s".to_string(), serial.to_string()];
    args.push("--max-fps".to_string());
    args.push(options.fps.to_string());
    if major_version >= 2 {
        args.push("--video-bit-rate".to_string());
    } else {
        args.push("--bit-rate".to_string());
    }
    args.push(format!("{}M", options.bitrate_mbps));
    args.push("--max-size".to_string());
    args.push(options.max_size.to_string());
    if !settings.window_title.trim().is_empty() {
        args.push("--window-title".to_string());
        args.push(settings.window_title.trim().to_string());
    }
    if settings.turn_screen_off {
        args.push("--turn-screen-off".to_string());
    }
    if settings.stay_awake {
        args.push("--stay-awake".to_string());
    }
    if settings.always_on_top {
        args.push("--always-on-top".to_string());
    }
    // Audio forwarding exists from 2.0 on and is enabled by default there.
    if major_version >= 2 && !settings.enable_audio {
        args.push("--no-audio".to_string());
    }
    args.extend(settings.extra_args.split_whitespace().map(str::to_string));
    args
}

pub fn parse_scrcpy_major(output: &str) -> u32 {
    let lower = output.to_lowercase();
    let mut tokens = lower.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if let Some(version) = token.strip_prefix("scrcpy") {
            let version = if version.is_empty() {
                tokens.peek().copied().unwrap_or("")
            } else {
                version
            };
            if let Some(major) = leading_number(version.trim_start_matches('v')) {
                return major;
            }
        }
    }
    DEFAULT_MAJOR_VERSION
}

fn leading_number(value: &str) -> Option<u32> {
    value.split('.').next()?.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|item| item == flag)
    }

    fn resolved() -> ResolvedMirrorOptions {
        resolve_options(&MirrorOptions::default(), &MirrorSettings::default(), "t").expect("defaults")
    }

    #[test]
    fn defaults_resolve_to_60_8_1920() {
        assert_eq!(
            resolved(),
            ResolvedMirrorOptions {
                fps: 60,
                bitrate_mbps: 8,
                max_size: 1920
            }
        );
    }

    #[test]
    fn zero_values_are_rejected() {
        let options = MirrorOptions {
            fps: Some(0),
            ..MirrorOptions::default()
        };
        let err = resolve_options(&options, &MirrorSettings::default(), "t").expect_err("zero fps");
        assert!(err.is_validation());
        assert!(err.error.contains("fps"));

        let options = MirrorOptions {
            max_size: Some(0),
            ..MirrorOptions::default()
        };
        assert!(resolve_options(&options, &MirrorSettings::default(), "t").is_err());
    }

    #[test]
    fn bitrate_flag_follows_major_version() {
        let settings = MirrorSettings::default();
        let v2 = build_scrcpy_args("ABC", &resolved(), &settings, 2);
        assert!(has_flag(&v2, "--video-bit-rate"));
        assert!(!has_flag(&v2, "--bit-rate"));
        assert!(has_flag(&v2, "8M"));

        let v1 = build_scrcpy_args("ABC", &resolved(), &settings, 1);
        assert!(has_flag(&v1, "--bit-rate"));
        assert!(!has_flag(&v1, "--video-bit-rate"));
    }

    #[test]
    fn toggles_and_extra_args() {
        let settings = MirrorSettings {
            turn_screen_off: false,
            always_on_top: false,
            enable_audio: false,
            extra_args: "--no-control --show-touches".to_string(),
            ..MirrorSettings::default()
        };
        let args = build_scrcpy_args("ABC", &resolved(), &settings, 3);
        assert_eq!(&args[..2], &["-s".to_string(), "ABC".to_string()]);
        assert!(!has_flag(&args, "--turn-screen-off"));
        assert!(!has_flag(&args, "--always-on-top"));
        assert!(has_flag(&args, "--stay-awake"));
        assert!(has_flag(&args, "--no-audio"));
        assert!(has_flag(&args, "ADB Toolkit - Screen Mirror"));
        assert_eq!(args.last().map(String::as_str), Some("--show-touches"));

        let v1 = build_scrcpy_args("ABC", &resolved(), &settings, 1);
        assert!(!has_flag(&v1, "--no-audio"));
    }

    #[test]
    fn parses_major_version() {
        assert_eq!(parse_scrcpy_major("scrcpy 2.4 <https://github.com/Genymobile/scrcpy>"), 2);
        assert_eq!(parse_scrcpy_major("scrcpy 1.25 <https://github.com/Genymobile/scrcpy>"), 1);
        assert_eq!(parse_scrcpy_major("scrcpy v3.1"), 3);
        assert_eq!(parse_scrcpy_major("garbage"), DEFAULT_MAJOR_VERSION);
    }
}
