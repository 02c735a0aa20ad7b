use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::app::models::{Device, DeviceInfoSnapshot, DeviceState, FileEntry, ScreenInfo};

const ROSTER_HEADER: &str = "list of devices";

/// Parses `adb devices -l`. Token 0 is the serial, token 1 the state, and every
/// later token containing a colon lands in `properties`.
pub fn parse_roster(output: &str) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('*'))
        .filter(|line| !line.to_lowercase().starts_with(ROSTER_HEADER))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let mut properties = BTreeMap::new();
            for token in tokens.iter().skip(2) {
                if let Some((key, value)) = token.split_once(':') {
                    if !key.is_empty() {
                        properties.insert(key.to_string(), value.to_string());
                    }
                }
            }
            Some(Device {
                serial: tokens[0].to_string(),
                state: DeviceState::from_token(tokens[1]),
                properties,
            })
        })
        .collect()
}

pub fn parse_getprop_map(output: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('[') {
            continue;
        }
        let Some((key_part, value_part)) = trimmed.split_once("]: [") else {
            continue;
        };
        let key = key_part.trim_start_matches('[').trim();
        let value = value_part.trim_end_matches(']').trim();
        if !key.is_empty() {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

/// Fills the property-backed fields of a snapshot. Empty values count as absent.
pub fn apply_getprop(snapshot: &mut DeviceInfoSnapshot, props: &HashMap<String, String>) {
    let get = |key: &str| {
        props
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    snapshot.model = get("ro.product.model");
    snapshot.brand = get("ro.product.brand");
    snapshot.device = get("ro.product.device");
    snapshot.android_version = get("ro.build.version.release");
    snapshot.sdk_version = get("ro.build.version.sdk");
    snapshot.serial_number = get("ro.serialno");
    snapshot.bootloader = get("ro.bootloader");
    snapshot.radio = get("gsm.version.baseband").or_else(|| get("ro.modem"));
    snapshot.cpu_abi = get("ro.product.cpu.abi");
    snapshot.boot_completed = get("sys.boot_completed").map(|value| value == "1");
}

/// `dumpsys battery` → rounded percentage. Both `level` and `scale` must be present.
pub fn parse_battery_percent(output: &str) -> Option<String> {
    let level_re = Regex::new(r"(?:^|[\s,;])level:\s*(\d+)").ok()?;
    let scale_re = Regex::new(r"(?:^|[\s,;])scale:\s*(\d+)").ok()?;
    let level: u64 = level_re.captures(output)?[1].parse().ok()?;
    let scale: u64 = scale_re.captures(output)?[1].parse().ok()?;
    if scale == 0 {
        return None;
    }
    let percent = (level as f64 / scale as f64 * 100.0).round() as u64;
    Some(format!("{percent}%"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
}

/// `df /data` in 1K blocks. Long filesystem names may wrap onto their own line,
/// so the first run of three numeric tokens after the header wins.
pub fn parse_df_usage(output: &str) -> Option<StorageUsage> {
    let tokens: Vec<&str> = output
        .lines()
        .filter(|line| !line.trim_start().starts_with("Filesystem"))
        .flat_map(str::split_whitespace)
        .collect();
    tokens.windows(3).find_map(|window| {
        let total_kb = window[0].parse::<u64>().ok()?;
        let used_kb = window[1].parse::<u64>().ok()?;
        let available_kb = window[2].parse::<u64>().ok()?;
        Some(StorageUsage {
            total_kb,
            used_kb,
            available_kb,
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total_kb: u64,
    pub free_kb: u64,
}

/// `/proc/meminfo`. Prefers `MemAvailable` over `MemFree` for the free figure.
pub fn parse_meminfo(output: &str) -> Option<MemoryUsage> {
    let field = |name: &str| -> Option<u64> {
        let re = Regex::new(&format!(r"(?m)^{name}:\s+(\d+)")).ok()?;
        re.captures(output)?[1].parse().ok()
    };
    let total_kb = field("MemTotal")?;
    let free_kb = field("MemAvailable").or_else(|| field("MemFree"))?;
    Some(MemoryUsage { total_kb, free_kb })
}

pub fn format_kb_as_gb(kb: u64) -> String {
    format!("{:.1} GB", kb as f64 / 1024.0 / 1024.0)
}

/// `wm size` / `wm density` → (physical, override).
pub fn parse_wm_output(output: &str, noun: &str) -> (Option<String>, Option<String>) {
    let physical_prefix = format!("Physical {noun}:");
    let override_prefix = format!("Override {noun}:");
    let mut physical = None;
    let mut overridden = None;
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(value) = trimmed.strip_prefix(&physical_prefix) {
            physical = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        } else if let Some(value) = trimmed.strip_prefix(&override_prefix) {
            overridden = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        }
    }
    (physical, overridden)
}

pub fn build_screen_info(size_output: Option<&str>, density_output: Option<&str>) -> ScreenInfo {
    let (physical_size, override_size) = size_output
        .map(|output| parse_wm_output(output, "size"))
        .unwrap_or((None, None));
    let (physical_density, override_density) = density_output
        .map(|output| parse_wm_output(output, "density"))
        .unwrap_or((None, None));
    ScreenInfo {
        physical_size,
        override_size,
        physical_density,
        override_density,
    }
}

pub fn parse_ls_la(path: &str, output: &str) -> Vec<FileEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("total"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 8 {
                return None;
            }
            let perm = tokens[0];
            let is_dir = perm.starts_with('d');
            // toybox prints `YYYY-MM-DD HH:MM name`, older toolbox `Mon DD HH:MM name`.
            let (modified_at, name_start) = if tokens[5].contains('-') {
                (format!("{} {}", tokens[5], tokens[6]), 7usize)
            } else {
                (format!("{} {} {}", tokens[5], tokens[6], tokens[7]), 8usize)
            };
            let raw_name = tokens.get(name_start..)?.join(" ");
            let name = match raw_name.split_once(" -> ") {
                Some((link, _target)) => link.to_string(),
                None => raw_name,
            };
            if name.is_empty() || name == "." || name == ".." {
                return None;
            }
            let size_bytes = if is_dir {
                None
            } else {
                tokens.get(4).and_then(|value| value.parse::<u64>().ok())
            };
            Some(FileEntry {
                path: format!("{}/{}", path.trim_end_matches('/'), name),
                name,
                is_dir,
                size_bytes,
                modified_at: Some(modified_at),
            })
        })
        .collect()
}

/// `which su` prints an absolute path ending in `su` when a su binary is installed.
pub fn parse_su_path(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('/') && line.ends_with("/su"))
        .map(str::to_string)
}

pub fn is_root_identity(output: &str) -> bool {
    output.contains("uid=0(") || output.contains("uid=0 ")
}

/// `adb uninstall` prints a bare `Success` line on success.
pub fn classify_uninstall_output(output: &str) -> Result<(), String> {
    if has_success_line(output) {
        return Ok(());
    }
    let trimmed = output.trim();
    if trimmed.is_empty() {
        Err("Uninstall returned no output".to_string())
    } else {
        Err(trimmed.to_string())
    }
}

pub fn has_success_line(output: &str) -> bool {
    output.lines().any(|line| line.trim() == "Success")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_roster_output() {
        let output = "List of devices attached\n0123456789ABCDEF device usb:1-1 product:sdk_gphone64_arm64 model:Pixel_7 device:emu64a transport_id:1\nemulator-5554 unauthorized transport_id:2\n\n";
        let parsed = parse_roster(output);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].serial, "0123456789ABCDEF");
        assert_eq!(parsed[0].state, DeviceState::Device);
        assert_eq!(parsed[0].model(), Some("Pixel_7"));
        assert_eq!(parsed[0].usb(), Some("1-1"));
        assert_eq!(parsed[0].product(), Some("sdk_gphone64_arm64"));
        assert_eq!(parsed[1].state, DeviceState::Unauthorized);
        assert_eq!(parsed[1].transport_id(), Some("2"));
    }

    #[test]
    fn roster_skips_daemon_banner_and_free_text() {
        let output = "* daemon not running; starting now at tcp:5037\n* daemon started successfully\nList of devices attached\n192.168.1.20:5555 offline no permissions; see site\nR58M recovery\n";
        let parsed = parse_roster(output);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].serial, "192.168.1.20:5555");
        assert_eq!(parsed[0].state, DeviceState::Offline);
        // The serial's own colon must not become a property.
        assert!(parsed[0].properties.is_empty());
        assert_eq!(parsed[1].state, DeviceState::Recovery);
    }

    #[test]
    fn roster_of_only_header_is_empty() {
        assert!(parse_roster("List of devices attached\n").is_empty());
        assert!(parse_roster("").is_empty());
    }

    #[test]
    fn parses_getprop_into_snapshot() {
        let output = "[ro.product.brand]: [google]\n[ro.product.model]: [Pixel 7]\n[ro.build.version.sdk]: [34]\n[sys.boot_completed]: [1]\n[ro.bootloader]: []\n";
        let map = parse_getprop_map(output);
        let mut snapshot = DeviceInfoSnapshot::default();
        apply_getprop(&mut snapshot, &map);
        assert_eq!(snapshot.brand.as_deref(), Some("google"));
        assert_eq!(snapshot.model.as_deref(), Some("Pixel 7"));
        assert_eq!(snapshot.sdk_version.as_deref(), Some("34"));
        assert_eq!(snapshot.boot_completed, Some(true));
        assert_eq!(snapshot.bootloader, None);
        assert_eq!(snapshot.android_version, None);
    }

    #[test]
    fn battery_requires_level_and_scale() {
        let output = "Current Battery Service state:\n  AC powered: false\n  level: 50\n  scale: 100\n";
        assert_eq!(parse_battery_percent(output).as_deref(), Some("50%"));
        assert_eq!(parse_battery_percent("  level: 50\n"), None);
        assert_eq!(parse_battery_percent("  scale: 100\n"), None);
        assert_eq!(parse_battery_percent("  level: 5\n  scale: 0\n"), None);
    }

    #[test]
    fn battery_fields_may_share_a_line() {
        assert_eq!(parse_battery_percent("level: 50 scale: 100").as_deref(), Some("50%"));
        assert_eq!(
            parse_battery_percent("Battery: level: 50, scale: 100").as_deref(),
            Some("50%")
        );
        assert_eq!(parse_battery_percent("  max_level: 50\n  scale: 100\n"), None);
    }

    #[test]
    fn battery_rounds_non_percent_scale() {
        let output = "  level: 2\n  scale: 3\n";
        assert_eq!(parse_battery_percent(output).as_deref(), Some("67%"));
    }

    #[test]
    fn parses_df_with_numeric_filesystem_suffix() {
        let output = "Filesystem       1K-blocks     Used Available Use% Mounted on\n/dev/block/dm-5  115343360 20971520  94371840  19% /data\n";
        let usage = parse_df_usage(output).expect("usage");
        assert_eq!(usage.total_kb, 115343360);
        assert_eq!(usage.available_kb, 94371840);
        assert_eq!(format_kb_as_gb(usage.total_kb), "110.0 GB");
    }

    #[test]
    fn parses_wrapped_df_line() {
        let output = "Filesystem 1K-blocks Used Available Use% Mounted on\n/dev/block/bootdevice/by-name/userdata\n 1048576 524288 524288 50% /data\n";
        let usage = parse_df_usage(output).expect("usage");
        assert_eq!(usage.used_kb, 524288);
        assert_eq!(parse_df_usage("Filesystem Size Used Free\n/data 25.2G 8.9G 16.3G\n"), None);
    }

    #[test]
    fn parses_meminfo() {
        let output = "MemTotal:        7823456 kB\nMemFree:          123456 kB\nMemAvailable:    3145728 kB\n";
        let usage = parse_meminfo(output).expect("mem");
        assert_eq!(usage.total_kb, 7823456);
        assert_eq!(usage.free_kb, 3145728);
        assert_eq!(format_kb_as_gb(usage.free_kb), "3.0 GB");
        assert_eq!(parse_meminfo("MemFree: 10 kB\n"), None);
    }

    #[test]
    fn parses_wm_size_and_density() {
        let info = build_screen_info(
            Some("Physical size: 1080x2400\nOverride size: 720x1600\n"),
            Some("Physical density: 420\n"),
        );
        assert_eq!(info.physical_size.as_deref(), Some("1080x2400"));
        assert_eq!(info.override_size.as_deref(), Some("720x1600"));
        assert_eq!(info.physical_density.as_deref(), Some("420"));
        assert_eq!(info.override_density, None);
    }

    #[test]
    fn parses_ls_la() {
        let output = "total 24\ndrwxrwx--x 2 root sdcard_rw 4096 2024-01-01 12:00 Download\n-rw-rw---- 1 root sdcard_rw 123 2024-01-01 12:00 my file.txt\nlrw-r--r-- 1 root root 21 2024-01-01 12:00 sdcard -> /storage/self/primary\ndrwxr-xr-x 2 root root 4096 2024-01-01 12:00 .\n";
        let entries = parse_ls_la("/sdcard/", output);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "Download");
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].size_bytes, None);
        assert_eq!(entries[1].path, "/sdcard/my file.txt");
        assert_eq!(entries[1].size_bytes, Some(123));
        assert_eq!(entries[2].name, "sdcard");
    }

    #[test]
    fn parses_legacy_ls_dates() {
        let output = "-rw-r--r-- 1 root root 77 Jan 1 12:00 notes.txt\n";
        let entries = parse_ls_la("/data/local/tmp", output);
        assert_eq!(entries[0].name, "notes.txt");
        assert_eq!(entries[0].modified_at.as_deref(), Some("Jan 1 12:00"));
    }

    #[test]
    fn detects_su_and_root_identity() {
        assert_eq!(parse_su_path("/system/xbin/su\n").as_deref(), Some("/system/xbin/su"));
        assert_eq!(parse_su_path("which: su: not found"), None);
        assert!(is_root_identity("uid=0(root) gid=0(root) groups=0(root) context=u:r:magisk:s0"));
        assert!(!is_root_identity("uid=2000(shell) gid=2000(shell)"));
    }

    #[test]
    fn classifies_uninstall() {
        assert!(classify_uninstall_output("Success\n").is_ok());
        let err = classify_uninstall_output("Failure [DELETE_FAILED_INTERNAL_ERROR]").unwrap_err();
        assert!(err.contains("DELETE_FAILED_INTERNAL_ERROR"));
        assert!(classify_uninstall_output("").is_err());
    }
}
