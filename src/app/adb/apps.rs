use crate::app::models::PackageInfo;

/// Package names from `pm list packages` (optionally `-f`, which prefixes the apk path).
pub fn parse_package_list(output: &str) -> Vec<String> {
    let mut packages = Vec::new();
    for raw in output.lines() {
        let line = raw.trim();
        let Some(payload) = line.strip_prefix("package:") else {
            continue;
        };
        let name = match payload.rsplit_once('=') {
            Some((_, pkg)) => pkg.trim(),
            None => payload.trim(),
        };
        if !name.is_empty() {
            packages.push(name.to_string());
        }
    }
    packages.sort();
    packages.dedup();
    packages
}

pub fn validate_package_name(package: &str) -> Result<(), String> {
    let trimmed = package.trim();
    if trimmed.is_empty() {
        return Err("package_name is required".to_string());
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_'));
    if !valid {
        return Err(format!("Invalid package name: {trimmed}"));
    }
    Ok(())
}

pub fn parse_dumpsys_version_name(output: &str) -> Option<String> {
    dumpsys_field(output, "versionName")
}

pub fn parse_first_install_time(output: &str) -> Option<String> {
    dumpsys_field(output, "firstInstallTime")
}

fn dumpsys_field(output: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=");
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some((_, tail)) = trimmed.split_once(&needle) {
            let value = tail.trim().trim_matches(['"', '\'']);
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// First apk path from `pm path <package>`; split installs list the base first.
pub fn parse_pm_path(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::trim)
        .find(|path| !path.is_empty())
        .map(str::to_string)
}

/// Size column of a single `ls -l` line.
pub fn parse_ls_size_bytes(output: &str) -> Option<u64> {
    let line = output.lines().find(|line| !line.trim().is_empty())?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 || tokens[0].len() < 10 {
        return None;
    }
    tokens[4].parse::<u64>().ok()
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn build_package_info(
    package_name: &str,
    dumpsys_output: Option<&str>,
    path_output: Option<&str>,
    ls_output: Option<&str>,
) -> PackageInfo {
    PackageInfo {
        package_name: package_name.to_string(),
        version_name: dumpsys_output.and_then(parse_dumpsys_version_name),
        first_install_time: dumpsys_output.and_then(parse_first_install_time),
        apk_path: path_output.and_then(parse_pm_path),
        size: ls_output.and_then(parse_ls_size_bytes).map(format_bytes),
    }
}
