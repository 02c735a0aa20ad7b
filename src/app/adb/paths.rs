use std::path::Path;

/// Staging directory writable by the shell user; root-routed pushes land here first.
pub const STAGING_DIR: &str = "/data/local/tmp";

pub fn validate_device_path(path: &str) -> Result<(), String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("remote_path is required".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err("remote_path must be an absolute device path starting with '/'".to_string());
    }
    if trimmed.contains('\0') {
        return Err("remote_path contains invalid characters".to_string());
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err("remote_path must not contain '..' segments".to_string());
    }
    Ok(())
}

pub fn validate_local_file(path: &str, label: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err(format!("{label} is required"));
    }
    if !Path::new(path).is_file() {
        return Err(format!("{label} not found: {path}"));
    }
    Ok(())
}

pub fn local_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Staging path for a local file, e.g. `/data/local/tmp/boot.img`.
pub fn staging_path(local_path: &str) -> String {
    let name = sanitize_filename_component(&local_file_name(local_path));
    format!("{STAGING_DIR}/{name}")
}

pub fn sanitize_filename_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Single-quotes a value for `sh -c` on the device.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
