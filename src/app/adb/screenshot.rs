use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};

use crate::app::adb::paths::sanitize_filename_component;

pub const REMOTE_SCREENSHOT_PATH: &str = "/sdcard/screenshot.png";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn png_bytes_to_data_url(bytes: &[u8]) -> Result<String, String> {
    if bytes.len() < PNG_SIGNATURE.len() {
        return Err("Screenshot data is empty".to_string());
    }
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err("Screenshot data is not a PNG".to_string());
    }
    let encoded = STANDARD.encode(bytes);
    Ok(format!("data:image/png;base64,{encoded}"))
}

/// `screenshot_<serial>_<YYYYmmdd_HHMMSS>.png`, used when the caller picks a directory.
pub fn screenshot_file_name(serial: &str, at: DateTime<Local>) -> String {
    format!(
        "screenshot_{}_{}.png",
        sanitize_filename_component(serial),
        at.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_empty_and_non_png() {
        let err = png_bytes_to_data_url(&[]).expect_err("should reject empty input");
        assert!(err.contains("empty"));
        let err = png_bytes_to_data_url(b"not a png").expect_err("should reject non-png");
        assert!(err.contains("PNG"));
    }

    #[test]
    fn encodes_png_as_data_url() {
        let url = png_bytes_to_data_url(b"\x89PNG\r\n\x1a\nfake").expect("should encode png");
        let payload = url
            .strip_prefix("data:image/png;base64,")
            .expect("should carry png data url prefix");
        assert_eq!(payload, "iVBORw0KGgpmYWtl");
    }

    #[test]
    fn file_name_embeds_serial_and_time() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).single().expect("time");
        assert_eq!(
            screenshot_file_name("192.168.1.20:5555", at),
            "screenshot_192.168.1.20_5555_20240501_093005.png"
        );
    }
}
