pub const DEFAULT_TCPIP_PORT: u16 = 5555;

/// Accepts `host:port` with a non-empty host and a port in 1..=65535.
pub fn validate_wireless_address(address: &str) -> Result<(), String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err("address is required".to_string());
    }
    let Some((host, port)) = trimmed.rsplit_once(':') else {
        return Err("address must be in host:port form".to_string());
    };
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err("address host is invalid".to_string());
    }
    match port.parse::<u16>() {
        Ok(value) if value > 0 => Ok(()),
        _ => Err("address port must be between 1 and 65535".to_string()),
    }
}

pub fn validate_pairing_code(code: &str) -> Result<(), String> {
    let trimmed = code.trim();
    if trimmed.len() != 6 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err("pairing code must be 6 digits".to_string());
    }
    Ok(())
}

// adb connect exits 0 even when the connection was refused, so the text decides.
pub fn classify_connect_output(output: &str) -> Result<(), String> {
    let lower = output.to_lowercase();
    if lower.contains("failed") || lower.contains("unable") || lower.contains("cannot") {
        return Err(output.trim().to_string());
    }
    if lower.contains("connected to") {
        return Ok(());
    }
    Err(if output.trim().is_empty() {
        "adb connect returned no output".to_string()
    } else {
        output.trim().to_string()
    })
}

pub fn classify_disconnect_output(output: &str) -> Result<(), String> {
    let lower = output.to_lowercase();
    if lower.contains("error") || lower.contains("no such device") {
        return Err(output.trim().to_string());
    }
    Ok(())
}

pub fn classify_pair_output(output: &str) -> Result<(), String> {
    let lower = output.to_lowercase();
    if lower.contains("successfully paired") {
        return Ok(());
    }
    Err(if output.trim().is_empty() {
        "adb pair returned no output".to_string()
    } else {
        output.trim().to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_addresses() {
        assert!(validate_wireless_address("192.168.1.20:5555").is_ok());
        assert!(validate_wireless_address("pixel.local:37099").is_ok());
        assert!(validate_wireless_address("192.168.1.20").is_err());
        assert!(validate_wireless_address(":5555").is_err());
        assert!(validate_wireless_address("host:0").is_err());
        assert!(validate_wireless_address("host:99999").is_err());
    }

    #[test]
    fn validates_pairing_codes() {
        assert!(validate_pairing_code("123456").is_ok());
        assert!(validate_pairing_code("12345").is_err());
        assert!(validate_pairing_code("12345a").is_err());
    }

    #[test]
    fn classifies_connect() {
        assert!(classify_connect_output("connected to 192.168.1.20:5555").is_ok());
        assert!(classify_connect_output("already connected to 192.168.1.20:5555").is_ok());
        let err = classify_connect_output(
            "failed to connect to '192.168.1.20:5555': Connection refused",
        )
        .unwrap_err();
        assert!(err.contains("Connection refused"));
        assert!(classify_connect_output("cannot resolve host 'nope'").is_err());
    }

    #[test]
    fn classifies_disconnect_and_pair() {
        assert!(classify_disconnect_output("disconnected 192.168.1.20:5555").is_ok());
        assert!(classify_disconnect_output("error: no such device '1.2.3.4:5555'").is_err());
        assert!(classify_pair_output("Successfully paired to 192.168.1.20:37099 [guid=adb-1]").is_ok());
        assert!(classify_pair_output("Failed: Wrong password or connection was dropped.").is_err());
    }
}
