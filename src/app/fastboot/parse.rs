use crate::app::models::BootloaderDevice;

/// `fastboot devices` prints `<serial>\t<state>` per line; newer builds pad
/// with spaces instead of a tab.
pub fn parse_fastboot_devices(output: &str) -> Vec<BootloaderDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let state = tokens.next().unwrap_or("fastboot");
            if serial.starts_with('<') || serial.eq_ignore_ascii_case("waiting") {
                return None;
            }
            Some(BootloaderDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// `fastboot getvar <name>` answers on stderr as `<name>: <value>` followed by
/// a `Finished.` line.
pub fn parse_getvar(output: &str, name: &str) -> Option<String> {
    let prefix = format!("{name}:");
    output.lines().map(str::trim).find_map(|line| {
        let value = line.strip_prefix(&prefix)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

pub fn validate_partition(partition: &str) -> Result<(), String> {
    let trimmed = partition.trim();
    if trimmed.is_empty() {
        return Err("partition is required".to_string());
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!("Invalid partition name: {trimmed}"));
    }
    Ok(())
}

pub fn validate_variable(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("variable is required".to_string());
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
    {
        return Err(format!("Invalid variable name: {trimmed}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_and_space_separated_devices() {
        let output = "1A2B3C4D\tfastboot\nemulator-5554        fastbootd\n\n";
        let devices = parse_fastboot_devices(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "1A2B3C4D");
        assert_eq!(devices[0].state, "fastboot");
        assert_eq!(devices[1].state, "fastbootd");
        assert!(parse_fastboot_devices("< waiting for any device >").is_empty());
    }

    #[test]
    fn parses_getvar_from_stderr_text() {
        let output = "unlocked: yes\nFinished. Total time: 0.001s";
        assert_eq!(parse_getvar(output, "unlocked").as_deref(), Some("yes"));
        assert_eq!(parse_getvar(output, "product"), None);
        assert_eq!(
            parse_getvar("current-slot: a\n", "current-slot").as_deref(),
            Some("a")
        );
    }

    #[test]
    fn validates_partition_names() {
        assert!(validate_partition("init_boot").is_ok());
        assert!(validate_partition("vbmeta_a").is_ok());
        assert!(validate_partition("").is_err());
        assert!(validate_partition("boot; reboot").is_err());
        assert!(validate_partition("../boot").is_err());
    }
}
