use crate::app::adb::parse::has_success_line;
use crate::app::config::InstallSettings;
use crate::app::models::InstallErrorCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Failed {
        code: InstallErrorCode,
        raw_output: String,
    },
    /// Exit code 0 but no `Success` marker and no failure marker either.
    Unconfirmed { raw_output: String },
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Installed)
    }

    pub fn code(&self) -> InstallErrorCode {
        match self {
            InstallOutcome::Installed => InstallErrorCode::Success,
            InstallOutcome::Failed { code, .. } => *code,
            InstallOutcome::Unconfirmed { .. } => InstallErrorCode::UnconfirmedResult,
        }
    }

    pub fn message(&self) -> String {
        match self {
            InstallOutcome::Installed => "Success".to_string(),
            InstallOutcome::Failed { code, raw_output } => {
                format!("{}: {}", code.description(), raw_output.trim())
            }
            InstallOutcome::Unconfirmed { raw_output } => format!(
                "{}: {}",
                InstallErrorCode::UnconfirmedResult.description(),
                raw_output.trim()
            ),
        }
    }
}

/// Classifies the text of a finished `adb install`. A literal `Success` line is
/// the only accepted proof of success.
pub fn classify_install_output(output: &str) -> InstallOutcome {
    if let Some(code) = failure_code(output) {
        return InstallOutcome::Failed {
            code,
            raw_output: output.trim().to_string(),
        };
    }
    if has_success_line(output) {
        return InstallOutcome::Installed;
    }
    if output.contains("Failure") {
        return InstallOutcome::Failed {
            code: InstallErrorCode::UnknownError,
            raw_output: output.trim().to_string(),
        };
    }
    InstallOutcome::Unconfirmed {
        raw_output: output.trim().to_string(),
    }
}

/// Classifies the diagnostic text of an install that exited nonzero.
pub fn classify_install_error(message: &str) -> InstallOutcome {
    InstallOutcome::Failed {
        code: failure_code(message).unwrap_or(InstallErrorCode::UnknownError),
        raw_output: message.trim().to_string(),
    }
}

fn failure_code(output: &str) -> Option<InstallErrorCode> {
    let upper = output.to_uppercase();
    InstallErrorCode::FAILURE_CODES
        .into_iter()
        .find(|code| upper.contains(code.code()))
}

pub fn build_install_args(
    serial: &str,
    apk_paths: &[String],
    settings: &InstallSettings,
) -> Vec<String> {
    let mut args = vec!["-s".to_string(), serial.to_string()];
    if apk_paths.len() > 1 {
        args.push("install-multiple".to_string());
    } else {
        args.push("install".to_string());
    }
    if settings.replace_existing {
        args.push("-r".to_string());
    }
    if settings.allow_downgrade {
        args.push("-d".to_string());
    }
    if settings.grant_permissions {
        args.push("-g".to_string());
    }
    if settings.allow_test_packages {
        args.push("-t".to_string());
    }
    args.extend(settings.extra_args.split_whitespace().map(str::to_string));
    args.extend(apk_paths.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_marker_is_canonical() {
        let outcome = classify_install_output("Performing Streamed Install\nSuccess\n");
        assert!(outcome.is_success());
        assert_eq!(outcome.code(), InstallErrorCode::Success);
    }

    #[test]
    fn failure_marker_yields_typed_code() {
        let outcome = classify_install_output(
            "Performing Streamed Install\nadb: failed to install app.apk: Failure [INSTALL_FAILED_VERSION_DOWNGRADE]",
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.code(), InstallErrorCode::InstallFailedVersionDowngrade);
        assert!(outcome.message().starts_with("Cannot downgrade"));
    }

    #[test]
    fn untyped_failure_is_unknown_error() {
        let outcome = classify_install_output("Failure [SOMETHING_NEW]");
        assert_eq!(outcome.code(), InstallErrorCode::UnknownError);
    }

    #[test]
    fn clean_exit_without_marker_is_unconfirmed() {
        let outcome = classify_install_output("Performing Streamed Install\n");
        assert!(!outcome.is_success());
        assert_eq!(outcome.code(), InstallErrorCode::UnconfirmedResult);
        assert!(outcome.message().contains("Performing Streamed Install"));
        assert_eq!(
            classify_install_output("").code(),
            InstallErrorCode::UnconfirmedResult
        );
    }

    #[test]
    fn nonzero_exit_text_is_classified() {
        let outcome =
            classify_install_error("adb: failed to install x.apk: Failure [INSTALL_FAILED_NO_MATCHING_ABIS: ...]");
        assert_eq!(outcome.code(), InstallErrorCode::InstallFailedNoMatchingAbis);
        assert_eq!(
            classify_install_error("device offline").code(),
            InstallErrorCode::UnknownError
        );
    }

    #[test]
    fn builds_single_and_split_install_args() {
        let settings = InstallSettings::default();
        let single = build_install_args("ABC", &["/tmp/a.apk".to_string()], &settings);
        assert_eq!(single, vec!["-s", "ABC", "install", "-r", "/tmp/a.apk"]);

        let settings = InstallSettings {
            replace_existing: false,
            allow_downgrade: true,
            grant_permissions: true,
            allow_test_packages: false,
            extra_args: "--user 0".to_string(),
        };
        let split = build_install_args(
            "ABC",
            &["/tmp/base.apk".to_string(), "/tmp/config.apk".to_string()],
            &settings,
        );
        assert_eq!(
            split,
            vec![
                "-s",
                "ABC",
                "install-multiple",
                "-d",
                "-g",
                "--user",
                "0",
                "/tmp/base.apk",
                "/tmp/config.apk"
            ]
        );
    }
}
