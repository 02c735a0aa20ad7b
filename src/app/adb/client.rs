use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::app::adb::apk::prepare_apk;
use crate::app::adb::apps::{build_package_info, parse_package_list, parse_pm_path, validate_package_name};
use crate::app::adb::install::{
    build_install_args, classify_install_error, classify_install_output, InstallOutcome,
};
use crate::app::adb::locator::{expand_home, probe_tool, Tool};
use crate::app::adb::parse::{
    apply_getprop, build_screen_info, classify_uninstall_output, format_kb_as_gb,
    is_root_identity, parse_battery_percent, parse_df_usage, parse_getprop_map, parse_ls_la,
    parse_meminfo, parse_roster, parse_su_path,
};
use crate::app::adb::paths::{
    shell_quote, staging_path, validate_device_path, validate_local_file,
};
use crate::app::adb::runner::{to_args, CommandOutput, CommandRunner};
use crate::app::adb::screenshot::{
    png_bytes_to_data_url, screenshot_file_name, REMOTE_SCREENSHOT_PATH,
};
use crate::app::adb::serial_lock::SerialLocks;
use crate::app::adb::wireless::{
    classify_connect_output, classify_disconnect_output, classify_pair_output,
    validate_pairing_code, validate_wireless_address,
};
use crate::app::config::InstallSettings;
use crate::app::error::{ensure_non_empty, AppError};
use crate::app::models::{
    Device, DeviceInfoSnapshot, FileEntry, PackageInfo, RebootMode, ScreenInfo, ScreenshotResult,
    ToolInfo,
};

/// Device bridge operations. Every call addressed to a serial goes through the
/// per-serial lock; host-level calls (`devices`, `connect`, `pair`) do not.
pub struct AdbClient {
    program: String,
    runner: Arc<dyn CommandRunner>,
    locks: Arc<SerialLocks>,
    install: InstallSettings,
}

impl AdbClient {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>, install: InstallSettings) -> Self {
        Self {
            program: program.into(),
            runner,
            locks: Arc::new(SerialLocks::new()),
            install,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn locks(&self) -> &SerialLocks {
        &self.locks
    }

    fn host(&self, args: &[&str], trace_id: &str) -> Result<CommandOutput, AppError> {
        self.runner.run(&self.program, &to_args(args), trace_id)
    }

    fn run_locked(&self, serial: &str, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        self.locks
            .with_serial(serial, || self.runner.run(&self.program, args, trace_id))
    }

    fn device(&self, serial: &str, args: &[&str], trace_id: &str) -> Result<CommandOutput, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        let mut full = vec!["-s".to_string(), serial.to_string()];
        full.extend(args.iter().map(|arg| arg.to_string()));
        self.run_locked(serial, &full, trace_id)
    }

    fn device_checked(&self, serial: &str, args: &[&str], trace_id: &str) -> Result<CommandOutput, AppError> {
        self.device(serial, args, trace_id)?.into_success(trace_id)
    }

    /// Reads one piece of device state; failures are logged and become `None`.
    fn best_effort(&self, serial: &str, args: &[&str], trace_id: &str) -> Option<String> {
        match self.device_checked(serial, args, trace_id) {
            Ok(output) => Some(output.stdout),
            Err(err) => {
                warn!(trace_id = %trace_id, serial = %serial, command = %args.join(" "), error = %err, "device read failed");
                None
            }
        }
    }

    pub fn devices(&self, trace_id: &str) -> Result<Vec<Device>, AppError> {
        let output = self
            .host(&["devices", "-l"], trace_id)?
            .into_success(trace_id)
            .map_err(|err| err.context("adb devices failed"))?;
        Ok(parse_roster(&output.stdout))
    }

    pub fn version(&self, trace_id: &str) -> ToolInfo {
        probe_tool(Tool::Adb, &self.program, self.runner.as_ref(), trace_id)
    }

    pub fn getprop(&self, serial: &str, trace_id: &str) -> Result<HashMap<String, String>, AppError> {
        let output = self.device_checked(serial, &["shell", "getprop"], trace_id)?;
        Ok(parse_getprop_map(&output.stdout))
    }

    /// Point-in-time snapshot. Each source is read independently, so an
    /// unreachable source leaves its fields empty instead of failing the call.
    pub fn device_info(&self, serial: &str, trace_id: &str) -> Result<DeviceInfoSnapshot, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        let mut snapshot = DeviceInfoSnapshot {
            serial: serial.to_string(),
            ..DeviceInfoSnapshot::default()
        };

        match self.getprop(serial, trace_id) {
            Ok(props) => apply_getprop(&mut snapshot, &props),
            Err(err) => warn!(trace_id = %trace_id, serial = %serial, error = %err, "getprop failed"),
        }

        let screen = self.screen_info(serial, trace_id)?;
        snapshot.resolution = screen.override_size.or(screen.physical_size);
        snapshot.density = screen.override_density.or(screen.physical_density);

        snapshot.battery = self
            .best_effort(serial, &["shell", "dumpsys", "battery"], trace_id)
            .and_then(|output| parse_battery_percent(&output));

        if let Some(storage) = self
            .best_effort(serial, &["shell", "df", "/data"], trace_id)
            .and_then(|output| parse_df_usage(&output))
        {
            snapshot.total_storage = Some(format_kb_as_gb(storage.total_kb));
            snapshot.free_storage = Some(format_kb_as_gb(storage.available_kb));
        }

        if let Some(memory) = self
            .best_effort(serial, &["shell", "cat", "/proc/meminfo"], trace_id)
            .and_then(|output| parse_meminfo(&output))
        {
            snapshot.total_ram = Some(format_kb_as_gb(memory.total_kb));
            snapshot.free_ram = Some(format_kb_as_gb(memory.free_kb));
        }

        Ok(snapshot)
    }

    pub fn screen_info(&self, serial: &str, trace_id: &str) -> Result<ScreenInfo, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        let size = self.best_effort(serial, &["shell", "wm", "size"], trace_id);
        let density = self.best_effort(serial, &["shell", "wm", "density"], trace_id);
        Ok(build_screen_info(size.as_deref(), density.as_deref()))
    }

    pub fn set_screen_resolution(&self, serial: &str, width: u32, height: u32, trace_id: &str) -> Result<(), AppError> {
        if width == 0 || height == 0 {
            return Err(AppError::validation("width and height must be positive", trace_id));
        }
        let size = format!("{width}x{height}");
        self.device_checked(serial, &["shell", "wm", "size", &size], trace_id)?;
        Ok(())
    }

    pub fn set_screen_density(&self, serial: &str, density: u32, trace_id: &str) -> Result<(), AppError> {
        if density == 0 {
            return Err(AppError::validation("density must be positive", trace_id));
        }
        let density = density.to_string();
        self.device_checked(serial, &["shell", "wm", "density", &density], trace_id)?;
        Ok(())
    }

    pub fn reset_screen_resolution(&self, serial: &str, trace_id: &str) -> Result<(), AppError> {
        self.device_checked(serial, &["shell", "wm", "size", "reset"], trace_id)?;
        Ok(())
    }

    pub fn reset_screen_density(&self, serial: &str, trace_id: &str) -> Result<(), AppError> {
        self.device_checked(serial, &["shell", "wm", "density", "reset"], trace_id)?;
        Ok(())
    }

    /// Captures to the device, pulls, and removes the remote file. With a save
    /// path (file or directory) the PNG is written there, otherwise it is
    /// returned as a data URL.
    pub fn screenshot(&self, serial: &str, save_path: Option<&str>, trace_id: &str) -> Result<ScreenshotResult, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        self.device_checked(serial, &["shell", "screencap", "-p", REMOTE_SCREENSHOT_PATH], trace_id)
            .map_err(|err| err.context("Screenshot failed"))?;

        let temp_dir = TempDir::new()
            .map_err(|err| AppError::system(format!("Failed to create temp dir: {err}"), trace_id))?;
        let local = temp_dir.path().join("screenshot.png");
        let local_display = local.to_string_lossy().to_string();
        let pulled = self.device_checked(serial, &["pull", REMOTE_SCREENSHOT_PATH, &local_display], trace_id);
        if let Err(err) = self.device_checked(serial, &["shell", "rm", "-f", REMOTE_SCREENSHOT_PATH], trace_id) {
            warn!(trace_id = %trace_id, serial = %serial, error = %err, "failed to remove remote screenshot");
        }
        pulled.map_err(|err| err.context("Screenshot failed"))?;

        let bytes = fs::read(&local)
            .map_err(|err| AppError::system(format!("Screenshot file not found: {err}"), trace_id))?;
        let captured_at = Local::now();

        let Some(save_path) = save_path.map(str::trim).filter(|path| !path.is_empty()) else {
            let data_url = png_bytes_to_data_url(&bytes).map_err(|err| AppError::dependency(err, trace_id))?;
            return Ok(ScreenshotResult {
                serial: serial.to_string(),
                path: None,
                data_url: Some(data_url),
                captured_at: captured_at.to_rfc3339(),
            });
        };

        let mut target = PathBuf::from(expand_home(save_path));
        if target.is_dir() {
            target = target.join(screenshot_file_name(serial, captured_at));
        }
        if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::system(format!("Failed to create output dir: {err}"), trace_id))?;
        }
        fs::write(&target, &bytes)
            .map_err(|err| AppError::system(format!("Failed to write screenshot: {err}"), trace_id))?;

        Ok(ScreenshotResult {
            serial: serial.to_string(),
            path: Some(target.to_string_lossy().to_string()),
            data_url: None,
            captured_at: captured_at.to_rfc3339(),
        })
    }

    pub fn install(&self, serial: &str, apk_path: &str, trace_id: &str) -> Result<InstallOutcome, AppError> {
        let settings = self.install.clone();
        self.install_with(serial, apk_path, &settings, trace_id)
    }

    /// Installs a single APK or an `.apks`/`.xapk` split bundle. Only a tool
    /// that could not be run is an `Err`; a rejected install is an outcome.
    pub fn install_with(
        &self,
        serial: &str,
        apk_path: &str,
        settings: &InstallSettings,
        trace_id: &str,
    ) -> Result<InstallOutcome, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        ensure_non_empty(apk_path, "apk_path", trace_id)?;
        let prepared = prepare_apk(apk_path).map_err(|err| AppError::validation(err, trace_id))?;
        let args = build_install_args(serial, &prepared.apk_paths, settings);
        let output = self.run_locked(serial, &args, trace_id)?;
        let combined = output.combined();
        let outcome = if output.succeeded() {
            classify_install_output(&combined)
        } else {
            classify_install_error(&combined)
        };
        info!(
            trace_id = %trace_id,
            serial = %serial,
            apk = %apk_path,
            code = %outcome.code().code(),
            "install finished"
        );
        Ok(outcome)
    }

    pub fn uninstall(&self, serial: &str, package: &str, keep_data: bool, trace_id: &str) -> Result<(), AppError> {
        validate_package_name(package).map_err(|err| AppError::validation(err, trace_id))?;
        let mut args = vec!["uninstall"];
        if keep_data {
            args.push("-k");
        }
        args.push(package.trim());
        let output = self.device(serial, &args, trace_id)?;
        classify_uninstall_output(&output.combined()).map_err(|err| AppError::dependency(err, trace_id))
    }

    /// Third-party packages, sorted.
    pub fn list_packages(&self, serial: &str, trace_id: &str) -> Result<Vec<String>, AppError> {
        let output = self.device_checked(serial, &["shell", "pm", "list", "packages", "-3"], trace_id)?;
        Ok(parse_package_list(&output.stdout))
    }

    pub fn package_info(&self, serial: &str, package: &str, trace_id: &str) -> Result<PackageInfo, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        validate_package_name(package).map_err(|err| AppError::validation(err, trace_id))?;
        let package = package.trim();
        let dumpsys = self.best_effort(serial, &["shell", "dumpsys", "package", package], trace_id);
        let path = self.best_effort(serial, &["shell", "pm", "path", package], trace_id);
        let size = path
            .as_deref()
            .and_then(parse_pm_path)
            .and_then(|apk| self.best_effort(serial, &["shell", "ls", "-l", &apk], trace_id));
        Ok(build_package_info(
            package,
            dumpsys.as_deref(),
            path.as_deref(),
            size.as_deref(),
        ))
    }

    pub fn freeze(&self, serial: &str, package: &str, trace_id: &str) -> Result<(), AppError> {
        validate_package_name(package).map_err(|err| AppError::validation(err, trace_id))?;
        self.device_checked(serial, &["shell", "pm", "disable-user", package.trim()], trace_id)?;
        Ok(())
    }

    pub fn unfreeze(&self, serial: &str, package: &str, trace_id: &str) -> Result<(), AppError> {
        validate_package_name(package).map_err(|err| AppError::validation(err, trace_id))?;
        self.device_checked(serial, &["shell", "pm", "enable", package.trim()], trace_id)?;
        Ok(())
    }

    /// Runs `command` through the device shell and returns its stdout.
    pub fn shell(&self, serial: &str, command: &str, trace_id: &str) -> Result<String, AppError> {
        ensure_non_empty(command, "command", trace_id)?;
        let output = self.device_checked(serial, &["shell", command], trace_id)?;
        Ok(output.stdout)
    }

    pub fn reboot(&self, serial: &str, mode: RebootMode, trace_id: &str) -> Result<(), AppError> {
        let mut args = vec!["reboot"];
        if let Some(target) = mode.target() {
            args.push(target);
        }
        self.device_checked(serial, &args, trace_id)?;
        Ok(())
    }

    pub fn push(&self, serial: &str, local_path: &str, remote_path: &str, trace_id: &str) -> Result<String, AppError> {
        validate_local_file(local_path, "local_path").map_err(|err| AppError::validation(err, trace_id))?;
        validate_device_path(remote_path).map_err(|err| AppError::validation(err, trace_id))?;
        let output = self.device_checked(serial, &["push", local_path, remote_path.trim()], trace_id)?;
        Ok(output.combined())
    }

    pub fn pull(&self, serial: &str, remote_path: &str, local_path: &str, trace_id: &str) -> Result<String, AppError> {
        validate_device_path(remote_path).map_err(|err| AppError::validation(err, trace_id))?;
        ensure_non_empty(local_path, "local_path", trace_id)?;
        let local = expand_home(local_path.trim());
        let output = self.device_checked(serial, &["pull", remote_path.trim(), &local], trace_id)?;
        Ok(output.combined())
    }

    pub fn list_files(&self, serial: &str, remote_path: &str, trace_id: &str) -> Result<Vec<FileEntry>, AppError> {
        validate_device_path(remote_path).map_err(|err| AppError::validation(err, trace_id))?;
        let path = remote_path.trim();
        let output = self.device_checked(serial, &["shell", "ls", "-la", &shell_quote(path)], trace_id)?;
        Ok(parse_ls_la(path, &output.stdout))
    }

    /// True when a `su` binary is on the device. A probe that cannot run counts as no root.
    pub fn can_root(&self, serial: &str, trace_id: &str) -> Result<bool, AppError> {
        let output = self.device(serial, &["shell", "which", "su"], trace_id)?;
        Ok(parse_su_path(&output.stdout).is_some())
    }

    /// Asks `su` for a root identity; this is the moment a root manager prompts the user.
    pub fn enable_root(&self, serial: &str, trace_id: &str) -> Result<(), AppError> {
        let output = self.device(serial, &["shell", "su", "-c", "id"], trace_id)?;
        if is_root_identity(&output.stdout) {
            return Ok(());
        }
        let detail = output.combined();
        Err(AppError::dependency(
            if detail.is_empty() {
                "Root access denied".to_string()
            } else {
                format!("Root access denied: {detail}")
            },
            trace_id,
        ))
    }

    pub fn run_root_command(&self, serial: &str, command: &str, args: &[String], trace_id: &str) -> Result<String, AppError> {
        ensure_non_empty(command, "command", trace_id)?;
        let mut line = command.trim().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        self.su(serial, &line, trace_id)
    }

    /// Pushes a local script to the staging directory and runs it with `sh` as root.
    pub fn run_root_script(&self, serial: &str, script_path: &str, trace_id: &str) -> Result<String, AppError> {
        validate_local_file(script_path, "script_path").map_err(|err| AppError::validation(err, trace_id))?;
        let staged = staging_path(script_path);
        self.device_checked(serial, &["push", script_path, &staged], trace_id)
            .map_err(|err| err.context("Failed to stage script"))?;
        let result = self.su(serial, &format!("sh {}", shell_quote(&staged)), trace_id);
        self.remove_staged(serial, &staged, trace_id);
        result
    }

    /// Root-privileged push: stage under `/data/local/tmp`, then `cp` as root.
    pub fn push_file_root(&self, serial: &str, local_path: &str, remote_path: &str, trace_id: &str) -> Result<String, AppError> {
        validate_local_file(local_path, "local_path").map_err(|err| AppError::validation(err, trace_id))?;
        validate_device_path(remote_path).map_err(|err| AppError::validation(err, trace_id))?;
        let staged = staging_path(local_path);
        self.device_checked(serial, &["push", local_path, &staged], trace_id)
            .map_err(|err| err.context("Failed to stage file"))?;
        let copy = format!("cp {} {}", shell_quote(&staged), shell_quote(remote_path.trim()));
        let result = self.su(serial, &copy, trace_id);
        self.remove_staged(serial, &staged, trace_id);
        result
    }

    pub fn list_files_root(&self, serial: &str, remote_path: &str, trace_id: &str) -> Result<Vec<FileEntry>, AppError> {
        validate_device_path(remote_path).map_err(|err| AppError::validation(err, trace_id))?;
        let path = remote_path.trim();
        let output = self.su(serial, &format!("ls -la {}", shell_quote(path)), trace_id)?;
        Ok(parse_ls_la(path, &output))
    }

    fn su(&self, serial: &str, command_line: &str, trace_id: &str) -> Result<String, AppError> {
        // adb joins shell arguments with spaces, so the whole line is quoted once for `su -c`.
        let quoted = shell_quote(command_line);
        let output = self.device_checked(serial, &["shell", "su", "-c", &quoted], trace_id)?;
        Ok(output.stdout)
    }

    fn remove_staged(&self, serial: &str, staged: &str, trace_id: &str) {
        if let Err(err) = self.device_checked(serial, &["shell", "rm", "-f", staged], trace_id) {
            warn!(trace_id = %trace_id, serial = %serial, path = %staged, error = %err, "failed to remove staged file");
        }
    }

    pub fn tcpip(&self, serial: &str, port: u16, trace_id: &str) -> Result<String, AppError> {
        if port == 0 {
            return Err(AppError::validation("port must be between 1 and 65535", trace_id));
        }
        let port = port.to_string();
        let output = self.device_checked(serial, &["tcpip", &port], trace_id)?;
        Ok(output.combined())
    }

    pub fn connect(&self, address: &str, trace_id: &str) -> Result<String, AppError> {
        validate_wireless_address(address).map_err(|err| AppError::validation(err, trace_id))?;
        let output = self.host(&["connect", address.trim()], trace_id)?;
        let combined = output.combined();
        classify_connect_output(&combined).map_err(|err| AppError::dependency(err, trace_id))?;
        Ok(combined)
    }

    pub fn disconnect(&self, address: &str, trace_id: &str) -> Result<String, AppError> {
        validate_wireless_address(address).map_err(|err| AppError::validation(err, trace_id))?;
        let output = self.host(&["disconnect", address.trim()], trace_id)?;
        let combined = output.combined();
        if !output.succeeded() {
            return Err(AppError::dependency(combined, trace_id));
        }
        classify_disconnect_output(&combined).map_err(|err| AppError::dependency(err, trace_id))?;
        Ok(combined)
    }

    pub fn pair(&self, address: &str, code: &str, trace_id: &str) -> Result<String, AppError> {
        validate_wireless_address(address).map_err(|err| AppError::validation(err, trace_id))?;
        validate_pairing_code(code).map_err(|err| AppError::validation(err, trace_id))?;
        let output = self.host(&["pair", address.trim(), code.trim()], trace_id)?;
        let combined = output.combined();
        classify_pair_output(&combined).map_err(|err| AppError::dependency(err, trace_id))?;
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::apk::write_test_apk;
    use crate::app::models::{DeviceState, InstallErrorCode};
    use crate::app::testing::ScriptedRunner;

    const SERIAL: &str = "R58M123ABC";

    fn client(runner: &Arc<ScriptedRunner>) -> AdbClient {
        AdbClient::new("adb", runner.clone(), InstallSettings::default())
    }

    #[test]
    fn devices_parses_roster() {
        let runner = ScriptedRunner::new();
        runner.on(
            "devices -l",
            "* daemon started successfully\nList of devices attached\nR58M123ABC device usb:1-1 model:SM_G991B\n192.168.1.20:5555 offline\n",
        );
        let devices = client(&runner).devices("t").expect("devices");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].model(), Some("SM_G991B"));
        assert_eq!(devices[1].serial, "192.168.1.20:5555");
        assert_eq!(devices[1].state, DeviceState::Offline);
        assert!(devices[1].properties.is_empty());
    }

    #[test]
    fn devices_failure_is_dependency_error() {
        let runner = ScriptedRunner::new();
        runner.on_failure("devices -l", "cannot connect to daemon", 1);
        let err = client(&runner).devices("t").expect_err("failure");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(err.error.contains("cannot connect to daemon"));
    }

    #[test]
    fn device_info_is_partial_when_sources_fail() {
        let runner = ScriptedRunner::new();
        runner
            .on(
                "-s R58M123ABC shell getprop",
                "[ro.product.model]: [SM-G991B]\n[ro.product.brand]: [samsung]\n[ro.build.version.release]: [14]\n[sys.boot_completed]: [1]\n",
            )
            .on("-s R58M123ABC shell wm size", "Physical size: 1080x2400\nOverride size: 720x1600\n")
            .on("-s R58M123ABC shell wm density", "Physical density: 420\n")
            .on("-s R58M123ABC shell dumpsys battery", "Current Battery Service state:\n  level: 50\n")
            .on_failure("-s R58M123ABC shell df /data", "df: /data: Permission denied", 1)
            .on(
                "-s R58M123ABC shell cat /proc/meminfo",
                "MemTotal:        8388608 kB\nMemFree:          524288 kB\nMemAvailable:    4194304 kB\n",
            );

        let info = client(&runner).device_info(SERIAL, "t").expect("info");
        assert_eq!(info.model.as_deref(), Some("SM-G991B"));
        assert_eq!(info.android_version.as_deref(), Some("14"));
        assert_eq!(info.boot_completed, Some(true));
        assert_eq!(info.resolution.as_deref(), Some("720x1600"));
        assert_eq!(info.density.as_deref(), Some("420"));
        // scale missing: no percentage rather than a bogus one
        assert_eq!(info.battery, None);
        assert_eq!(info.total_storage, None);
        assert_eq!(info.total_ram.as_deref(), Some("8.0 GB"));
        assert_eq!(info.free_ram.as_deref(), Some("4.0 GB"));
    }

    #[test]
    fn empty_serial_is_rejected_before_spawning() {
        let runner = ScriptedRunner::new();
        let err = client(&runner).shell(" ", "id", "t").expect_err("validation");
        assert!(err.is_validation());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn screen_dimensions_must_be_positive() {
        let runner = ScriptedRunner::new();
        runner.on("-s R58M123ABC shell wm size 1080x1920", "");
        let adb = client(&runner);
        assert!(adb.set_screen_resolution(SERIAL, 0, 1920, "t").unwrap_err().is_validation());
        assert!(adb.set_screen_density(SERIAL, 0, "t").unwrap_err().is_validation());
        adb.set_screen_resolution(SERIAL, 1080, 1920, "t").expect("set size");
        assert_eq!(runner.calls(), vec!["-s R58M123ABC shell wm size 1080x1920"]);
    }

    #[test]
    fn install_requires_success_marker() {
        let tmp = TempDir::new().expect("tmp");
        let apk = tmp.path().join("app.apk");
        write_test_apk(&apk, &["AndroidManifest.xml"]);
        let apk_display = apk.to_string_lossy().to_string();
        let key = format!("-s R58M123ABC install -r {apk_display}");

        let runner = ScriptedRunner::new();
        runner
            .on(&key, "Performing Streamed Install\nSuccess\n")
            .on(&key, "Performing Streamed Install\n");
        let adb = client(&runner);

        let first = adb.install(SERIAL, &apk_display, "t").expect("install");
        assert!(first.is_success());
        let second = adb.install(SERIAL, &apk_display, "t").expect("install");
        assert_eq!(second.code(), InstallErrorCode::UnconfirmedResult);
    }

    #[test]
    fn install_nonzero_exit_is_classified() {
        let tmp = TempDir::new().expect("tmp");
        let apk = tmp.path().join("app.apk");
        write_test_apk(&apk, &["AndroidManifest.xml"]);
        let apk_display = apk.to_string_lossy().to_string();

        let runner = ScriptedRunner::new();
        runner.on_failure(
            &format!("-s R58M123ABC install -r {apk_display}"),
            "adb: failed to install: Failure [INSTALL_FAILED_INSUFFICIENT_STORAGE]",
            1,
        );
        let outcome = client(&runner).install(SERIAL, &apk_display, "t").expect("outcome");
        assert_eq!(outcome.code(), InstallErrorCode::InstallFailedInsufficientStorage);
    }

    #[test]
    fn install_missing_file_never_spawns() {
        let runner = ScriptedRunner::new();
        let err = client(&runner)
            .install(SERIAL, "/no/such/app.apk", "t")
            .expect_err("missing");
        assert!(err.is_validation());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn uninstall_keep_data_and_classification() {
        let runner = ScriptedRunner::new();
        runner
            .on("-s R58M123ABC uninstall -k com.example", "Success\n")
            .on_output(
                "-s R58M123ABC uninstall com.missing",
                CommandOutput {
                    stdout: "Failure [DELETE_FAILED_INTERNAL_ERROR]\n".to_string(),
                    stderr: String::new(),
                    exit_code: Some(1),
                },
            );
        let adb = client(&runner);
        adb.uninstall(SERIAL, "com.example", true, "t").expect("uninstall");
        let err = adb.uninstall(SERIAL, "com.missing", false, "t").expect_err("failure");
        assert!(err.error.contains("DELETE_FAILED_INTERNAL_ERROR"));
    }

    #[test]
    fn package_info_reads_three_sources() {
        let runner = ScriptedRunner::new();
        runner
            .on("-s R58M123ABC shell dumpsys package com.example", "    versionName=2.0\n    firstInstallTime=2024-01-02 03:04:05\n")
            .on("-s R58M123ABC shell pm path com.example", "package:/data/app/com.example-1/base.apk\n")
            .on(
                "-s R58M123ABC shell ls -l /data/app/com.example-1/base.apk",
                "-rw-r--r-- 1 system system 2097152 2024-01-02 03:04 /data/app/com.example-1/base.apk\n",
            );
        let info = client(&runner).package_info(SERIAL, "com.example", "t").expect("info");
        assert_eq!(info.version_name.as_deref(), Some("2.0"));
        assert_eq!(info.size.as_deref(), Some("2.0 MB"));
    }

    #[test]
    fn reboot_modes_map_to_targets() {
        let runner = ScriptedRunner::new();
        runner.on("-s R58M123ABC reboot", "").on("-s R58M123ABC reboot bootloader", "");
        let adb = client(&runner);
        adb.reboot(SERIAL, RebootMode::Normal, "t").expect("reboot");
        adb.reboot(SERIAL, RebootMode::Bootloader, "t").expect("reboot");
        assert_eq!(
            runner.calls(),
            vec!["-s R58M123ABC reboot", "-s R58M123ABC reboot bootloader"]
        );
    }

    #[test]
    fn remote_paths_are_validated() {
        let runner = ScriptedRunner::new();
        let adb = client(&runner);
        assert!(adb.list_files(SERIAL, "sdcard", "t").unwrap_err().is_validation());
        assert!(adb.pull(SERIAL, "/sdcard/../data", "/tmp/x", "t").unwrap_err().is_validation());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn list_files_quotes_path() {
        let runner = ScriptedRunner::new();
        runner.on(
            "-s R58M123ABC shell ls -la '/sdcard/My Files'",
            "total 8\ndrwxrwx--x 2 root sdcard_rw 4096 2024-01-01 10:00 Docs\n-rw-rw---- 1 root sdcard_rw 12 2024-01-01 10:01 a.txt\n",
        );
        let files = client(&runner).list_files(SERIAL, "/sdcard/My Files", "t").expect("files");
        assert_eq!(files.len(), 2);
        assert!(files[0].is_dir);
        assert_eq!(files[1].path, "/sdcard/My Files/a.txt");
    }

    #[test]
    fn root_probe_and_enable() {
        let runner = ScriptedRunner::new();
        runner
            .on("-s R58M123ABC shell which su", "/system/xbin/su\n")
            .on("-s R58M123ABC shell su -c id", "uid=0(root) gid=0(root)\n")
            .on_output(
                "-s other shell which su",
                CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: Some(1),
                },
            )
            .on("-s other shell su -c id", "Permission denied\n");
        let adb = client(&runner);
        assert!(adb.can_root(SERIAL, "t").expect("probe"));
        adb.enable_root(SERIAL, "t").expect("root");
        assert!(!adb.can_root("other", "t").expect("probe"));
        let err = adb.enable_root("other", "t").expect_err("denied");
        assert!(err.error.contains("Root access denied"));
    }

    #[test]
    fn root_command_is_quoted_for_su() {
        let runner = ScriptedRunner::new();
        runner.on("-s R58M123ABC shell su -c 'ls '\\''/data/my dir'\\'''", "a\n");
        let output = client(&runner)
            .run_root_command(SERIAL, "ls", &["/data/my dir".to_string()], "t")
            .expect("root run");
        assert_eq!(output, "a\n");
    }

    #[test]
    fn root_push_stages_then_copies() {
        let tmp = TempDir::new().expect("tmp");
        let local = tmp.path().join("hosts");
        std::fs::write(&local, b"127.0.0.1 localhost\n").expect("write");
        let local_display = local.to_string_lossy().to_string();

        let runner = ScriptedRunner::new();
        runner
            .on(&format!("-s R58M123ABC push {local_display} /data/local/tmp/hosts"), "1 file pushed\n")
            .on("-s R58M123ABC shell su -c 'cp '\\''/data/local/tmp/hosts'\\'' '\\''/system/etc/hosts'\\'''", "")
            .on("-s R58M123ABC shell rm -f /data/local/tmp/hosts", "");
        client(&runner)
            .push_file_root(SERIAL, &local_display, "/system/etc/hosts", "t")
            .expect("push");
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], "-s R58M123ABC shell rm -f /data/local/tmp/hosts");
    }

    #[test]
    fn wireless_connect_and_pair_are_classified() {
        let runner = ScriptedRunner::new();
        runner
            .on("connect 192.168.1.20:5555", "connected to 192.168.1.20:5555\n")
            .on("connect 192.168.1.21:5555", "failed to connect to '192.168.1.21:5555': Connection refused\n")
            .on("pair 192.168.1.20:37099 123456", "Successfully paired to 192.168.1.20:37099\n");
        let adb = client(&runner);
        adb.connect("192.168.1.20:5555", "t").expect("connect");
        let err = adb.connect("192.168.1.21:5555", "t").expect_err("refused");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        adb.pair("192.168.1.20:37099", "123456", "t").expect("pair");
        assert!(adb.pair("192.168.1.20:37099", "12", "t").unwrap_err().is_validation());
        assert!(adb.connect("nope", "t").unwrap_err().is_validation());
    }
}
