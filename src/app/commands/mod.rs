use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::locator::{normalize_command_path, probe_tool, resolve_tool_program, Tool};
use crate::app::config::{save_config_to_path, validate_config, AppConfig};
use crate::app::error::AppError;
use crate::app::mirror::scrcpy::MirrorOptions;
use crate::app::mirror::MirrorStatus;
use crate::app::models::{
    BatchProgress, BatchSummary, BootloaderDevice, BootloaderRebootMode, CommandResponse,
    DeviceInfoSnapshot, DeviceSelection, FileEntry, HostCommandResult, PackageInfo, RebootMode,
    RootCapability, RosterUpdate, ScreenInfo, ScreenshotResult, SessionSnapshot, ToolInfo,
};
use crate::app::session::refresh::{start_refresh_loop, RefreshEvent};
use crate::app::state::AppState;


fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn respond<T>(trace_id: String, data: T) -> Result<CommandResponse<T>, AppError> {
    Ok(CommandResponse { trace_id, data })
}

fn host_result(trace_id: String, output: String) -> Result<CommandResponse<HostCommandResult>, AppError> {
    respond(trace_id, HostCommandResult { output })
}

pub fn get_config(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<AppConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let config = state.config(&trace_id)?.clone();
    respond(trace_id, config)
}

pub fn save_app_config(
    state: &AppState,
    config: AppConfig,
    trace_id: Option<String>,
) -> Result<CommandResponse<AppConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "save_app_config");
    let config = validate_config(config);
    save_config_to_path(&config, &state.config_path, &state.backup_path, &trace_id)?;
    *state.config(&trace_id)? = config.clone();
    respond(trace_id, config)
}

pub fn reset_config(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<AppConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "reset_config");
    let config = validate_config(AppConfig::default());
    save_config_to_path(&config, &state.config_path, &state.backup_path, &trace_id)?;
    *state.config(&trace_id)? = config.clone();
    respond(trace_id, config)
}

/// Probes adb, fastboot and scrcpy. An explicit `adb_path` overrides the
/// configured one for this check only.
pub fn check_tools(
    state: &AppState,
    adb_path: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<ToolInfo>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "check_tools");
    let tools = state.config(&trace_id)?.tools.clone();

    let infos = [Tool::Adb, Tool::Fastboot, Tool::Scrcpy]
        .into_iter()
        .map(|tool| {
            let program = match (tool, adb_path.as_deref().map(normalize_command_path)) {
                (Tool::Adb, Some(path)) if !path.is_empty() => path,
                _ => resolve_tool_program(tool, &tools),
            };
            let info = probe_tool(tool, &program, state.runner.as_ref(), &trace_id);
            if !info.available {
                warn!(trace_id = %trace_id, tool = tool.name(), error = ?info.error, "tool unavailable");
            }
            info
        })
        .collect();
    respond(trace_id, infos)
}

pub fn get_session(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<SessionSnapshot>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let snapshot = state.session.snapshot(&trace_id)?;
    respond(trace_id, snapshot)
}

pub fn refresh_devices(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<RosterUpdate>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "refresh_devices");
    let update = state.session.refresh_roster(&trace_id)?;
    respond(trace_id, update)
}

pub fn select_device(
    state: &AppState,
    serial: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<DeviceSelection>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = %serial, "select_device");
    let selection = state.session.select_device(&serial, &trace_id)?;
    respond(trace_id, selection)
}

pub fn get_device_info(
    state: &AppState,
    serial: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<DeviceInfoSnapshot>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "get_device_info");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let info = state.session.adb().device_info(&serial, &trace_id)?;
    respond(trace_id, info)
}

pub fn set_root_enabled(
    state: &AppState,
    serial: Option<String>,
    enabled: bool,
    trace_id: Option<String>,
) -> Result<CommandResponse<RootCapability>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, enabled, "set_root_enabled");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let capability = state.session.set_root_enabled(&serial, enabled, &trace_id)?;
    respond(trace_id, capability)
}

pub fn set_wireless_address(
    state: &AppState,
    address: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<SessionSnapshot>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    state.session.set_wireless_address(&address, &trace_id)?;
    let snapshot = state.session.snapshot(&trace_id)?;
    respond(trace_id, snapshot)
}

pub fn clear_wireless_address(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<SessionSnapshot>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    state.session.clear_wireless_address(&trace_id)?;
    let snapshot = state.session.snapshot(&trace_id)?;
    respond(trace_id, snapshot)
}

pub fn adb_connect(
    state: &AppState,
    address: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, address = %address, "adb_connect");
    let output = state.session.connect_wireless(&address, &trace_id)?;
    host_result(trace_id, output)
}

pub fn adb_disconnect(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "adb_disconnect");
    let output = state.session.disconnect_wireless(&trace_id)?;
    host_result(trace_id, output)
}

pub fn adb_pair(
    state: &AppState,
    address: String,
    pairing_code: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, address = %address, "adb_pair");
    let output = state.session.pair_wireless(&address, &pairing_code, &trace_id)?;
    host_result(trace_id, output)
}

pub fn enable_tcpip(
    state: &AppState,
    serial: Option<String>,
    port: Option<u16>,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, port = ?port, "enable_tcpip");
    let output = state.session.enable_tcpip(serial.as_deref(), port, &trace_id)?;
    host_result(trace_id, output)
}

pub fn run_shell(
    state: &AppState,
    serial: Option<String>,
    command: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "run_shell");
    let output = state.session.shell(serial.as_deref(), &command, &trace_id)?;
    host_result(trace_id, output)
}

pub fn run_root_command(
    state: &AppState,
    serial: Option<String>,
    command: String,
    args: Vec<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "run_root_command");
    let output = state
        .session
        .run_root_command(serial.as_deref(), &command, &args, &trace_id)?;
    host_result(trace_id, output)
}

pub fn run_root_script(
    state: &AppState,
    serial: Option<String>,
    script_path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, script = %script_path, "run_root_script");
    let output = state
        .session
        .run_root_script(serial.as_deref(), &script_path, &trace_id)?;
    host_result(trace_id, output)
}

pub fn push_device_file(
    state: &AppState,
    serial: Option<String>,
    local_path: String,
    device_path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, device_path = %device_path, "push_device_file");
    let output = state
        .session
        .push_file(serial.as_deref(), &local_path, &device_path, &trace_id)?;
    host_result(trace_id, output)
}

pub fn pull_device_file(
    state: &AppState,
    serial: Option<String>,
    device_path: String,
    output_path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, device_path = %device_path, "pull_device_file");
    let output = state
        .session
        .pull_file(serial.as_deref(), &device_path, &output_path, &trace_id)?;
    host_result(trace_id, output)
}

pub fn list_device_files(
    state: &AppState,
    serial: Option<String>,
    path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<FileEntry>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, path = %path, "list_device_files");
    let entries = state.session.list_files(serial.as_deref(), &path, &trace_id)?;
    respond(trace_id, entries)
}

pub fn reboot_device(
    state: &AppState,
    serial: Option<String>,
    mode: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, mode = ?mode, "reboot_device");
    let mode = RebootMode::parse(mode.as_deref().unwrap_or_default(), &trace_id)?;
    state.session.reboot(serial.as_deref(), mode, &trace_id)?;
    respond(trace_id, true)
}

pub fn capture_screenshot(
    state: &AppState,
    serial: Option<String>,
    output_path: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<ScreenshotResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "capture_screenshot");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let output_path = output_path.filter(|path| !path.trim().is_empty());
    let result = state
        .session
        .adb()
        .screenshot(&serial, output_path.as_deref(), &trace_id)?;
    respond(trace_id, result)
}

pub fn get_screen_info(
    state: &AppState,
    serial: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<ScreenInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let screen = state.session.adb().screen_info(&serial, &trace_id)?;
    respond(trace_id, screen)
}

/// `None` for a dimension resets it to the panel's physical value.
pub fn set_screen_resolution(
    state: &AppState,
    serial: Option<String>,
    size: Option<(u32, u32)>,
    trace_id: Option<String>,
) -> Result<CommandResponse<ScreenInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, size = ?size, "set_screen_resolution");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let adb = state.session.adb();
    match size {
        Some((width, height)) => adb.set_screen_resolution(&serial, width, height, &trace_id)?,
        None => adb.reset_screen_resolution(&serial, &trace_id)?,
    }
    let screen = adb.screen_info(&serial, &trace_id)?;
    respond(trace_id, screen)
}

pub fn set_screen_density(
    state: &AppState,
    serial: Option<String>,
    density: Option<u32>,
    trace_id: Option<String>,
) -> Result<CommandResponse<ScreenInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, density = ?density, "set_screen_density");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let adb = state.session.adb();
    match density {
        Some(density) => adb.set_screen_density(&serial, density, &trace_id)?,
        None => adb.reset_screen_density(&serial, &trace_id)?,
    }
    let screen = adb.screen_info(&serial, &trace_id)?;
    respond(trace_id, screen)
}

pub fn install_apk_batch(
    state: &AppState,
    serial: Option<String>,
    apk_paths: Vec<String>,
    on_progress: impl FnMut(BatchProgress),
    trace_id: Option<String>,
) -> Result<CommandResponse<BatchSummary>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, count = apk_paths.len(), "install_apk_batch");
    if apk_paths.is_empty() {
        return Err(AppError::validation("apk_paths is required", &trace_id));
    }
    let summary = state
        .session
        .install_batch(serial.as_deref(), &apk_paths, on_progress, &trace_id)?;
    respond(trace_id, summary)
}

pub fn uninstall_app_batch(
    state: &AppState,
    serial: Option<String>,
    packages: Vec<String>,
    keep_data: bool,
    on_progress: impl FnMut(BatchProgress),
    trace_id: Option<String>,
) -> Result<CommandResponse<BatchSummary>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, count = packages.len(), "uninstall_app_batch");
    if packages.is_empty() {
        return Err(AppError::validation("packages is required", &trace_id));
    }
    let summary = state.session.uninstall_batch(
        serial.as_deref(),
        &packages,
        keep_data,
        on_progress,
        &trace_id,
    )?;
    respond(trace_id, summary)
}

pub fn list_apps(
    state: &AppState,
    serial: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<String>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "list_apps");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let packages = state.session.adb().list_packages(&serial, &trace_id)?;
    respond(trace_id, packages)
}

pub fn get_app_info(
    state: &AppState,
    serial: Option<String>,
    package_name: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<PackageInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, package = %package_name, "get_app_info");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let info = state
        .session
        .adb()
        .package_info(&serial, &package_name, &trace_id)?;
    respond(trace_id, info)
}

/// Disabling freezes the package for the current user; enabling thaws it.
pub fn set_app_enabled(
    state: &AppState,
    serial: Option<String>,
    package_name: String,
    enabled: bool,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, package = %package_name, enabled, "set_app_enabled");
    let serial = state.session.resolve_serial(serial.as_deref(), &trace_id)?;
    let adb = state.session.adb();
    if enabled {
        adb.unfreeze(&serial, &package_name, &trace_id)?;
    } else {
        adb.freeze(&serial, &package_name, &trace_id)?;
    }
    respond(trace_id, enabled)
}

pub fn start_mirror(
    state: &AppState,
    serial: Option<String>,
    options: Option<MirrorOptions>,
    trace_id: Option<String>,
) -> Result<CommandResponse<MirrorStatus>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "start_mirror");
    let options = options.unwrap_or_default();
    let status = state
        .session
        .start_mirror(serial.as_deref(), &options, &trace_id)?;
    respond(trace_id, status)
}

pub fn stop_mirror(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<MirrorStatus>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "stop_mirror");
    let status = state.session.stop_mirror(&trace_id)?;
    respond(trace_id, status)
}

pub fn get_mirror_status(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<MirrorStatus>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let status = state.session.mirror().status(&trace_id)?;
    respond(trace_id, status)
}

pub fn list_bootloader_devices(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<BootloaderDevice>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "list_bootloader_devices");
    let devices = state.session.fastboot().devices(&trace_id)?;
    respond(trace_id, devices)
}

pub fn fastboot_set_lock(
    state: &AppState,
    serial: Option<String>,
    locked: bool,
    oem: bool,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, locked, oem, "fastboot_set_lock");
    let fastboot = state.session.fastboot();
    let target = serial.as_deref();
    let output = match (locked, oem) {
        (true, false) => fastboot.lock(target, &trace_id)?,
        (true, true) => fastboot.lock_oem(target, &trace_id)?,
        (false, false) => fastboot.unlock(target, &trace_id)?,
        (false, true) => fastboot.unlock_oem(target, &trace_id)?,
    };
    host_result(trace_id, output)
}

pub fn fastboot_flash(
    state: &AppState,
    serial: Option<String>,
    partition: String,
    image_path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, partition = %partition, "fastboot_flash");
    let fastboot = state.session.fastboot();
    let target = serial.as_deref();
    let output = match partition.trim() {
        "boot" => fastboot.flash_boot(target, &image_path, &trace_id)?,
        "init_boot" | "initboot" => fastboot.flash_init_boot(target, &image_path, &trace_id)?,
        other => fastboot.flash(target, other, &image_path, &trace_id)?,
    };
    host_result(trace_id, output)
}

pub fn fastboot_erase(
    state: &AppState,
    serial: Option<String>,
    partition: String,
    format: bool,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, partition = %partition, format, "fastboot_erase");
    let fastboot = state.session.fastboot();
    let output = if format {
        fastboot.format(serial.as_deref(), &partition, &trace_id)?
    } else {
        fastboot.erase(serial.as_deref(), &partition, &trace_id)?
    };
    host_result(trace_id, output)
}

pub fn fastboot_reboot(
    state: &AppState,
    serial: Option<String>,
    mode: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, mode = ?mode, "fastboot_reboot");
    let mode = BootloaderRebootMode::parse(mode.as_deref().unwrap_or_default(), &trace_id)?;
    let output = state
        .session
        .fastboot()
        .reboot(serial.as_deref(), mode, &trace_id)?;
    host_result(trace_id, output)
}

pub fn fastboot_getvar(
    state: &AppState,
    serial: Option<String>,
    name: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<Option<String>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, name = %name, "fastboot_getvar");
    let value = state
        .session
        .fastboot()
        .getvar(serial.as_deref(), &name, &trace_id)?;
    respond(trace_id, value)
}

pub fn fastboot_raw(
    state: &AppState,
    serial: Option<String>,
    args: Vec<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<HostCommandResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, args = ?args, "fastboot_raw");
    let output = state
        .session
        .fastboot()
        .raw(serial.as_deref(), &args, &trace_id)?;
    host_result(trace_id, output)
}

/// Starts the periodic roster refresh. Returns `false` when it is already running.
pub fn start_device_refresh<E>(
    state: &AppState,
    emit: E,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError>
where
    E: Fn(RefreshEvent) + Send + 'static,
{
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "start_device_refresh");
    let interval_secs = state.config(&trace_id)?.device.refresh_interval_secs.max(1);

    let mut slot = state.refresh_loop(&trace_id)?;
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
        return respond(trace_id, false);
    }
    if let Some(finished) = slot.take() {
        finished.stop();
    }
    *slot = Some(start_refresh_loop(
        Arc::clone(&state.session),
        Duration::from_secs(interval_secs),
        trace_id.clone(),
        emit,
    ));
    respond(trace_id, true)
}

pub fn stop_device_refresh(state: &AppState, trace_id: Option<String>) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "stop_device_refresh");
    let handle = state.refresh_loop(&trace_id)?.take();
    let stopped = match handle {
        Some(handle) => {
            handle.stop();
            true
        }
        None => false,
    };
    respond(trace_id, stopped)
}
