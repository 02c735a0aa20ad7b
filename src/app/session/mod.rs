pub mod refresh;


use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::app::adb::client::AdbClient;
use crate::app::adb::locator::{resolve_tool_program, Tool};
use crate::app::adb::paths::local_file_name;
use crate::app::adb::runner::CommandRunner;
use crate::app::adb::wireless::{validate_wireless_address, DEFAULT_TCPIP_PORT};
use crate::app::batch::run_batch;
use crate::app::config::AppConfig;
use crate::app::error::{ensure_non_empty, AppError};
use crate::app::fastboot::client::FastbootClient;
use crate::app::mirror::scrcpy::MirrorOptions;
use crate::app::mirror::{MirrorController, MirrorStatus};
use crate::app::models::{
    BatchProgress, BatchSummary, Device, DeviceSelection, FileEntry, RebootMode, RootCapability,
    RosterUpdate, SessionSnapshot,
};

#[derive(Default)]
struct SessionState {
    roster: Vec<Device>,
    selected_serial: Option<String>,
    root: HashMap<String, RootCapability>,
    wireless_address: Option<String>,
    /// Last roster fetch handed out and the newest one applied. Fetches can
    /// overlap, so an older result must not overwrite a newer one.
    fetch_seq: u64,
    applied_seq: u64,
}

impl SessionState {
    fn begin_fetch(&mut self) -> u64 {
        self.fetch_seq += 1;
        self.fetch_seq
    }

    /// Applies a fetched roster. Returns `None` when a newer fetch already
    /// landed, otherwise the serial whose selection was dropped (if any).
    fn apply_roster(&mut self, seq: u64, devices: &[Device]) -> Option<Option<String>> {
        if seq < self.applied_seq {
            return None;
        }
        self.applied_seq = seq;
        self.roster = devices.to_vec();
        let stale = self
            .selected_serial
            .as_ref()
            .is_some_and(|selected| !self.contains(selected));
        let cleared = if stale { self.clear_selection() } else { None };
        let roster = &self.roster;
        self.root
            .retain(|serial, _| roster.iter().any(|device| &device.serial == serial));
        Some(cleared)
    }

    fn contains(&self, serial: &str) -> bool {
        self.roster.iter().any(|device| device.serial == serial)
    }

    fn root_enabled(&self, serial: &str) -> bool {
        self.root.get(serial).map(|cap| cap.enabled).unwrap_or(false)
    }

    fn clear_selection(&mut self) -> Option<String> {
        let serial = self.selected_serial.take()?;
        self.root.remove(&serial);
        Some(serial)
    }
}

/// Owns the selected device and its capability flags and coordinates the
/// bridge, bootloader and mirror clients.
///
/// The state mutex is only held for reads and writes of the state itself,
/// never across a subprocess call, so a slow device never blocks `snapshot`
/// or the roster refresh.
pub struct SessionManager {
    adb: Arc<AdbClient>,
    fastboot: Arc<FastbootClient>,
    mirror: Arc<MirrorController>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(adb: Arc<AdbClient>, fastboot: Arc<FastbootClient>, mirror: Arc<MirrorController>) -> Self {
        Self {
            adb,
            fastboot,
            mirror,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn from_config(config: &AppConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let adb = AdbClient::new(
            resolve_tool_program(Tool::Adb, &config.tools),
            Arc::clone(&runner),
            config.install.clone(),
        );
        let fastboot = FastbootClient::new(
            resolve_tool_program(Tool::Fastboot, &config.tools),
            Arc::clone(&runner),
        );
        let mirror = MirrorController::new(
            resolve_tool_program(Tool::Scrcpy, &config.tools),
            config.mirror.clone(),
            runner,
        );
        Self::new(Arc::new(adb), Arc::new(fastboot), Arc::new(mirror))
    }

    pub fn adb(&self) -> &AdbClient {
        &self.adb
    }

    pub fn fastboot(&self) -> &FastbootClient {
        &self.fastboot
    }

    pub fn mirror(&self) -> &MirrorController {
        &self.mirror
    }

    fn lock(&self, trace_id: &str) -> Result<MutexGuard<'_, SessionState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::system("Session state lock poisoned", trace_id))
    }

    pub fn snapshot(&self, trace_id: &str) -> Result<SessionSnapshot, AppError> {
        let state = self.lock(trace_id)?;
        Ok(SessionSnapshot {
            roster: state.roster.clone(),
            selected_serial: state.selected_serial.clone(),
            root: state
                .selected_serial
                .as_ref()
                .and_then(|serial| state.root.get(serial).copied()),
            wireless_address: state.wireless_address.clone(),
            mirror_running: self.mirror.is_running(),
        })
    }

    pub fn selected_serial(&self, trace_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock(trace_id)?.selected_serial.clone())
    }

    /// Explicit serial if given, otherwise the current selection.
    pub fn resolve_serial(&self, explicit: Option<&str>, trace_id: &str) -> Result<String, AppError> {
        if let Some(serial) = explicit.map(str::trim).filter(|serial| !serial.is_empty()) {
            return Ok(serial.to_string());
        }
        self.selected_serial(trace_id)?
            .ok_or_else(|| AppError::validation("No device selected", trace_id))
    }

    /// Fetches the roster and reconciles the selection against it. A failed
    /// fetch leaves the previous state untouched, and so does one that
    /// finishes after a newer fetch was applied.
    pub fn refresh_roster(&self, trace_id: &str) -> Result<RosterUpdate, AppError> {
        let seq = self.lock(trace_id)?.begin_fetch();
        let devices = self.adb.devices(trace_id)?;

        let applied = self.lock(trace_id)?.apply_roster(seq, &devices);
        let Some(cleared_selection) = applied else {
            info!(trace_id = %trace_id, seq, "discarding roster from an older fetch");
            let state = self.lock(trace_id)?;
            return Ok(RosterUpdate {
                devices: state.roster.clone(),
                cleared_selection: None,
            });
        };
        let serials: Vec<String> = devices.iter().map(|device| device.serial.clone()).collect();
        self.adb.locks().retain(&serials);

        if let Some(serial) = cleared_selection.as_deref() {
            info!(trace_id = %trace_id, serial = %serial, "selected device left the roster");
        }
        Ok(RosterUpdate {
            devices,
            cleared_selection,
        })
    }

    pub fn select_device(&self, serial: &str, trace_id: &str) -> Result<DeviceSelection, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        let serial = serial.trim();

        if !self.lock(trace_id)?.contains(serial) {
            self.refresh_roster(trace_id)?;
        }
        {
            let mut state = self.lock(trace_id)?;
            if !state.contains(serial) {
                return Err(AppError::validation(
                    format!("Device {serial} is not connected"),
                    trace_id,
                ));
            }
            state.selected_serial = Some(serial.to_string());
            state.root.insert(serial.to_string(), RootCapability::default());
            state.wireless_address = None;
        }
        info!(trace_id = %trace_id, serial = %serial, "device selected");

        let available = match self.adb.can_root(serial, trace_id) {
            Ok(available) => available,
            Err(err) => {
                warn!(trace_id = %trace_id, serial = %serial, error = %err, "root probe failed");
                false
            }
        };
        let root = {
            let mut state = self.lock(trace_id)?;
            match state.root.get_mut(serial) {
                Some(capability) => {
                    capability.available = available;
                    *capability
                }
                None => RootCapability {
                    available,
                    enabled: false,
                },
            }
        };

        let info = self.adb.device_info(serial, trace_id)?;
        Ok(DeviceSelection {
            serial: serial.to_string(),
            root,
            info,
        })
    }

    /// Enabling asks the device for root and flips the flag only on success.
    /// Disabling is local bookkeeping.
    pub fn set_root_enabled(&self, serial: &str, desired: bool, trace_id: &str) -> Result<RootCapability, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        let serial = serial.trim();
        if !desired {
            let mut state = self.lock(trace_id)?;
            let capability = state.root.entry(serial.to_string()).or_default();
            capability.enabled = false;
            return Ok(*capability);
        }

        let result = self.adb.enable_root(serial, trace_id);
        let mut state = self.lock(trace_id)?;
        let capability = state.root.entry(serial.to_string()).or_default();
        match result {
            Ok(()) => {
                capability.available = true;
                capability.enabled = true;
                info!(trace_id = %trace_id, serial = %serial, "root enabled");
                Ok(*capability)
            }
            Err(err) => {
                capability.enabled = false;
                Err(err)
            }
        }
    }

    pub fn root_capability(&self, serial: &str, trace_id: &str) -> Result<RootCapability, AppError> {
        Ok(self
            .lock(trace_id)?
            .root
            .get(serial.trim())
            .copied()
            .unwrap_or_default())
    }

    fn root_enabled(&self, serial: &str, trace_id: &str) -> Result<bool, AppError> {
        Ok(self.lock(trace_id)?.root_enabled(serial))
    }

    pub fn set_wireless_address(&self, address: &str, trace_id: &str) -> Result<(), AppError> {
        validate_wireless_address(address).map_err(|err| AppError::validation(err, trace_id))?;
        self.lock(trace_id)?.wireless_address = Some(address.trim().to_string());
        Ok(())
    }

    pub fn clear_wireless_address(&self, trace_id: &str) -> Result<(), AppError> {
        self.lock(trace_id)?.wireless_address = None;
        Ok(())
    }

    pub fn connect_wireless(&self, address: &str, trace_id: &str) -> Result<String, AppError> {
        let output = self.adb.connect(address, trace_id)?;
        self.lock(trace_id)?.wireless_address = Some(address.trim().to_string());
        Ok(output)
    }

    pub fn disconnect_wireless(&self, trace_id: &str) -> Result<String, AppError> {
        let address = self
            .lock(trace_id)?
            .wireless_address
            .clone()
            .ok_or_else(|| AppError::validation("No wireless connection recorded", trace_id))?;
        let output = self.adb.disconnect(&address, trace_id)?;
        let mut state = self.lock(trace_id)?;
        if state.wireless_address.as_deref() == Some(address.as_str()) {
            state.wireless_address = None;
        }
        Ok(output)
    }

    pub fn enable_tcpip(&self, serial: Option<&str>, port: Option<u16>, trace_id: &str) -> Result<String, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        self.adb
            .tcpip(&serial, port.unwrap_or(DEFAULT_TCPIP_PORT), trace_id)
    }

    pub fn pair_wireless(&self, address: &str, code: &str, trace_id: &str) -> Result<String, AppError> {
        self.adb.pair(address, code, trace_id)
    }

    /// Routed through `su -c` while root is enabled for the device.
    pub fn shell(&self, serial: Option<&str>, command: &str, trace_id: &str) -> Result<String, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        if self.root_enabled(&serial, trace_id)? {
            self.adb.run_root_command(&serial, command, &[], trace_id)
        } else {
            self.adb.shell(&serial, command, trace_id)
        }
    }

    pub fn push_file(&self, serial: Option<&str>, local_path: &str, remote_path: &str, trace_id: &str) -> Result<String, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        if self.root_enabled(&serial, trace_id)? {
            self.adb.push_file_root(&serial, local_path, remote_path, trace_id)
        } else {
            self.adb.push(&serial, local_path, remote_path, trace_id)
        }
    }

    pub fn pull_file(&self, serial: Option<&str>, remote_path: &str, local_path: &str, trace_id: &str) -> Result<String, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        self.adb.pull(&serial, remote_path, local_path, trace_id)
    }

    pub fn list_files(&self, serial: Option<&str>, remote_path: &str, trace_id: &str) -> Result<Vec<FileEntry>, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        if self.root_enabled(&serial, trace_id)? {
            self.adb.list_files_root(&serial, remote_path, trace_id)
        } else {
            self.adb.list_files(&serial, remote_path, trace_id)
        }
    }

    pub fn run_root_command(&self, serial: Option<&str>, command: &str, args: &[String], trace_id: &str) -> Result<String, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        self.adb.run_root_command(&serial, command, args, trace_id)
    }

    pub fn run_root_script(&self, serial: Option<&str>, script_path: &str, trace_id: &str) -> Result<String, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        self.adb.run_root_script(&serial, script_path, trace_id)
    }

    /// Rebooting the selected device ends its selection.
    pub fn reboot(&self, serial: Option<&str>, mode: RebootMode, trace_id: &str) -> Result<(), AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        self.adb.reboot(&serial, mode, trace_id)?;
        let mut state = self.lock(trace_id)?;
        if state.selected_serial.as_deref() == Some(serial.as_str()) {
            state.clear_selection();
            info!(trace_id = %trace_id, serial = %serial, "selection cleared after reboot");
        }
        Ok(())
    }

    /// The target serial is fixed when the batch starts; changing the selection
    /// mid-batch does not redirect remaining items.
    pub fn install_batch(
        &self,
        serial: Option<&str>,
        apk_paths: &[String],
        on_progress: impl FnMut(BatchProgress),
        trace_id: &str,
    ) -> Result<BatchSummary, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        info!(trace_id = %trace_id, serial = %serial, count = apk_paths.len(), "install batch");
        Ok(run_batch(
            apk_paths,
            |path| local_file_name(path),
            |path| {
                let outcome = self.adb.install(&serial, path, trace_id)?;
                if outcome.is_success() {
                    Ok(outcome.message())
                } else {
                    Err(AppError::dependency(outcome.message(), trace_id))
                }
            },
            on_progress,
            trace_id,
        ))
    }

    pub fn uninstall_batch(
        &self,
        serial: Option<&str>,
        packages: &[String],
        keep_data: bool,
        on_progress: impl FnMut(BatchProgress),
        trace_id: &str,
    ) -> Result<BatchSummary, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        info!(trace_id = %trace_id, serial = %serial, count = packages.len(), keep_data, "uninstall batch");
        Ok(run_batch(
            packages,
            |package| package.trim().to_string(),
            |package| {
                self.adb.uninstall(&serial, package, keep_data, trace_id)?;
                Ok("Success".to_string())
            },
            on_progress,
            trace_id,
        ))
    }

    pub fn start_mirror(&self, serial: Option<&str>, options: &MirrorOptions, trace_id: &str) -> Result<MirrorStatus, AppError> {
        let serial = self.resolve_serial(serial, trace_id)?;
        self.mirror.start(&serial, options, trace_id)
    }

    pub fn stop_mirror(&self, trace_id: &str) -> Result<MirrorStatus, AppError> {
        self.mirror.stop(trace_id)
    }
}
