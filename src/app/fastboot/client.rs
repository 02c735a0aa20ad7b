use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::app::adb::locator::{expand_home, probe_tool, Tool};
use crate::app::adb::runner::CommandRunner;
use crate::app::error::{ensure_non_empty, AppError};
use crate::app::fastboot::parse::{
    parse_fastboot_devices, parse_getvar, validate_partition, validate_variable,
};
use crate::app::models::{BootloaderDevice, BootloaderRebootMode, ToolInfo};

pub const INIT_BOOT_PARTITION: &str = "init_boot";

/// Bootloader operations. `target` selects a device with `-s` when more than
/// one is attached; `None` lets fastboot pick the only one.
pub struct FastbootClient {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl FastbootClient {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn version(&self, trace_id: &str) -> ToolInfo {
        probe_tool(Tool::Fastboot, &self.program, self.runner.as_ref(), trace_id)
    }

    /// Runs fastboot and returns its combined output. fastboot reports progress
    /// and most failures on stderr, sometimes with a zero exit.
    fn run(&self, target: Option<&str>, args: &[&str], trace_id: &str) -> Result<String, AppError> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = target.map(str::trim).filter(|serial| !serial.is_empty()) {
            full.push("-s".to_string());
            full.push(serial.to_string());
        }
        full.extend(args.iter().map(|arg| arg.to_string()));
        let output = self
            .runner
            .run(&self.program, &full, trace_id)?
            .into_success(trace_id)?;
        let combined = output.combined();
        if combined
            .lines()
            .any(|line| line.contains("FAILED (") || line.starts_with("fastboot: error"))
        {
            return Err(AppError::dependency(combined, trace_id));
        }
        Ok(combined)
    }

    pub fn devices(&self, trace_id: &str) -> Result<Vec<BootloaderDevice>, AppError> {
        let output = self
            .runner
            .run(&self.program, &["devices".to_string()], trace_id)?
            .into_success(trace_id)
            .map_err(|err| err.context("fastboot devices failed"))?;
        Ok(parse_fastboot_devices(&output.stdout))
    }

    pub fn unlock(&self, target: Option<&str>, trace_id: &str) -> Result<String, AppError> {
        self.run(target, &["flashing", "unlock"], trace_id)
    }

    pub fn unlock_oem(&self, target: Option<&str>, trace_id: &str) -> Result<String, AppError> {
        self.run(target, &["oem", "unlock"], trace_id)
    }

    pub fn lock(&self, target: Option<&str>, trace_id: &str) -> Result<String, AppError> {
        self.run(target, &["flashing", "lock"], trace_id)
    }

    pub fn lock_oem(&self, target: Option<&str>, trace_id: &str) -> Result<String, AppError> {
        self.run(target, &["oem", "lock"], trace_id)
    }

    pub fn flash(&self, target: Option<&str>, partition: &str, image_path: &str, trace_id: &str) -> Result<String, AppError> {
        validate_partition(partition).map_err(|err| AppError::validation(err, trace_id))?;
        ensure_non_empty(image_path, "image_path", trace_id)?;
        let image = expand_home(image_path.trim());
        if !Path::new(&image).is_file() {
            return Err(AppError::validation(format!("Image file not found: {image}"), trace_id));
        }
        info!(trace_id = %trace_id, partition = %partition.trim(), image = %image, "fastboot flash");
        self.run(target, &["flash", partition.trim(), &image], trace_id)
    }

    pub fn flash_boot(&self, target: Option<&str>, image_path: &str, trace_id: &str) -> Result<String, AppError> {
        self.flash(target, "boot", image_path, trace_id)
    }

    pub fn flash_init_boot(&self, target: Option<&str>, image_path: &str, trace_id: &str) -> Result<String, AppError> {
        self.flash(target, INIT_BOOT_PARTITION, image_path, trace_id)
    }

    pub fn erase(&self, target: Option<&str>, partition: &str, trace_id: &str) -> Result<String, AppError> {
        validate_partition(partition).map_err(|err| AppError::validation(err, trace_id))?;
        self.run(target, &["erase", partition.trim()], trace_id)
    }

    pub fn format(&self, target: Option<&str>, partition: &str, trace_id: &str) -> Result<String, AppError> {
        validate_partition(partition).map_err(|err| AppError::validation(err, trace_id))?;
        self.run(target, &["format", partition.trim()], trace_id)
    }

    pub fn reboot(&self, target: Option<&str>, mode: BootloaderRebootMode, trace_id: &str) -> Result<String, AppError> {
        let mut args = vec!["reboot"];
        if let Some(mode) = mode.target() {
            args.push(mode);
        }
        self.run(target, &args, trace_id)
    }

    /// Value of one bootloader variable, or `None` when the bootloader does not report it.
    pub fn getvar(&self, target: Option<&str>, name: &str, trace_id: &str) -> Result<Option<String>, AppError> {
        validate_variable(name).map_err(|err| AppError::validation(err, trace_id))?;
        let output = self.run(target, &["getvar", name.trim()], trace_id)?;
        Ok(parse_getvar(&output, name.trim()))
    }

    /// Passes arbitrary arguments through; the caller owns their meaning.
    pub fn raw(&self, target: Option<&str>, args: &[String], trace_id: &str) -> Result<String, AppError> {
        if args.iter().all(|arg| arg.trim().is_empty()) {
            return Err(AppError::validation("args are required", trace_id));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(target, &args, trace_id)
    }
}
