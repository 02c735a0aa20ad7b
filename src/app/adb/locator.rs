use std::path::{Path, PathBuf};

use crate::app::adb::runner::{to_args, CommandRunner};
use crate::app::config::ToolSettings;
use crate::app::models::ToolInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Adb,
    Fastboot,
    Scrcpy,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Adb => "adb",
            Tool::Fastboot => "fastboot",
            Tool::Scrcpy => "scrcpy",
        }
    }

    fn file_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.name())
        } else {
            self.name().to_string()
        }
    }

    fn version_args(&self) -> Vec<String> {
        match self {
            Tool::Adb => to_args(["version"]),
            Tool::Fastboot | Tool::Scrcpy => to_args(["--version"]),
        }
    }

    /// Install locations checked when nothing is configured. Only scrcpy is
    /// commonly installed outside `PATH`.
    fn well_known_paths(&self) -> &'static [&'static str] {
        match self {
            Tool::Scrcpy if cfg!(target_os = "macos") => &[
                "/opt/homebrew/bin/scrcpy",
                "/usr/local/bin/scrcpy",
                "~/Applications/scrcpy.app/Contents/MacOS/scrcpy",
            ],
            Tool::Scrcpy if cfg!(unix) => &[
                "/usr/bin/scrcpy",
                "/usr/local/bin/scrcpy",
                "/snap/bin/scrcpy",
                "~/.local/bin/scrcpy",
                "/opt/scrcpy/scrcpy",
            ],
            _ => &[],
        }
    }

    fn configured<'a>(&self, settings: &'a ToolSettings) -> &'a str {
        match self {
            Tool::Adb => &settings.adb_path,
            Tool::Fastboot => &settings.fastboot_path,
            Tool::Scrcpy => &settings.scrcpy_path,
        }
    }
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Configured path, then `bin_dir/<tool>`, then well-known install locations,
/// then the bare name looked up on `PATH`.
pub fn resolve_tool_program(tool: Tool, settings: &ToolSettings) -> String {
    let configured = normalize_command_path(tool.configured(settings));
    if !configured.is_empty() {
        return expand_home(&configured);
    }
    let bin_dir = normalize_command_path(&settings.bin_dir);
    if !bin_dir.is_empty() {
        let candidate = PathBuf::from(expand_home(&bin_dir)).join(tool.file_name());
        if candidate.is_file() {
            return candidate.to_string_lossy().to_string();
        }
    }
    for path in tool.well_known_paths() {
        let expanded = expand_home(path);
        if Path::new(&expanded).is_file() {
            return expanded;
        }
    }
    tool.name().to_string()
}

/// Runs the tool's version command. Never fails; an unusable tool is reported
/// through `available` and `error`.
pub fn probe_tool(tool: Tool, program: &str, runner: &dyn CommandRunner, trace_id: &str) -> ToolInfo {
    let mut info = ToolInfo {
        name: tool.name().to_string(),
        available: false,
        command_path: program.to_string(),
        version_output: String::new(),
        error: None,
    };
    if let Err(err) = validate_tool_program(tool, program) {
        info.error = Some(err);
        return info;
    }
    match runner.run_checked(program, &tool.version_args(), trace_id) {
        Ok(output) => {
            info.available = true;
            info.version_output = output.combined();
        }
        Err(err) => info.error = Some(err.error),
    }
    info
}

pub fn validate_tool_program(tool: Tool, program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err(format!("{} command is empty", tool.name()));
    }
    if program == tool.name() {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(format!("{} path must point to an executable file", tool.name()));
    }
    if !path.exists() {
        return Err(format!("{} executable not found at the configured path", tool.name()));
    }
    Ok(())
}

pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}
