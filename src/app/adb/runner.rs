use std::io::Read;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::app::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn text(&self) -> &str {
        self.stdout.trim()
    }

    /// stdout followed by stderr, trimmed. fastboot reports almost everything on stderr.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Rejects a nonzero exit with the tool's diagnostic text.
    pub fn into_success(self, trace_id: &str) -> Result<CommandOutput, AppError> {
        if self.succeeded() {
            return Ok(self);
        }
        let detail = if !self.stderr.trim().is_empty() {
            self.stderr.trim().to_string()
        } else if !self.stdout.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            }
        };
        Err(AppError::dependency(detail, trace_id))
    }
}

/// Seam between the clients and the operating system.
pub trait CommandRunner: Send + Sync {
    /// Runs `program args` to completion. A nonzero exit is still `Ok`; only
    /// spawn and capture failures are errors.
    fn run(&self, program: &str, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError>;

    fn run_checked(
        &self,
        program: &str,
        args: &[String],
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        self.run(program, args, trace_id)?.into_success(trace_id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        run_command(program, args, trace_id)
    }
}

pub fn run_command(program: &str, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "spawn");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn {program}: {err}"), trace_id))?;

    // Drain both pipes concurrently; a chatty child blocks once a pipe buffer fills.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;

    let stdout_handle = std::thread::spawn(move || drain(stdout));
    let stderr_handle = std::thread::spawn(move || drain(stderr));

    let status = child.wait();
    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();
    let status = status
        .map_err(|err| AppError::system(format!("Failed to wait for {program}: {err}"), trace_id))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code: status.code(),
    })
}

fn drain(mut reader: impl Read) -> Vec<u8> {
    let mut buffer = Vec::<u8>::new();
    let mut temp = [0u8; 4096];
    loop {
        match reader.read(&mut temp) {
            Ok(0) => break,
            Ok(count) => buffer.extend_from_slice(&temp[..count]),
            Err(_) => break,
        }
    }
    buffer
}

pub fn to_args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|item| item.as_ref().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> (String, Vec<String>) {
        if cfg!(windows) {
            ("cmd.exe".to_string(), to_args(["/C", script]))
        } else {
            ("sh".to_string(), to_args(["-c", script]))
        }
    }

    #[test]
    fn run_command_does_not_deadlock_on_large_stdout() {
        let (program, args) = if cfg!(windows) {
            sh("for /L %i in (1,1,100000) do @echo 1234567890")
        } else {
            sh("i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done")
        };

        let output = run_command(&program, &args, "trace-large").expect("large output");
        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.len() >= 1_000_000);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_surfaces_stderr() {
        let (program, args) = sh("echo 'error: device offline' >&2; exit 1");
        let err = SystemRunner
            .run_checked(&program, &args, "trace-stderr")
            .expect_err("nonzero exit");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert_eq!(err.error, "error: device offline");
    }

    #[cfg(unix)]
    #[test]
    fn silent_nonzero_exit_reports_code() {
        let (program, args) = sh("exit 7");
        let err = SystemRunner
            .run_checked(&program, &args, "trace-code")
            .expect_err("nonzero exit");
        assert_eq!(err.error, "exit code 7");
    }

    #[test]
    fn missing_binary_is_system_error() {
        let err = run_command("/definitely/not/a/real/tool", &[], "trace-missing")
            .expect_err("spawn failure");
        assert_eq!(err.code, "ERR_SYSTEM");
        assert!(err.error.contains("Failed to spawn"));
    }

    #[test]
    fn combined_prefers_present_streams() {
        let output = CommandOutput {
            stdout: "  \n".to_string(),
            stderr: "version: 0.4\nFinished.\n".to_string(),
            exit_code: Some(0),
        };
        assert_eq!(output.combined(), "version: 0.4\nFinished.");
        assert_eq!(output.text(), "");
    }
}
