pub mod scrcpy;

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::adb::locator::{probe_tool, Tool};
use crate::app::adb::runner::CommandRunner;
use crate::app::config::MirrorSettings;
use crate::app::error::{ensure_non_empty, AppError};
use crate::app::mirror::scrcpy::{
    build_scrcpy_args, parse_scrcpy_major, resolve_options, MirrorOptions,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STARTUP_OUTPUT_LINES: usize = 40;

/// Spawns the mirroring tool. Must pipe stdout and stderr.
pub type Launcher = Arc<dyn Fn(&str, &[String]) -> io::Result<Child> + Send + Sync>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MirrorPhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorStatus {
    pub phase: MirrorPhase,
    pub serial: Option<String>,
    pub pid: Option<u32>,
}

impl MirrorStatus {
    pub fn is_running(&self) -> bool {
        self.phase != MirrorPhase::Idle
    }
}

struct Session {
    phase: MirrorPhase,
    serial: Option<String>,
    child: Option<Arc<Mutex<Child>>>,
    watcher: Option<JoinHandle<()>>,
    generation: u64,
}

impl Session {
    fn status(&self) -> MirrorStatus {
        MirrorStatus {
            phase: self.phase,
            serial: self.serial.clone(),
            pid: self
                .child
                .as_ref()
                .and_then(|child| child.lock().ok().map(|child| child.id())),
        }
    }

    fn reset(&mut self) {
        self.phase = MirrorPhase::Idle;
        self.serial = None;
        self.child = None;
        self.watcher = None;
    }
}

/// Owns at most one mirroring subprocess.
///
/// `Idle -> Starting -> Running -> Stopping -> Idle`. A process that survives
/// the startup grace delay is considered running; the tool offers no readiness
/// handshake, so this is a heuristic. A watcher thread returns the controller
/// to `Idle` when the process exits on its own (window closed, device gone).
pub struct MirrorController {
    program: String,
    settings: MirrorSettings,
    runner: Arc<dyn CommandRunner>,
    launcher: Launcher,
    session: Arc<Mutex<Session>>,
}

impl MirrorController {
    pub fn new(program: impl Into<String>, settings: MirrorSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_launcher(program, settings, runner, Arc::new(spawn_piped))
    }

    pub fn with_launcher(
        program: impl Into<String>,
        settings: MirrorSettings,
        runner: Arc<dyn CommandRunner>,
        launcher: Launcher,
    ) -> Self {
        Self {
            program: program.into(),
            settings,
            runner,
            launcher,
            session: Arc::new(Mutex::new(Session {
                phase: MirrorPhase::Idle,
                serial: None,
                child: None,
                watcher: None,
                generation: 0,
            })),
        }
    }

    fn lock(&self, trace_id: &str) -> Result<MutexGuard<'_, Session>, AppError> {
        self.session
            .lock()
            .map_err(|_| AppError::system("Mirror state lock poisoned", trace_id))
    }

    pub fn status(&self, trace_id: &str) -> Result<MirrorStatus, AppError> {
        Ok(self.lock(trace_id)?.status())
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .map(|session| session.phase != MirrorPhase::Idle)
            .unwrap_or(false)
    }

    pub fn start(&self, serial: &str, options: &MirrorOptions, trace_id: &str) -> Result<MirrorStatus, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        let resolved = resolve_options(options, &self.settings, trace_id)?;

        let generation = {
            let mut session = self.lock(trace_id)?;
            if session.phase != MirrorPhase::Idle {
                return Err(AppError::validation(
                    format!(
                        "Mirror session already running for {}",
                        session.serial.as_deref().unwrap_or("another device")
                    ),
                    trace_id,
                ));
            }
            session.phase = MirrorPhase::Starting;
            session.serial = Some(serial.to_string());
            session.generation += 1;
            session.generation
        };

        match self.launch(serial, &resolved, generation, trace_id) {
            Ok(status) => Ok(status),
            Err(err) => {
                if let Ok(mut session) = self.session.lock() {
                    if session.generation == generation && session.phase == MirrorPhase::Starting {
                        session.reset();
                    }
                }
                Err(err)
            }
        }
    }

    fn launch(
        &self,
        serial: &str,
        resolved: &scrcpy::ResolvedMirrorOptions,
        generation: u64,
        trace_id: &str,
    ) -> Result<MirrorStatus, AppError> {
        let tool = probe_tool(Tool::Scrcpy, &self.program, self.runner.as_ref(), trace_id);
        if !tool.available {
            return Err(AppError::dependency(
                format!(
                    "scrcpy is not available: {}",
                    tool.error.unwrap_or_else(|| "unknown error".to_string())
                ),
                trace_id,
            ));
        }
        let major = parse_scrcpy_major(&tool.version_output);
        let args = build_scrcpy_args(serial, resolved, &self.settings, major);
        info!(trace_id = %trace_id, serial = %serial, major_version = major, args = ?args, "starting mirror");

        let mut child = (self.launcher)(&self.program, &args)
            .map_err(|err| AppError::system(format!("Failed to launch scrcpy: {err}"), trace_id))?;
        let recent = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut drains = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            drains.push(forward_output(stdout, false, Arc::clone(&recent), trace_id.to_string()));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(forward_output(stderr, true, Arc::clone(&recent), trace_id.to_string()));
        }
        let child = Arc::new(Mutex::new(child));
        {
            let mut session = self.lock(trace_id)?;
            if session.generation != generation || session.phase != MirrorPhase::Starting {
                drop(session);
                kill_now(&child);
                return Err(AppError::system("Mirror session was stopped during startup", trace_id));
            }
            session.child = Some(Arc::clone(&child));
        }

        let grace = Duration::from_millis(self.settings.startup_grace_ms);
        if let Some(exit_code) = wait_for_exit(&child, grace) {
            for drain in drains {
                let _ = drain.join();
            }
            let output = recent.lock().map(|lines| lines.join("\n")).unwrap_or_default();
            warn!(trace_id = %trace_id, serial = %serial, exit_code = ?exit_code, "mirror exited during startup");
            let code = exit_code.map_or_else(|| "signal".to_string(), |code| code.to_string());
            return Err(AppError::dependency(
                if output.trim().is_empty() {
                    format!("scrcpy exited during startup (exit code {code})")
                } else {
                    format!("scrcpy exited during startup (exit code {code}): {}", output.trim())
                },
                trace_id,
            ));
        }

        let mut session = self.lock(trace_id)?;
        if session.generation != generation || session.phase != MirrorPhase::Starting {
            drop(session);
            kill_now(&child);
            return Err(AppError::system("Mirror session was stopped during startup", trace_id));
        }
        session.phase = MirrorPhase::Running;
        session.watcher = Some(spawn_watcher(
            Arc::clone(&self.session),
            child,
            generation,
            trace_id.to_string(),
        ));
        info!(trace_id = %trace_id, serial = %serial, "mirror running");
        Ok(session.status())
    }

    /// Graceful termination first, forceful kill after the stop timeout. Stopping
    /// an idle controller succeeds without doing anything.
    pub fn stop(&self, trace_id: &str) -> Result<MirrorStatus, AppError> {
        let (child, watcher, generation) = {
            let mut session = self.lock(trace_id)?;
            match session.phase {
                MirrorPhase::Idle => return Ok(session.status()),
                MirrorPhase::Stopping => {
                    return Err(AppError::validation("Mirror session is already stopping", trace_id))
                }
                MirrorPhase::Starting | MirrorPhase::Running => {}
            }
            session.phase = MirrorPhase::Stopping;
            (session.child.take(), session.watcher.take(), session.generation)
        };

        if let Some(child) = child {
            terminate(&child, Duration::from_millis(self.settings.stop_timeout_ms), trace_id);
        }
        if let Some(watcher) = watcher {
            let _ = watcher.join();
        }

        let mut session = self.lock(trace_id)?;
        if session.generation == generation {
            session.reset();
        }
        info!(trace_id = %trace_id, "mirror stopped");
        Ok(session.status())
    }
}

impl Drop for MirrorController {
    fn drop(&mut self) {
        let child = self
            .session
            .lock()
            .ok()
            .and_then(|mut session| session.child.take());
        if let Some(child) = child {
            kill_now(&child);
        }
    }
}

fn spawn_piped(program: &str, args: &[String]) -> io::Result<Child> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

fn forward_output(
    reader: impl Read + Send + 'static,
    is_stderr: bool,
    recent: Arc<Mutex<Vec<String>>>,
    trace_id: String,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else {
                break;
            };
            if is_stderr {
                warn!(trace_id = %trace_id, line = %line, "scrcpy");
            } else {
                info!(trace_id = %trace_id, line = %line, "scrcpy");
            }
            if let Ok(mut recent) = recent.lock() {
                if recent.len() >= STARTUP_OUTPUT_LINES {
                    recent.remove(0);
                }
                recent.push(line);
            }
        }
    })
}

/// Polls until the child exits or `timeout` passes. `Some(code)` means it exited.
fn wait_for_exit(child: &Arc<Mutex<Child>>, timeout: Duration) -> Option<Option<i32>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(mut guard) = child.lock() {
            if let Ok(Some(status)) = guard.try_wait() {
                return Some(status.code());
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_watcher(
    session: Arc<Mutex<Session>>,
    child: Arc<Mutex<Child>>,
    generation: u64,
    trace_id: String,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        let exited = match child.lock() {
            Ok(mut guard) => match guard.try_wait() {
                Ok(Some(status)) => Some(status.code()),
                Ok(None) => None,
                Err(_) => Some(None),
            },
            Err(_) => Some(None),
        };
        if let Some(exit_code) = exited {
            if let Ok(mut session) = session.lock() {
                // stop() owns the transition once it has started.
                if session.generation == generation && session.phase == MirrorPhase::Running {
                    info!(trace_id = %trace_id, exit_code = ?exit_code, "mirror exited");
                    session.reset();
                }
            }
            return;
        }
        thread::sleep(POLL_INTERVAL);
    })
}

fn terminate(child: &Arc<Mutex<Child>>, timeout: Duration, trace_id: &str) {
    let pid = match child.lock() {
        Ok(guard) => guard.id(),
        Err(_) => return,
    };
    request_graceful_exit(pid, trace_id);
    if wait_for_exit(child, timeout).is_some() {
        return;
    }
    warn!(trace_id = %trace_id, pid, "mirror did not exit in time; killing");
    kill_now(child);
}

fn kill_now(child: &Arc<Mutex<Child>>) {
    if let Ok(mut guard) = child.lock() {
        let _ = guard.kill();
        let _ = guard.wait();
    }
}

#[cfg(unix)]
fn request_graceful_exit(pid: u32, trace_id: &str) {
    let result = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = result {
        warn!(trace_id = %trace_id, pid, error = %err, "failed to signal mirror process");
    }
}

#[cfg(windows)]
fn request_graceful_exit(pid: u32, trace_id: &str) {
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = result {
        warn!(trace_id = %trace_id, pid, error = %err, "failed to signal mirror process");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::app::testing::ScriptedRunner;

    fn settings() -> MirrorSettings {
        MirrorSettings {
            startup_grace_ms: 300,
            stop_timeout_ms: 300,
            ..MirrorSettings::default()
        }
    }

    fn controller(script: &'static str) -> (MirrorController, Arc<ScriptedRunner>) {
        controller_with(settings(), script)
    }

    fn controller_with(settings: MirrorSettings, script: &'static str) -> (MirrorController, Arc<ScriptedRunner>) {
        let runner = ScriptedRunner::new();
        runner.on("--version", "scrcpy 2.4 <https://github.com/Genymobile/scrcpy>");
        let launcher: Launcher = Arc::new(move |_program: &str, _args: &[String]| {
            Command::new("sh")
                .args(["-c", script])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
        });
        // `sh` stands in for scrcpy, so the program name must pass the bare-name check.
        let mirror = MirrorController::with_launcher("scrcpy", settings, runner.clone(), launcher);
        (mirror, runner)
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let (mirror, _) = controller("sleep 5");
        let status = mirror.stop("t").expect("stop");
        assert_eq!(status.phase, MirrorPhase::Idle);
    }

    #[test]
    fn second_start_is_rejected_then_stop_returns_to_idle() {
        let (mirror, _) = controller("exec sleep 5");
        let status = mirror.start("ABC", &MirrorOptions::default(), "t").expect("start");
        assert_eq!(status.phase, MirrorPhase::Running);
        assert_eq!(status.serial.as_deref(), Some("ABC"));

        let err = mirror
            .start("XYZ", &MirrorOptions::default(), "t")
            .expect_err("already running");
        assert!(err.is_validation());
        assert!(err.error.contains("already running"));

        let status = mirror.stop("t").expect("stop");
        assert_eq!(status.phase, MirrorPhase::Idle);
        assert!(!mirror.is_running());
    }

    #[test]
    fn start_during_startup_is_rejected() {
        let (mirror, _) = controller_with(
            MirrorSettings {
                startup_grace_ms: 1500,
                ..settings()
            },
            "exec sleep 5",
        );

        thread::scope(|scope| {
            let first = scope.spawn(|| mirror.start("ABC", &MirrorOptions::default(), "first"));

            let deadline = Instant::now() + Duration::from_secs(1);
            while mirror.status("t").expect("status").phase != MirrorPhase::Starting
                && Instant::now() < deadline
            {
                thread::sleep(Duration::from_millis(10));
            }
            assert_eq!(mirror.status("t").expect("status").phase, MirrorPhase::Starting);

            let err = mirror
                .start("XYZ", &MirrorOptions::default(), "second")
                .expect_err("first start still in progress");
            assert!(err.is_validation());
            assert!(err.error.contains("already running"));

            let status = first.join().expect("join").expect("first start");
            assert_eq!(status.phase, MirrorPhase::Running);
            assert_eq!(status.serial.as_deref(), Some("ABC"));
        });

        mirror.stop("t").expect("stop");
        assert!(!mirror.is_running());
    }

    #[test]
    fn early_exit_reports_output_and_returns_to_idle() {
        let (mirror, _) = controller("echo 'ERROR: Could not find any ADB device' >&2; exit 1");
        let err = mirror
            .start("ABC", &MirrorOptions::default(), "t")
            .expect_err("early exit");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(err.error.contains("Could not find any ADB device"));
        assert!(err.error.contains("exit code 1"));
        assert_eq!(mirror.status("t").expect("status").phase, MirrorPhase::Idle);
    }

    #[test]
    fn stop_escalates_when_terminate_is_ignored() {
        let (mirror, _) = controller("trap '' TERM; exec sleep 30");
        mirror.start("ABC", &MirrorOptions::default(), "t").expect("start");
        let started = Instant::now();
        let status = mirror.stop("t").expect("stop");
        assert_eq!(status.phase, MirrorPhase::Idle);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn natural_exit_returns_to_idle() {
        let (mirror, _) = controller("sleep 0.6");
        mirror.start("ABC", &MirrorOptions::default(), "t").expect("start");
        let deadline = Instant::now() + Duration::from_secs(5);
        while mirror.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(!mirror.is_running());
        // A fresh session can start after the previous one ended.
        let (again, _) = controller("exec sleep 5");
        again.start("ABC", &MirrorOptions::default(), "t").expect("restart");
        again.stop("t").expect("stop");
    }

    #[test]
    fn invalid_options_never_spawn() {
        let (mirror, runner) = controller("exec sleep 5");
        let options = MirrorOptions {
            bitrate_mbps: Some(0),
            ..MirrorOptions::default()
        };
        let err = mirror.start("ABC", &options, "t").expect_err("zero bitrate");
        assert!(err.is_validation());
        assert!(runner.calls().is_empty());
        assert_eq!(mirror.status("t").expect("status").phase, MirrorPhase::Idle);
    }

    #[test]
    fn unavailable_tool_is_dependency_error() {
        let runner = ScriptedRunner::new();
        runner.on_failure("--version", "scrcpy: command not found", 127);
        let mirror = MirrorController::new("scrcpy", settings(), runner);
        let err = mirror.start("ABC", &MirrorOptions::default(), "t").expect_err("missing");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(!mirror.is_running());
    }
}
