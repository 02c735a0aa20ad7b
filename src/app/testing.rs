use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::app::adb::runner::{CommandOutput, CommandRunner};
use crate::app::error::AppError;

/// Test double for the process boundary. Responses are keyed by the argument
/// line joined with spaces (the program is ignored). Queued responses are
/// consumed in order and the last one repeats; unscripted lines exit 1.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, VecDeque<Result<CommandOutput, AppError>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, args: &str, stdout: &str) -> &Self {
        self.push(args, Ok(CommandOutput::success(stdout)))
    }

    pub fn on_output(&self, args: &str, output: CommandOutput) -> &Self {
        self.push(args, Ok(output))
    }

    pub fn on_failure(&self, args: &str, stderr: &str, exit_code: i32) -> &Self {
        self.push(
            args,
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: Some(exit_code),
            }),
        )
    }

    pub fn on_spawn_error(&self, args: &str) -> &Self {
        self.push(args, Err(AppError::system("Failed to spawn adb: not found", "scripted")))
    }

    fn push(&self, args: &str, response: Result<CommandOutput, AppError>) -> &Self {
        self.responses
            .lock()
            .expect("responses lock")
            .entry(args.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, args: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == args).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, _program: &str, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        let key = args.join(" ");
        self.calls.lock().expect("calls lock").push(key.clone());
        let mut responses = self.responses.lock().expect("responses lock");
        let Some(queue) = responses.get_mut(&key) else {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("unscripted command: {key}"),
                exit_code: Some(1),
            });
        };
        let response = if queue.len() > 1 {
            queue.pop_front().expect("queued response")
        } else {
            queue.front().cloned().expect("scripted response")
        };
        response.map_err(|mut err| {
            err.trace_id = trace_id.to_string();
            err
        })
    }
}
