use serde::Serialize;
use std::fmt;

pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_DEPENDENCY: &str = "ERR_DEPENDENCY";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";

/// Failure value returned by every device, bootloader and mirror operation.
///
/// `ERR_VALIDATION` marks a precondition rejected before any subprocess was
/// spawned, `ERR_DEPENDENCY` a tool that ran and reported failure, and
/// `ERR_SYSTEM` a local fault (spawn error, poisoned lock, filesystem).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_DEPENDENCY, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    pub fn is_validation(&self) -> bool {
        self.code == ERR_VALIDATION
    }

    /// Prefixes the message with the operation that failed, keeping code and trace id.
    pub fn context(mut self, operation: &str) -> Self {
        self.error = format!("{operation}: {}", self.error);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

pub fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required"), trace_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_code_and_trace() {
        let err = AppError::dependency("device offline", "t-1").context("adb install");
        assert_eq!(err.error, "adb install: device offline");
        assert_eq!(err.code, ERR_DEPENDENCY);
        assert_eq!(err.trace_id, "t-1");
        assert_eq!(err.to_string(), "adb install: device offline (ERR_DEPENDENCY)");
    }

    #[test]
    fn serializes_as_error_object() {
        let err = AppError::validation("serial is required", "t-2");
        let value = serde_json::to_value(&err).expect("serialize");
        assert_eq!(value["error"], "serial is required");
        assert_eq!(value["code"], "ERR_VALIDATION");
        assert!(err.is_validation());
    }
}
