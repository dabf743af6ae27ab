//! Exit codes and structured error output.

use serde::Serialize;

use crate::pipeline::{ScanError, ScanOutcome};

/// Process exit codes for dupetree.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: Scan setup failed (previous results could not be cleared)
/// - 130: Canceled by the user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The command completed.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The scan could not start.
    SetupFailed = 2,
    /// The scan was canceled.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DT000",
            Self::GeneralError => "DT001",
            Self::SetupFailed => "DT002",
            Self::Interrupted => "DT130",
        }
    }

    /// Exit code for a finished scan.
    #[must_use]
    pub fn from_outcome(outcome: &ScanOutcome) -> Self {
        if outcome.is_canceled() {
            Self::Interrupted
        } else {
            Self::Success
        }
    }

    /// Exit code for an error escaping a command.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ScanError>() {
            Some(ScanError::Setup(_)) => Self::SetupFailed,
            _ => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DT001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
