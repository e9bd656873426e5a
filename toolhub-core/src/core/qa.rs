// toolhub-core/src/core/qa.rs
// ============================================================================
// Module: ToolHub QA Contract
// Description: QA command kinds, reports, statuses, and typed errors.
// Purpose: Define the status contract the QA collaborator must honor.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The QA collaborator executes server-configured test and lint commands and
//! reports the outcome through this contract. Statuses distinguish command
//! failure from timeout and from configuration errors so the repair loop can
//! categorize failures precisely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Kind
// ============================================================================

/// QA command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaKind {
    /// The configured test command.
    Test,
    /// The configured lint command.
    Lint,
}

impl QaKind {
    /// Returns the canonical dotted tool name.
    #[must_use]
    pub const fn tool_name(self) -> &'static str {
        match self {
            Self::Test => "qa.test",
            Self::Lint => "qa.lint",
        }
    }
}

impl fmt::Display for QaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Captured output of one QA command execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QaReport {
    /// Command line that was (or would be) executed.
    pub command: String,
    /// Absolute working directory.
    pub work_dir: String,
    /// Process exit code; `-1` for timeouts and spawn failures.
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
    /// Captured stdout, possibly truncated.
    pub stdout: String,
    /// Captured stderr, possibly truncated.
    pub stderr: String,
    /// Whether stdout was truncated.
    pub stdout_truncated: bool,
    /// Whether stderr was truncated.
    pub stderr_truncated: bool,
    /// Output cap applied to each stream, in bytes.
    pub output_limit_bytes: usize,
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// Outcome of a QA command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaStatus {
    /// The command exited zero.
    Pass,
    /// The command exited non-zero.
    Fail,
    /// The command hit the configured timeout.
    Timeout,
    /// The command could not be executed.
    Error,
    /// The command was planned but not executed.
    DryRun,
}

impl QaStatus {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::DryRun => "dry_run",
        }
    }
}

/// Derives the QA status from a report, an optional error, and the dry-run flag.
#[must_use]
pub fn derive_qa_status(report: &QaReport, error: Option<&QaError>, dry_run: bool) -> QaStatus {
    if dry_run {
        return QaStatus::DryRun;
    }
    let Some(error) = error else {
        return QaStatus::Pass;
    };
    match error.code {
        QaErrorCode::Timeout => QaStatus::Timeout,
        QaErrorCode::ExecutionFailed => QaStatus::Fail,
        _ => {
            if report.exit_code > 0 {
                QaStatus::Fail
            } else {
                QaStatus::Error
            }
        }
    }
}

/// Maps a QA status to its stable metric label.
#[must_use]
pub const fn qa_status_metric_label(status: QaStatus) -> &'static str {
    match status {
        QaStatus::Pass => "pass",
        QaStatus::Fail => "fail",
        QaStatus::Timeout => "timeout",
        QaStatus::Error | QaStatus::DryRun => "error",
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable QA error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaErrorCode {
    /// The configured command is empty.
    CommandEmpty,
    /// The command executable is not in the allowlist.
    CommandNotAllowed,
    /// The command contains forbidden shell syntax.
    CommandInvalid,
    /// The working directory is invalid.
    WorkdirInvalid,
    /// The requested QA tool is not supported.
    ToolUnsupported,
    /// The command hit the configured timeout.
    Timeout,
    /// The command exited non-zero.
    ExecutionFailed,
    /// The concurrency cap was exhausted before the request deadline.
    ConcurrencyExceeded,
    /// The configured backend is not supported.
    BackendInvalid,
}

impl QaErrorCode {
    /// Returns the stable wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommandEmpty => "qa_command_empty",
            Self::CommandNotAllowed => "qa_command_not_allowed",
            Self::CommandInvalid => "qa_command_invalid",
            Self::WorkdirInvalid => "qa_workdir_invalid",
            Self::ToolUnsupported => "qa_tool_unsupported",
            Self::Timeout => "qa_timeout",
            Self::ExecutionFailed => "qa_execution_failed",
            Self::ConcurrencyExceeded => "qa_concurrency_exceeded",
            Self::BackendInvalid => "qa_backend_invalid",
        }
    }
}

/// Typed QA error with a machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{detail}")]
pub struct QaError {
    /// Stable error code.
    pub code: QaErrorCode,
    /// Human-readable detail.
    pub detail: String,
}

impl QaError {
    /// Builds a QA error from a code and detail message.
    #[must_use]
    pub fn new(code: QaErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

// ============================================================================
// SECTION: Failure Categorization
// ============================================================================

/// Categorizes a repair-loop QA failure for decisions and metrics.
#[must_use]
pub fn derive_qa_failure_category(
    test_error: Option<&QaError>,
    lint_error: Option<&QaError>,
) -> &'static str {
    match (test_error, lint_error) {
        (Some(_), Some(_)) => "both_failure",
        (Some(test), None) => {
            if test.code == QaErrorCode::Timeout {
                "qa_timeout"
            } else {
                "test_failure"
            }
        }
        (None, Some(_)) => "lint_failure",
        (None, None) => "qa_error",
    }
}
