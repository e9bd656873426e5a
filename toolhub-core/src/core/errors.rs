// toolhub-core/src/core/errors.rs
// ============================================================================
// Module: ToolHub Error Mapping
// Description: Domain error sum and the stable code/status mapper.
// Purpose: Normalize every failure into {code, message, transport status}.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Domain errors form a tagged sum covering configuration, authorization,
//! validation, idempotency, upstream, QA, and internal failures. The mapper
//! is a pure function from that sum to a stable wire code and transport
//! status; QA outcomes map to HTTP 200 because they are carried inside the
//! envelope rather than as transport errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::policy::PolicyError;
use crate::core::policy::PolicyViolation;
use crate::core::qa::QaError;
use crate::core::qa::QaErrorCode;

// ============================================================================
// SECTION: Domain Errors
// ============================================================================

/// Tagged sum of every failure kind the pipeline can surface.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Repo rejected by the allowlist.
    #[error("repo {0:?} not in allowlist")]
    RepoNotAllowed(String),
    /// Tool rejected by the allowlist.
    #[error("tool {0:?} not in allowlist")]
    ToolNotAllowed(String),
    /// The referenced run does not exist.
    #[error("run not found")]
    RunNotFound,
    /// The referenced approval does not exist or belongs to another run.
    #[error("approval not found")]
    ApprovalNotFound,
    /// The referenced approval exists but is not approved.
    #[error("approval is not approved")]
    ApprovalNotApproved,
    /// Request schema or limit violation.
    #[error("{0}")]
    Validation(String),
    /// Path policy violation.
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    /// Explicit idempotency key reused with a different request payload.
    #[error("{0}")]
    IdempotencyConflict(String),
    /// Code-forge API rejected the request.
    #[error("{operation} HTTP {status}: {body}")]
    Upstream {
        /// Upstream operation label.
        operation: String,
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body.
        body: String,
    },
    /// The code-forge app installation could not be resolved.
    #[error("{0}")]
    AppNotInstalled(String),
    /// QA configuration or outcome error.
    #[error(transparent)]
    Qa(#[from] QaError),
    /// Internal failure (store, artifact I/O, serialization).
    #[error("{0}")]
    Internal(String),
}

impl From<PolicyError> for DomainError {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::RepoNotAllowed(repo) => Self::RepoNotAllowed(repo),
            PolicyError::ToolNotAllowed(tool) => Self::ToolNotAllowed(tool),
            PolicyError::Violation(violation) => Self::Policy(violation),
        }
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Stable code, message, and transport status for one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Stable wire code.
    pub code: String,
    /// Human-readable message; never includes stack traces or secrets.
    pub message: String,
    /// HTTP status to use on the request/reply transport.
    pub http_status: u16,
}

impl ErrorInfo {
    /// Builds an error info triple.
    fn new(code: &str, message: String, http_status: u16) -> Self {
        Self {
            code: code.to_string(),
            message,
            http_status,
        }
    }
}

/// Maps a domain error to its stable code and transport status.
#[must_use]
pub fn map_error(error: &DomainError) -> ErrorInfo {
    let message = error.to_string();
    match error {
        DomainError::Config(_) => ErrorInfo::new("configuration_error", message, 500),
        DomainError::RepoNotAllowed(_) => ErrorInfo::new("repo_not_allowed", message, 403),
        DomainError::ToolNotAllowed(_) => ErrorInfo::new("tool_not_allowed", message, 403),
        DomainError::RunNotFound => ErrorInfo::new("run_not_found", message, 404),
        DomainError::ApprovalNotFound => ErrorInfo::new("approval_not_found", message, 404),
        DomainError::ApprovalNotApproved => ErrorInfo::new("approval_not_approved", message, 403),
        DomainError::Validation(_) => ErrorInfo::new("invalid_request_schema", message, 400),
        DomainError::Policy(violation) => ErrorInfo::new(violation.code.as_str(), message, 403),
        DomainError::IdempotencyConflict(_) => {
            ErrorInfo::new("idempotency_key_conflict", message, 409)
        }
        DomainError::Upstream {
            status, ..
        } => match status {
            401 => ErrorInfo::new("github_auth_failed", message, 502),
            403 => ErrorInfo::new("github_permission_denied", message, 502),
            404 => ErrorInfo::new("github_not_found", message, 502),
            422 => ErrorInfo::new("github_validation_failed", message, 400),
            _ => ErrorInfo::new("upstream_error", message, 502),
        },
        DomainError::AppNotInstalled(_) => ErrorInfo::new("app_not_installed", message, 502),
        DomainError::Qa(qa) => {
            let code = qa.code.as_str();
            match qa.code {
                QaErrorCode::Timeout | QaErrorCode::ExecutionFailed => {
                    ErrorInfo::new(code, message, 200)
                }
                QaErrorCode::CommandNotAllowed => ErrorInfo::new(code, message, 403),
                _ => ErrorInfo::new(code, message, 400),
            }
        }
        DomainError::Internal(_) => ErrorInfo::new("internal_error", message, 500),
    }
}
