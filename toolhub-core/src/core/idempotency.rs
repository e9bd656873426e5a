// toolhub-core/src/core/idempotency.rs
// ============================================================================
// Module: ToolHub Idempotency Keys
// Description: Deterministic key derivation and issue input validation.
// Purpose: Make identical requests collapse onto one stored tool call.
// Dependencies: serde, crate::core::hashing
// ============================================================================

//! ## Overview
//! Idempotency keys are the SHA-256 of a canonical JSON payload built from
//! the run, tool name, and normalized request fields. Labels are trimmed and
//! sorted so label order never changes the key; the optional index varies the
//! key across batch items even when their content collides. PR comments reuse
//! the same generator over synthetic fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum issue title length in bytes.
pub const MAX_ISSUE_TITLE_LEN: usize = 256;
/// Maximum issue body length in bytes.
pub const MAX_ISSUE_BODY_LEN: usize = 65_536;
/// Maximum number of labels per issue.
pub const MAX_ISSUE_LABELS: usize = 20;
/// Maximum label length in bytes.
pub const MAX_LABEL_LEN: usize = 50;
/// Maximum number of issues per batch.
pub const MAX_BATCH_SIZE: usize = 50;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Issue input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssueValidationError {
    /// The title was blank after trimming.
    #[error("title is required")]
    TitleRequired,
    /// The title exceeded the length limit.
    #[error("title exceeds {MAX_ISSUE_TITLE_LEN} characters")]
    TitleTooLong,
    /// The body exceeded the length limit.
    #[error("body exceeds {MAX_ISSUE_BODY_LEN} characters")]
    BodyTooLong,
    /// Too many labels were supplied.
    #[error("labels exceed {MAX_ISSUE_LABELS} items")]
    TooManyLabels,
    /// A label was blank after trimming.
    #[error("labels must not contain empty values")]
    EmptyLabel,
    /// A label exceeded the length limit.
    #[error("label exceeds {MAX_LABEL_LEN} characters")]
    LabelTooLong,
}

/// Validates issue fields against the documented limits.
///
/// # Errors
///
/// Returns the first [`IssueValidationError`] encountered.
pub fn validate_issue_input(
    title: &str,
    body: &str,
    labels: &[String],
) -> Result<(), IssueValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(IssueValidationError::TitleRequired);
    }
    if trimmed.len() > MAX_ISSUE_TITLE_LEN {
        return Err(IssueValidationError::TitleTooLong);
    }
    if body.len() > MAX_ISSUE_BODY_LEN {
        return Err(IssueValidationError::BodyTooLong);
    }
    if labels.len() > MAX_ISSUE_LABELS {
        return Err(IssueValidationError::TooManyLabels);
    }
    for label in labels {
        if label.trim().is_empty() {
            return Err(IssueValidationError::EmptyLabel);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(IssueValidationError::LabelTooLong);
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Key Derivation
// ============================================================================

/// Canonical payload hashed into an idempotency key.
#[derive(Debug, Serialize)]
struct IdempotencyPayload<'a> {
    /// Owning run identifier.
    run_id: &'a str,
    /// Canonical tool name.
    tool_name: &'a str,
    /// Title trimmed of surrounding whitespace.
    title: &'a str,
    /// Body exactly as supplied.
    body: &'a str,
    /// Labels trimmed element-wise and sorted lexicographically.
    labels: Vec<String>,
    /// Optional batch item index.
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

/// Derives the idempotency key for an issue-shaped request.
///
/// # Errors
///
/// Returns [`HashError`] when the payload cannot be canonicalized.
pub fn make_issue_key(
    run_id: &str,
    tool_name: &str,
    title: &str,
    body: &str,
    labels: &[String],
    index: Option<usize>,
) -> Result<String, HashError> {
    let mut canonical_labels: Vec<String> =
        labels.iter().map(|label| label.trim().to_string()).collect();
    canonical_labels.sort();
    let payload = IdempotencyPayload {
        run_id,
        tool_name,
        title: title.trim(),
        body,
        labels: canonical_labels,
        index,
    };
    hash_canonical_json(&payload)
}

/// Derives the idempotency key for a PR comment.
///
/// Applies the issue key generator to the synthetic tuple
/// `("pr-<number>", body, ["pr:<number>"])`.
///
/// # Errors
///
/// Returns [`HashError`] when the payload cannot be canonicalized.
pub fn make_pr_comment_key(
    run_id: &str,
    tool_name: &str,
    pr_number: u64,
    body: &str,
) -> Result<String, HashError> {
    let title = format!("pr-{pr_number}");
    let labels = vec![format!("pr:{pr_number}")];
    make_issue_key(run_id, tool_name, &title, body, &labels, None)
}
