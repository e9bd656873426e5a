// toolhub-core/src/interfaces/mod.rs
// ============================================================================
// Module: ToolHub Interfaces
// Description: Collaborator and storage contracts consumed by the core.
// Purpose: Keep the pipeline independent of concrete backends.
// Dependencies: async-trait, chrono, serde, thiserror
// ============================================================================

//! ## Overview
//! The core only ever talks to the code forge, the git runner, the QA
//! executor, and the audit database through these interfaces. Implementations
//! must be deterministic about their error taxonomy: typed upstream errors
//! carry the operation and status so the error mapper can produce stable
//! codes without string matching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::errors::DomainError;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::RepoName;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::qa::QaError;
use crate::core::qa::QaKind;
use crate::core::qa::QaReport;
use crate::core::records::ApprovalRecord;
use crate::core::records::ApprovalStatus;
use crate::core::records::ArtifactRecord;
use crate::core::records::CallStatus;
use crate::core::records::DecisionRecord;
use crate::core::records::RunRecord;
use crate::core::records::StepRecord;
use crate::core::records::StepStatus;
use crate::core::records::ToolCallRecord;

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Audit store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("audit store io error: {0}")]
    Io(String),
    /// Database engine error.
    #[error("audit store db error: {0}")]
    Db(String),
    /// A uniqueness constraint rejected the insert.
    #[error("audit store conflict: {0}")]
    Conflict(String),
    /// Stored data is invalid or incompatible.
    #[error("audit store invalid data: {0}")]
    Invalid(String),
}

impl From<StoreError> for DomainError {
    fn from(error: StoreError) -> Self {
        Self::Internal(error.to_string())
    }
}

/// Filters applied when listing tool calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFilter {
    /// Restrict to one status.
    pub status: Option<CallStatus>,
    /// Restrict to one tool name.
    pub tool_name: Option<String>,
    /// Only calls created strictly after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Only calls created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
}

/// Relational store for the audit trail.
///
/// Single-row inserts are the atomicity unit. The store must enforce the
/// uniqueness of `(run_id, tool_name, idempotency_key)` across `ok` rows and
/// surface violations as [`StoreError::Conflict`].
pub trait AuditStore: Send + Sync {
    /// Inserts a run record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    /// Loads a run by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError>;

    /// Lists runs, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError>;

    /// Inserts an artifact metadata record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_artifact(&self, artifact: &ArtifactRecord) -> Result<(), StoreError>;

    /// Loads artifact metadata by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_artifact(&self, artifact_id: &ArtifactId) -> Result<Option<ArtifactRecord>, StoreError>;

    /// Loads artifact metadata scoped to a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_artifact_by_run(
        &self,
        run_id: &RunId,
        artifact_id: &ArtifactId,
    ) -> Result<Option<ArtifactRecord>, StoreError>;

    /// Lists artifacts for a run in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_artifacts_by_run(&self, run_id: &RunId) -> Result<Vec<ArtifactRecord>, StoreError>;

    /// Inserts a tool call record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the idempotency uniqueness
    /// constraint rejects the row, and [`StoreError`] for other failures.
    fn insert_tool_call(&self, tool_call: &ToolCallRecord) -> Result<(), StoreError>;

    /// Finds the unique `ok` tool call for a replay probe.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_replayable_tool_call(
        &self,
        run_id: &RunId,
        tool_name: &str,
        idempotency_key: &str,
    ) -> Result<Option<ToolCallRecord>, StoreError>;

    /// Lists tool calls for a run in creation order, applying filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_tool_calls_by_run(
        &self,
        run_id: &RunId,
        filter: &ToolCallFilter,
    ) -> Result<Vec<ToolCallRecord>, StoreError>;

    /// Inserts a step record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_step(&self, step: &StepRecord) -> Result<(), StoreError>;

    /// Updates a step's status and finish time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn update_step_status(
        &self,
        step_id: &StepId,
        status: StepStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Lists steps for a run in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_steps_by_run(&self, run_id: &RunId) -> Result<Vec<StepRecord>, StoreError>;

    /// Inserts a decision record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_decision(&self, decision: &DecisionRecord) -> Result<(), StoreError>;

    /// Lists decisions for a run in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_decisions_by_run(&self, run_id: &RunId) -> Result<Vec<DecisionRecord>, StoreError>;

    /// Inserts an approval record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_approval(&self, approval: &ApprovalRecord) -> Result<(), StoreError>;

    /// Loads an approval by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_approval(&self, approval_id: &ApprovalId)
    -> Result<Option<ApprovalRecord>, StoreError>;

    /// Lists approvals for a run in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_approvals_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRecord>, StoreError>;

    /// Records the terminal decision on an approval.
    ///
    /// Implementations must leave terminal approvals untouched (monotonic
    /// status) and report whether a row actually transitioned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn update_approval_decision(
        &self,
        approval_id: &ApprovalId,
        status: ApprovalStatus,
        approved_at: DateTime<Utc>,
        approver: &str,
    ) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Code Forge Client
// ============================================================================

/// Code-forge client errors.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// The app installation could not be resolved.
    #[error("{0}")]
    AppNotInstalled(String),
    /// The API rejected the request with a status code.
    #[error("{operation} HTTP {status}: {body}")]
    Api {
        /// Operation label (e.g. `create issue`).
        operation: String,
        /// Upstream HTTP status.
        status: u16,
        /// Upstream response body.
        body: String,
    },
    /// The request never produced a response.
    #[error("{operation}: {detail}")]
    Transport {
        /// Operation label.
        operation: String,
        /// Failure detail.
        detail: String,
    },
    /// The response body could not be decoded.
    #[error("decode {operation}: {detail}")]
    Decode {
        /// Operation label.
        operation: String,
        /// Failure detail.
        detail: String,
    },
}

impl From<ForgeError> for DomainError {
    fn from(error: ForgeError) -> Self {
        match error {
            ForgeError::AppNotInstalled(message) => Self::AppNotInstalled(message),
            ForgeError::Api {
                operation,
                status,
                body,
            } => Self::Upstream {
                operation,
                status,
                body,
            },
            ForgeError::Transport {
                ..
            }
            | ForgeError::Decode {
                ..
            } => Self::Internal(error.to_string()),
        }
    }
}

/// Issue creation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIssueInput {
    /// Issue title.
    pub title: String,
    /// Issue body.
    pub body: String,
    /// Issue labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// Created issue as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number.
    pub number: u64,
    /// Issue title.
    pub title: String,
    /// Browser URL of the issue.
    pub html_url: String,
}

/// Created PR comment as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrComment {
    /// Comment identifier.
    pub id: i64,
    /// Comment body.
    pub body: String,
    /// Browser URL of the comment.
    pub html_url: String,
}

/// Branch reference inside a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    /// Branch name.
    #[serde(rename = "ref")]
    pub branch: String,
}

/// Pull request metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request number.
    pub number: u64,
    /// Pull request title.
    pub title: String,
    /// Pull request state.
    pub state: String,
    /// Whether the PR is a draft.
    pub draft: bool,
    /// Browser URL of the PR.
    pub html_url: String,
    /// Whether the PR is merged.
    pub merged: bool,
    /// Mergeability when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mergeable: Option<bool>,
    /// Base branch reference.
    pub base: BranchRef,
    /// Head branch reference.
    pub head: BranchRef,
}

/// Pull request creation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePullRequestInput {
    /// PR title.
    pub title: String,
    /// Head branch.
    pub head: String,
    /// Base branch.
    pub base: String,
    /// PR body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

/// One file entry in a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestFile {
    /// File path.
    pub filename: String,
    /// Change status (added, modified, removed, renamed).
    pub status: String,
    /// Added line count.
    pub additions: u64,
    /// Deleted line count.
    pub deletions: u64,
    /// Total changed line count.
    pub changes: u64,
    /// Blob browser URL.
    pub blob_url: String,
    /// Raw content URL.
    pub raw_url: String,
    /// Unified diff fragment when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Previous path for renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
}

/// Code-forge API surface the pipeline consumes.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Creates an issue.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the forge rejects or never answers.
    async fn create_issue(
        &self,
        repo: &RepoName,
        input: CreateIssueInput,
    ) -> Result<Issue, ForgeError>;

    /// Creates a PR comment.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the forge rejects or never answers.
    async fn create_pr_comment(
        &self,
        repo: &RepoName,
        pr_number: u64,
        body: &str,
    ) -> Result<PrComment, ForgeError>;

    /// Reads pull request metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the forge rejects or never answers.
    async fn get_pull_request(
        &self,
        repo: &RepoName,
        pr_number: u64,
    ) -> Result<PullRequest, ForgeError>;

    /// Lists the files changed by a pull request.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the forge rejects or never answers.
    async fn list_pull_request_files(
        &self,
        repo: &RepoName,
        pr_number: u64,
    ) -> Result<Vec<PullRequestFile>, ForgeError>;

    /// Opens a pull request.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the forge rejects or never answers.
    async fn create_pull_request(
        &self,
        repo: &RepoName,
        input: CreatePullRequestInput,
    ) -> Result<PullRequest, ForgeError>;
}

// ============================================================================
// SECTION: Code Runner
// ============================================================================

/// One file change applied by the git runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path.
    pub path: String,
    /// Original content when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    /// Full replacement content.
    pub modified_content: String,
}

/// Request to materialize file changes on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChangeRequest {
    /// Branch to start from.
    pub base_branch: String,
    /// Branch to create and push.
    pub head_branch: String,
    /// Commit message.
    pub commit_message: String,
    /// Ordered file changes.
    pub files: Vec<FileChange>,
    /// Plan commands without executing when set.
    pub dry_run: bool,
}

/// Result of a git runner invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeChangeResult {
    /// Commands planned (and, unless dry-run, executed).
    pub planned_commands: Vec<String>,
    /// Commit hash after a real push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

/// Git runner errors.
#[derive(Debug, Error)]
pub enum CodeOpsError {
    /// Branch name, path, or message failed validation.
    #[error("{0}")]
    InvalidInput(String),
    /// A git command failed.
    #[error("{0}")]
    Git(String),
}

impl From<CodeOpsError> for DomainError {
    fn from(error: CodeOpsError) -> Self {
        match error {
            CodeOpsError::InvalidInput(message) => Self::Validation(message),
            CodeOpsError::Git(message) => Self::Internal(message),
        }
    }
}

/// Git-based code change runner.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Creates the head branch, applies files, commits, and pushes.
    ///
    /// # Errors
    ///
    /// Returns [`CodeOpsError`] when validation or a git command fails.
    async fn execute(&self, request: &CodeChangeRequest) -> Result<CodeChangeResult, CodeOpsError>;

    /// Resets to the base branch and deletes the head branch.
    ///
    /// # Errors
    ///
    /// Returns [`CodeOpsError`] when validation or a git command fails.
    async fn rollback(
        &self,
        base_branch: &str,
        head_branch: &str,
        dry_run: bool,
    ) -> Result<CodeChangeResult, CodeOpsError>;
}

// ============================================================================
// SECTION: QA Executor
// ============================================================================

/// Outcome of a QA execution that produced a report.
///
/// `error` is populated for timeouts and non-zero exits; configuration
/// failures that prevent execution are returned as `Err` instead and carry
/// no report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaOutcome {
    /// Captured execution report.
    pub report: QaReport,
    /// Execution error when the command did not pass.
    pub error: Option<QaError>,
}

/// QA sub-process executor.
#[async_trait]
pub trait QaExecutor: Send + Sync {
    /// Runs the configured command for the kind, or plans it on dry-run.
    ///
    /// # Errors
    ///
    /// Returns [`QaError`] for configuration and admission failures that
    /// prevent execution entirely.
    async fn run(&self, kind: QaKind, dry_run: bool) -> Result<QaOutcome, QaError>;
}
