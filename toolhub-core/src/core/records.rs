// toolhub-core/src/core/records.rs
// ============================================================================
// Module: ToolHub Audit Records
// Description: Durable record types for runs, artifacts, and evidence.
// Purpose: Define the persisted shapes shared by stores and transports.
// Dependencies: chrono, serde
// ============================================================================

//! ## Overview
//! A run is the root of a strict tree: artifacts, tool calls, steps,
//! decisions, and approvals all reference their run by identifier, one-way.
//! Records are inserted once and never mutated, except for step status and
//! the approval decision which transition exactly once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::RepoName;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolCallId;

// ============================================================================
// SECTION: Run
// ============================================================================

/// A single ToolHub execution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Globally unique run identifier.
    pub run_id: RunId,
    /// Target repository in `owner/name` form.
    pub repo: RepoName,
    /// Free-form purpose of the run.
    pub purpose: String,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SECTION: Artifact
// ============================================================================

/// Metadata for an opaque blob linked to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Artifact identifier.
    pub artifact_id: ArtifactId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Logical artifact name (e.g. `github.issues.create.request.json`).
    pub name: String,
    /// Durable `file://` URI of the blob.
    pub uri: String,
    /// Lowercase hex SHA-256 digest of the blob content.
    pub sha256: String,
    /// Blob size in bytes.
    pub size_bytes: u64,
    /// Content type hint.
    pub content_type: String,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SECTION: Tool Call
// ============================================================================

/// Binary status of a persisted tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The invocation completed without a primary error.
    Ok,
    /// The invocation failed; evidence is still persisted.
    Fail,
}

impl CallStatus {
    /// Returns the stable string form persisted in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fail => "fail",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(Self::Ok),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// Durable evidence of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool call identifier.
    pub tool_call_id: ToolCallId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Canonical dotted tool name (e.g. `github.issues.create`).
    pub tool_name: String,
    /// Optional idempotency key; lookup column for replay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Binary invocation status.
    pub status: CallStatus,
    /// Request artifact identifier when persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_artifact_id: Option<ArtifactId>,
    /// Response artifact identifier when persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_artifact_id: Option<ArtifactId>,
    /// SHA-256 over concatenated request and response JSON.
    pub evidence_hash: String,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SECTION: Step and Decision
// ============================================================================

/// Lifecycle status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step has started and not yet finished.
    Started,
    /// The step finished successfully.
    Completed,
    /// The step finished with a failure.
    Failed,
}

impl StepStatus {
    /// Returns the stable string form persisted in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Coarse unit grouping tool calls and decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step identifier.
    pub step_id: StepId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Step name (e.g. `code_repair_loop`).
    pub name: String,
    /// Step type tag.
    pub step_type: String,
    /// Lifecycle status.
    pub status: StepStatus,
    /// When the step started (UTC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the step finished (UTC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

/// Append-only event on a step's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Decision identifier.
    pub decision_id: DecisionId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Owning step identifier when scoped to a step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// Actor that produced the decision.
    pub actor: String,
    /// Free-form decision type tag.
    pub decision_type: String,
    /// Payload artifact identifier when a payload was persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_artifact_id: Option<ArtifactId>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SECTION: Approval
// ============================================================================

/// Lifecycle status of an approval; `approved` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Initial state awaiting a decision.
    Requested,
    /// Terminal: the gate is open.
    Approved,
    /// Terminal: the gate stays closed.
    Rejected,
}

impl ApprovalStatus {
    /// Returns the stable string form persisted in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requested" => Some(Self::Requested),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns true once the approval can no longer transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Gate that must be crossed before protected tools may write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Approval identifier.
    pub approval_id: ApprovalId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Free-form scope tag; `path_change` is reserved.
    pub scope: String,
    /// Lifecycle status.
    pub status: ApprovalStatus,
    /// When the approval was requested (UTC).
    pub requested_at: DateTime<Utc>,
    /// When the approval was decided (UTC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Identifier of the approver that decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}
