// toolhub-core/src/core/envelope.rs
// ============================================================================
// Module: ToolHub Response Envelope
// Description: Standard response wrapper shared by HTTP and MCP transports.
// Purpose: Keep tool responses bit-identical across transports.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every tool call returns the same envelope on both transports:
//! `{ok, meta, result, error?}`. Meta carries the audit coordinates (run,
//! tool call, evidence hash) so callers can verify the evidence trail for any
//! response they receive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Standard response wrapper for all tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    /// Whether the tool call succeeded.
    pub ok: bool,
    /// Audit metadata for the call.
    pub meta: ToolMeta,
    /// Tool-specific result payload.
    pub result: Value,
    /// Tool-level error when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolCallError>,
}

impl ToolEnvelope {
    /// Builds a successful envelope.
    #[must_use]
    pub const fn success(meta: ToolMeta, result: Value) -> Self {
        Self {
            ok: true,
            meta,
            result,
            error: None,
        }
    }

    /// Builds a failed envelope that still carries a result payload.
    #[must_use]
    pub fn failure(meta: ToolMeta, result: Value, code: &str, message: &str) -> Self {
        Self {
            ok: false,
            meta,
            result,
            error: Some(ToolCallError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Audit metadata attached to every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMeta {
    /// Owning run identifier.
    pub run_id: String,
    /// Identifier of the persisted tool call; empty for batch aggregates.
    pub tool_call_id: String,
    /// Evidence hash of the persisted call; empty for batch aggregates.
    pub evidence_hash: String,
    /// Whether the call was a dry run.
    pub dry_run: bool,
    /// Set when the response was replayed from a prior call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed: Option<bool>,
    /// QA artifact references when the call produced QA output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa_artifacts: Option<QaArtifactRefs>,
}

impl ToolMeta {
    /// Builds meta for a freshly executed call.
    #[must_use]
    pub fn new(run_id: &str, tool_call_id: &str, evidence_hash: &str, dry_run: bool) -> Self {
        Self {
            run_id: run_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
            evidence_hash: evidence_hash.to_string(),
            dry_run,
            replayed: None,
            qa_artifacts: None,
        }
    }

    /// Marks the meta as replayed.
    #[must_use]
    pub fn replayed(mut self) -> Self {
        self.replayed = Some(true);
        self
    }
}

/// QA artifact identifiers surfaced on QA tool responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QaArtifactRefs {
    /// Captured stdout artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_artifact_id: Option<String>,
    /// Captured stderr artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_artifact_id: Option<String>,
    /// Structured report artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_artifact_id: Option<String>,
}

/// Tool-level error carried inside the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallError {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}
