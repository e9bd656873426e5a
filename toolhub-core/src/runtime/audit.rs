// toolhub-core/src/runtime/audit.rs
// ============================================================================
// Module: ToolHub Audit Engine
// Description: Tool call recording, idempotent replay, steps, and approvals.
// Purpose: Make every tool invocation leave durable, verifiable evidence.
// Dependencies: chrono, serde_json, toolhub-telemetry, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! `record` persists the request and response of a tool call as artifacts,
//! computes the evidence hash over their concatenated JSON, and inserts the
//! tool call row. Artifact failures fail the whole operation; artifacts
//! already written for the same call are not rolled back and become orphans
//! left for offline reconciliation. Replay reads the unique `ok` row for an
//! idempotency key and returns its recorded response verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::core::errors::DomainError;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::evidence_hash;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolCallId;
use crate::core::policy::Policy;
use crate::core::policy::PolicyError;
use crate::core::records::ApprovalRecord;
use crate::core::records::ApprovalStatus;
use crate::core::records::ArtifactRecord;
use crate::core::records::CallStatus;
use crate::core::records::DecisionRecord;
use crate::core::records::StepRecord;
use crate::core::records::StepStatus;
use crate::core::records::ToolCallRecord;
use crate::interfaces::AuditStore;
use crate::interfaces::StoreError;
use crate::interfaces::ToolCallFilter;
use crate::runtime::artifacts::ArtifactStore;
use crate::runtime::artifacts::ArtifactStoreError;
use crate::runtime::artifacts::read_blob;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit engine errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Defense-in-depth tool check failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Request or response could not be canonicalized.
    #[error("serialize payload: {0}")]
    Serialize(String),
    /// An artifact could not be persisted or read.
    #[error(transparent)]
    Artifact(#[from] ArtifactStoreError),
    /// The store rejected an insert on the idempotency uniqueness index.
    #[error("tool call conflict: {0}")]
    Conflict(String),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Explicit idempotency key reused with a different request payload.
    #[error("idempotency key reused with different request payload")]
    IdempotencyConflict,
    /// A recorded call is missing the artifact required for replay.
    #[error("{0} artifact missing for replay")]
    MissingArtifact(&'static str),
    /// A recorded response could not be decoded.
    #[error("decode replay response: {0}")]
    Decode(String),
}

impl From<AuditError> for DomainError {
    fn from(error: AuditError) -> Self {
        match error {
            AuditError::Policy(policy) => policy.into(),
            AuditError::IdempotencyConflict => Self::IdempotencyConflict(error.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Record Input
// ============================================================================

/// Extra artifact persisted alongside a tool call.
#[derive(Debug, Clone)]
pub struct ExtraArtifact {
    /// Logical artifact name.
    pub name: String,
    /// Content type hint.
    pub content_type: String,
    /// Artifact bytes.
    pub body: Vec<u8>,
}

/// Everything needed to log one tool call.
#[derive(Debug, Clone)]
pub struct RecordInput {
    /// Owning run identifier.
    pub run_id: RunId,
    /// Canonical tool name.
    pub tool_name: String,
    /// Idempotency key when the tool supports replay.
    pub idempotency_key: Option<String>,
    /// Request payload.
    pub request: Value,
    /// Response payload.
    pub response: Value,
    /// Primary error message when the invocation failed.
    pub error: Option<String>,
    /// Extra artifacts persisted after request and response.
    pub extras: Vec<ExtraArtifact>,
}

impl RecordInput {
    /// Builds a minimal record input for a successful call.
    #[must_use]
    pub fn new(run_id: &RunId, tool_name: &str, request: Value, response: Value) -> Self {
        Self {
            run_id: run_id.clone(),
            tool_name: tool_name.to_string(),
            idempotency_key: None,
            request,
            response,
            error: None,
            extras: Vec::new(),
        }
    }

    /// Attaches an idempotency key.
    #[must_use]
    pub fn with_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    /// Attaches the primary error message.
    #[must_use]
    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    /// Attaches extra artifacts.
    #[must_use]
    pub fn with_extras(mut self, extras: Vec<ExtraArtifact>) -> Self {
        self.extras = extras;
        self
    }
}

// ============================================================================
// SECTION: Audit Service
// ============================================================================

/// Records tool calls and manages steps, decisions, and approvals.
#[derive(Clone)]
pub struct AuditService {
    /// Relational store for the audit trail.
    store: Arc<dyn AuditStore>,
    /// Blob store for request/response payloads.
    artifacts: ArtifactStore,
    /// Policy for the defense-in-depth tool check.
    policy: Arc<Policy>,
}

impl AuditService {
    /// Wires the audit engine to its dependencies.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, artifacts: ArtifactStore, policy: Arc<Policy>) -> Self {
        Self {
            store,
            artifacts,
            policy,
        }
    }

    /// Returns the artifact store used for evidence blobs.
    #[must_use]
    pub const fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Persists a tool call with its request and response as artifacts.
    ///
    /// Returns the inserted tool call and the extra artifact ids in
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when any artifact or the tool call row cannot
    /// be persisted. Earlier artifacts from the same call are not rolled
    /// back.
    pub fn record(&self, input: RecordInput) -> Result<(ToolCallRecord, Vec<String>), AuditError> {
        self.policy.check_tool(&input.tool_name)?;

        let request_json = canonical_json_bytes(&input.request)
            .map_err(|err| AuditError::Serialize(err.to_string()))?;
        let request_artifact = self.save_or_count(
            &input.run_id,
            &format!("{}.request.json", input.tool_name),
            "application/json",
            &request_json,
        )?;

        let response_json = canonical_json_bytes(&input.response)
            .map_err(|err| AuditError::Serialize(err.to_string()))?;
        let response_artifact = self.save_or_count(
            &input.run_id,
            &format!("{}.response.json", input.tool_name),
            "application/json",
            &response_json,
        )?;

        let mut extra_ids = Vec::with_capacity(input.extras.len());
        for extra in &input.extras {
            let artifact =
                self.save_or_count(&input.run_id, &extra.name, &extra.content_type, &extra.body)?;
            extra_ids.push(artifact.artifact_id.to_string());
        }

        let status = if input.error.is_none() { CallStatus::Ok } else { CallStatus::Fail };
        let tool_call = ToolCallRecord {
            tool_call_id: ToolCallId::generate(),
            run_id: input.run_id.clone(),
            tool_name: input.tool_name.clone(),
            idempotency_key: input.idempotency_key.clone(),
            status,
            request_artifact_id: Some(request_artifact.artifact_id.clone()),
            response_artifact_id: Some(response_artifact.artifact_id.clone()),
            evidence_hash: evidence_hash(&request_json, &response_json),
            created_at: Utc::now(),
        };
        match self.store.insert_tool_call(&tool_call) {
            Ok(()) => {}
            Err(StoreError::Conflict(message)) => return Err(AuditError::Conflict(message)),
            Err(err) => return Err(AuditError::Store(err)),
        }
        toolhub_telemetry::inc_tool_call(&input.tool_name, status.as_str());
        Ok((tool_call, extra_ids))
    }

    /// Saves an artifact, counting the failure before propagating it.
    fn save_or_count(
        &self,
        run_id: &RunId,
        name: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<ArtifactRecord, AuditError> {
        match self.artifacts.save(run_id, name, content_type, body) {
            Ok(artifact) => Ok(artifact),
            Err(err) => {
                toolhub_telemetry::inc_artifact_write_failure();
                Err(AuditError::Artifact(err))
            }
        }
    }

    /// Looks up the unique `ok` call for a key and returns its response.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the lookup or artifact read fails.
    pub fn replay_response(
        &self,
        run_id: &RunId,
        tool_name: &str,
        idempotency_key: &str,
    ) -> Result<Option<(ToolCallRecord, Value)>, AuditError> {
        let Some(tool_call) =
            self.store.find_replayable_tool_call(run_id, tool_name, idempotency_key)?
        else {
            return Ok(None);
        };
        let response = self.read_response(&tool_call)?;
        Ok(Some((tool_call, response)))
    }

    /// Replay with request-payload equality, for client-supplied keys.
    ///
    /// The stored and current requests are compared as parsed JSON so
    /// insignificant whitespace never causes a spurious conflict.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::IdempotencyConflict`] when the stored request
    /// differs from the current one, and [`AuditError`] for lookup or
    /// artifact failures.
    pub fn replay_response_with_request_check(
        &self,
        run_id: &RunId,
        tool_name: &str,
        idempotency_key: &str,
        request: &Value,
    ) -> Result<Option<(ToolCallRecord, Value)>, AuditError> {
        let Some(tool_call) =
            self.store.find_replayable_tool_call(run_id, tool_name, idempotency_key)?
        else {
            return Ok(None);
        };
        let Some(request_artifact_id) = &tool_call.request_artifact_id else {
            return Err(AuditError::MissingArtifact("request"));
        };
        let stored_bytes = self.artifacts.read(request_artifact_id)?;
        let stored: Value = serde_json::from_slice(&stored_bytes)
            .map_err(|err| AuditError::Decode(err.to_string()))?;
        if &stored != request {
            return Err(AuditError::IdempotencyConflict);
        }
        let response = self.read_response(&tool_call)?;
        Ok(Some((tool_call, response)))
    }

    /// Reads and decodes the response artifact of a recorded call.
    fn read_response(&self, tool_call: &ToolCallRecord) -> Result<Value, AuditError> {
        let Some(response_artifact_id) = &tool_call.response_artifact_id else {
            return Err(AuditError::MissingArtifact("response"));
        };
        let bytes = self.artifacts.read(response_artifact_id)?;
        serde_json::from_slice(&bytes).map_err(|err| AuditError::Decode(err.to_string()))
    }

    // ------------------------------------------------------------------
    // Steps and decisions
    // ------------------------------------------------------------------

    /// Starts a step for a run.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the insert fails.
    pub fn start_step(
        &self,
        run_id: &RunId,
        name: &str,
        step_type: &str,
    ) -> Result<StepRecord, AuditError> {
        let now = Utc::now();
        let step = StepRecord {
            step_id: StepId::generate(),
            run_id: run_id.clone(),
            name: name.to_string(),
            step_type: step_type.to_string(),
            status: StepStatus::Started,
            started_at: Some(now),
            finished_at: None,
            created_at: now,
        };
        self.store.insert_step(&step)?;
        Ok(step)
    }

    /// Finishes a step with a terminal status.
    ///
    /// Callers treat failures as best-effort: the primary tool call is
    /// already durable.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the update fails.
    pub fn finish_step(&self, step_id: &StepId, status: StepStatus) -> Result<(), AuditError> {
        self.store.update_step_status(step_id, status, Some(Utc::now()))?;
        Ok(())
    }

    /// Appends a decision, persisting its payload as an artifact when given.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the payload artifact or the row cannot
    /// be persisted.
    pub fn record_decision(
        &self,
        run_id: &RunId,
        step_id: Option<&StepId>,
        actor: &str,
        decision_type: &str,
        payload: Option<&Value>,
    ) -> Result<DecisionRecord, AuditError> {
        let decision_id = DecisionId::generate();
        let payload_artifact_id = match payload {
            None => None,
            Some(payload) => {
                let bytes = canonical_json_bytes(payload)
                    .map_err(|err| AuditError::Serialize(err.to_string()))?;
                let artifact = self.save_or_count(
                    run_id,
                    &format!("decision.{decision_id}.payload.json"),
                    "application/json",
                    &bytes,
                )?;
                Some(artifact.artifact_id)
            }
        };
        let decision = DecisionRecord {
            decision_id,
            run_id: run_id.clone(),
            step_id: step_id.cloned(),
            actor: actor.to_string(),
            decision_type: decision_type.to_string(),
            payload_artifact_id,
            created_at: Utc::now(),
        };
        self.store.insert_decision(&decision)?;
        Ok(decision)
    }

    // ------------------------------------------------------------------
    // Approvals
    // ------------------------------------------------------------------

    /// Creates an approval in the `requested` state.
    ///
    /// The incoming payload is persisted as an artifact and an
    /// `approval_requested` decision is appended.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when persistence fails.
    pub fn create_approval(
        &self,
        run_id: &RunId,
        scope: &str,
        payload: Option<&Value>,
    ) -> Result<ApprovalRecord, AuditError> {
        let approval_id = ApprovalId::generate();
        let now = Utc::now();
        let approval = ApprovalRecord {
            approval_id: approval_id.clone(),
            run_id: run_id.clone(),
            scope: scope.to_string(),
            status: ApprovalStatus::Requested,
            requested_at: now,
            approved_at: None,
            approver: None,
            created_at: now,
        };
        self.store.insert_approval(&approval)?;

        let payload_artifact_id = match payload {
            None => None,
            Some(payload) => {
                let bytes = canonical_json_bytes(payload)
                    .map_err(|err| AuditError::Serialize(err.to_string()))?;
                let artifact = self.save_or_count(
                    run_id,
                    &format!("approval.{approval_id}.payload.json"),
                    "application/json",
                    &bytes,
                )?;
                Some(artifact.artifact_id)
            }
        };

        let decision = DecisionRecord {
            decision_id: DecisionId::generate(),
            run_id: run_id.clone(),
            step_id: None,
            actor: "system".to_string(),
            decision_type: "approval_requested".to_string(),
            payload_artifact_id,
            created_at: now,
        };
        self.store.insert_decision(&decision)?;
        Ok(approval)
    }

    /// Records the terminal decision on an approval and appends a decision.
    ///
    /// Resolving an already-terminal approval is a no-op on the row; the
    /// returned record reflects the stored state either way.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when persistence fails.
    pub fn resolve_approval(
        &self,
        approval_id: &ApprovalId,
        run_id: &RunId,
        status: ApprovalStatus,
        approver: &str,
    ) -> Result<Option<ApprovalRecord>, AuditError> {
        let now = Utc::now();
        self.store.update_approval_decision(approval_id, status, now, approver)?;

        let decision_type = if status == ApprovalStatus::Approved {
            "approval_approved"
        } else {
            "approval_rejected"
        };
        let decision = DecisionRecord {
            decision_id: DecisionId::generate(),
            run_id: run_id.clone(),
            step_id: None,
            actor: approver.to_string(),
            decision_type: decision_type.to_string(),
            payload_artifact_id: None,
            created_at: now,
        };
        self.store.insert_decision(&decision)?;
        Ok(self.store.get_approval(approval_id)?)
    }

    /// Loads an approval by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the query fails.
    pub fn get_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Option<ApprovalRecord>, AuditError> {
        Ok(self.store.get_approval(approval_id)?)
    }

    /// Lists approvals for a run.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the query fails.
    pub fn list_approvals(&self, run_id: &RunId) -> Result<Vec<ApprovalRecord>, AuditError> {
        Ok(self.store.list_approvals_by_run(run_id)?)
    }

    // ------------------------------------------------------------------
    // Evidence reads
    // ------------------------------------------------------------------

    /// Lists tool calls for a run, applying the filter.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the query fails.
    pub fn list_tool_calls(
        &self,
        run_id: &RunId,
        filter: &ToolCallFilter,
    ) -> Result<Vec<ToolCallRecord>, AuditError> {
        Ok(self.store.list_tool_calls_by_run(run_id, filter)?)
    }

    /// Lists artifacts for a run.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the query fails.
    pub fn list_artifacts(&self, run_id: &RunId) -> Result<Vec<ArtifactRecord>, AuditError> {
        Ok(self.store.list_artifacts_by_run(run_id)?)
    }

    /// Loads artifact metadata scoped to a run.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the query fails.
    pub fn get_artifact_by_run(
        &self,
        run_id: &RunId,
        artifact_id: &ArtifactId,
    ) -> Result<Option<ArtifactRecord>, AuditError> {
        Ok(self.store.get_artifact_by_run(run_id, artifact_id)?)
    }

    /// Reads the blob behind an artifact record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the blob cannot be read.
    pub fn read_artifact_content(&self, record: &ArtifactRecord) -> Result<Vec<u8>, AuditError> {
        Ok(read_blob(record)?)
    }
}
