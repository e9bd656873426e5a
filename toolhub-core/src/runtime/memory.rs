// toolhub-core/src/runtime/memory.rs
// ============================================================================
// Module: ToolHub In-Memory Audit Store
// Description: Mutex-guarded AuditStore for tests and ephemeral runs.
// Purpose: Honor the same constraints as the durable store, in memory.
// Dependencies: chrono, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The in-memory store enforces the same idempotency uniqueness constraint
//! as the SQLite store: inserting a second `ok` tool call for an existing
//! `(run, tool, key)` triple fails with a conflict. Approval decisions are
//! monotonic; terminal rows never transition again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;

use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::records::ApprovalRecord;
use crate::core::records::ApprovalStatus;
use crate::core::records::ArtifactRecord;
use crate::core::records::CallStatus;
use crate::core::records::DecisionRecord;
use crate::core::records::RunRecord;
use crate::core::records::StepRecord;
use crate::core::records::StepStatus;
use crate::core::records::ToolCallRecord;
use crate::interfaces::AuditStore;
use crate::interfaces::StoreError;
use crate::interfaces::ToolCallFilter;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Mutable tables guarded by the store mutex.
#[derive(Default)]
struct Tables {
    /// Runs by identifier, in insertion order.
    runs: Vec<RunRecord>,
    /// Artifacts in insertion order.
    artifacts: Vec<ArtifactRecord>,
    /// Tool calls in insertion order.
    tool_calls: Vec<ToolCallRecord>,
    /// Steps in insertion order.
    steps: Vec<StepRecord>,
    /// Decisions in insertion order.
    decisions: Vec<DecisionRecord>,
    /// Approvals in insertion order.
    approvals: Vec<ApprovalRecord>,
    /// Unique index over `(run, tool, key)` for `ok` rows.
    ok_keys: HashMap<(String, String, String), usize>,
}

/// In-memory audit store for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemoryAuditStore {
    /// Guarded tables.
    tables: Mutex<Tables>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables, surfacing poisoning as a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Db("mutex poisoned".to_string()))
    }
}

impl AuditStore for InMemoryAuditStore {
    fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.runs.iter().any(|existing| existing.run_id == run.run_id) {
            return Err(StoreError::Conflict(format!("run {} already exists", run.run_id)));
        }
        tables.runs.push(run.clone());
        Ok(())
    }

    fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.runs.iter().find(|run| &run.run_id == run_id).cloned())
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let tables = self.lock()?;
        let mut runs: Vec<RunRecord> = tables.runs.clone();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn insert_artifact(&self, artifact: &ArtifactRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.artifacts.push(artifact.clone());
        Ok(())
    }

    fn get_artifact(&self, artifact_id: &ArtifactId) -> Result<Option<ArtifactRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.artifacts.iter().find(|a| &a.artifact_id == artifact_id).cloned())
    }

    fn get_artifact_by_run(
        &self,
        run_id: &RunId,
        artifact_id: &ArtifactId,
    ) -> Result<Option<ArtifactRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .artifacts
            .iter()
            .find(|a| &a.run_id == run_id && &a.artifact_id == artifact_id)
            .cloned())
    }

    fn list_artifacts_by_run(&self, run_id: &RunId) -> Result<Vec<ArtifactRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.artifacts.iter().filter(|a| &a.run_id == run_id).cloned().collect())
    }

    fn insert_tool_call(&self, tool_call: &ToolCallRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tool_call.status == CallStatus::Ok
            && let Some(key) = &tool_call.idempotency_key
        {
            let index_key = (
                tool_call.run_id.to_string(),
                tool_call.tool_name.clone(),
                key.clone(),
            );
            if tables.ok_keys.contains_key(&index_key) {
                return Err(StoreError::Conflict(format!(
                    "ok tool call already recorded for key {key}"
                )));
            }
            let position = tables.tool_calls.len();
            tables.ok_keys.insert(index_key, position);
        }
        tables.tool_calls.push(tool_call.clone());
        Ok(())
    }

    fn find_replayable_tool_call(
        &self,
        run_id: &RunId,
        tool_name: &str,
        idempotency_key: &str,
    ) -> Result<Option<ToolCallRecord>, StoreError> {
        let tables = self.lock()?;
        let index_key =
            (run_id.to_string(), tool_name.to_string(), idempotency_key.to_string());
        Ok(tables.ok_keys.get(&index_key).and_then(|pos| tables.tool_calls.get(*pos)).cloned())
    }

    fn list_tool_calls_by_run(
        &self,
        run_id: &RunId,
        filter: &ToolCallFilter,
    ) -> Result<Vec<ToolCallRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .tool_calls
            .iter()
            .filter(|call| &call.run_id == run_id)
            .filter(|call| matches_filter(call, filter))
            .cloned()
            .collect())
    }

    fn insert_step(&self, step: &StepRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.steps.push(step.clone());
        Ok(())
    }

    fn update_step_status(
        &self,
        step_id: &StepId,
        status: StepStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if let Some(step) = tables.steps.iter_mut().find(|step| &step.step_id == step_id) {
            step.status = status;
            step.finished_at = finished_at;
        }
        Ok(())
    }

    fn list_steps_by_run(&self, run_id: &RunId) -> Result<Vec<StepRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.steps.iter().filter(|step| &step.run_id == run_id).cloned().collect())
    }

    fn insert_decision(&self, decision: &DecisionRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.decisions.push(decision.clone());
        Ok(())
    }

    fn list_decisions_by_run(&self, run_id: &RunId) -> Result<Vec<DecisionRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.decisions.iter().filter(|d| &d.run_id == run_id).cloned().collect())
    }

    fn insert_approval(&self, approval: &ApprovalRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.approvals.push(approval.clone());
        Ok(())
    }

    fn get_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Option<ApprovalRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.approvals.iter().find(|a| &a.approval_id == approval_id).cloned())
    }

    fn list_approvals_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.approvals.iter().filter(|a| &a.run_id == run_id).cloned().collect())
    }

    fn update_approval_decision(
        &self,
        approval_id: &ApprovalId,
        status: ApprovalStatus,
        approved_at: DateTime<Utc>,
        approver: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let Some(approval) =
            tables.approvals.iter_mut().find(|a| &a.approval_id == approval_id)
        else {
            return Ok(false);
        };
        if approval.status.is_terminal() {
            return Ok(false);
        }
        approval.status = status;
        approval.approved_at = Some(approved_at);
        approval.approver = Some(approver.to_string());
        Ok(true)
    }
}

/// Applies the tool call list filter.
fn matches_filter(call: &ToolCallRecord, filter: &ToolCallFilter) -> bool {
    if let Some(status) = filter.status
        && call.status != status
    {
        return false;
    }
    if let Some(tool_name) = &filter.tool_name
        && &call.tool_name != tool_name
    {
        return false;
    }
    if let Some(after) = filter.created_after
        && call.created_at <= after
    {
        return false;
    }
    if let Some(before) = filter.created_before
        && call.created_at >= before
    {
        return false;
    }
    true
}
