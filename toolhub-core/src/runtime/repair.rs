// toolhub-core/src/runtime/repair.rs
// ============================================================================
// Module: ToolHub Repair Loop
// Description: Bounded code-change/QA/rollback orchestration.
// Purpose: Apply a change, retry QA up to a cap, roll back on failure.
// Dependencies: serde_json, toolhub-telemetry, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The repair loop applies a code change, runs the QA pair up to
//! `max_iterations` times, and either opens a pull request on success or
//! rolls the head branch back on failure. Every iteration appends a decision
//! to the step timeline, and one tool call covering the whole operation is
//! persisted with the final result. Decision and step-finish failures are
//! best-effort; the primary tool call is the source of truth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::errors::DomainError;
use crate::core::qa::QaKind;
use crate::core::qa::QaStatus;
use crate::core::qa::derive_qa_failure_category;
use crate::core::qa::derive_qa_status;
use crate::core::qa::qa_status_metric_label;
use crate::core::records::RunRecord;
use crate::core::records::StepStatus;
use crate::core::records::ToolCallRecord;
use crate::core::tools;
use crate::interfaces::CodeChangeRequest;
use crate::interfaces::CodeChangeResult;
use crate::interfaces::CodeRunner;
use crate::interfaces::CreatePullRequestInput;
use crate::interfaces::FileChange;
use crate::interfaces::ForgeClient;
use crate::interfaces::QaExecutor;
use crate::interfaces::QaOutcome;
use crate::runtime::audit::AuditService;
use crate::runtime::audit::RecordInput;

// ============================================================================
// SECTION: Request and Outcome
// ============================================================================

/// Validated repair loop request.
#[derive(Debug, Clone)]
pub struct RepairLoopRequest {
    /// Branch to start from.
    pub base_branch: String,
    /// Branch to create and push.
    pub head_branch: String,
    /// Commit message.
    pub commit_message: String,
    /// PR title used on success.
    pub pr_title: String,
    /// PR body used on success.
    pub pr_body: String,
    /// Ordered file changes.
    pub files: Vec<FileChange>,
    /// QA retry cap, already clamped to the configured maximum.
    pub max_iterations: u32,
    /// Plan commands without executing when set.
    pub dry_run: bool,
}

/// Result of one repair loop execution.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// Persisted tool call covering the whole operation.
    pub tool_call: ToolCallRecord,
    /// Final result payload.
    pub result: Value,
    /// Primary error when the loop failed.
    pub error: Option<DomainError>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Orchestrates the repair loop over the collaborator interfaces.
pub struct RepairLoopEngine<'a> {
    /// Audit engine for the step, decisions, and the primary tool call.
    pub audit: &'a AuditService,
    /// Code-forge client used to open the PR on success.
    pub forge: &'a dyn ForgeClient,
    /// QA executor for the test/lint pair.
    pub qa: &'a dyn QaExecutor,
    /// Git runner for the change and the rollback.
    pub code: &'a dyn CodeRunner,
}

impl RepairLoopEngine<'_> {
    /// Executes the repair loop for an already-gated request.
    ///
    /// The caller has verified the approval and the path policy; this
    /// method owns everything from the step onward.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] only when audit persistence fails; loop
    /// failures are reported through [`RepairOutcome::error`] after the
    /// evidence is durable.
    pub async fn execute(
        &self,
        run: &RunRecord,
        request: &RepairLoopRequest,
    ) -> Result<RepairOutcome, DomainError> {
        let step = self
            .audit
            .start_step(&run.run_id, "code_repair_loop", "repair_loop")
            .map_err(DomainError::from)?;
        self.best_effort_decision(
            run,
            &step.step_id,
            "repair_loop_started",
            &json!({"max_iterations": request.max_iterations}),
        );

        let change = CodeChangeRequest {
            base_branch: request.base_branch.clone(),
            head_branch: request.head_branch.clone(),
            commit_message: request.commit_message.clone(),
            files: request.files.clone(),
            dry_run: request.dry_run,
        };
        let mut run_error: Option<DomainError> = None;
        let code_result = match self.code.execute(&change).await {
            Ok(result) => result,
            Err(err) => {
                run_error = Some(err.into());
                CodeChangeResult::default()
            }
        };

        let mut iterations_run = 0u32;
        let mut qa_passed = false;
        let mut qa_attempts: Vec<Value> = Vec::new();
        let mut result = json!({
            "iterations_requested": request.max_iterations,
            "iterations_run": iterations_run,
            "base_branch": request.base_branch,
            "head_branch": request.head_branch,
            "planned_commands": code_result.planned_commands,
            "commit_hash": code_result.commit_hash,
            "qa_passed": qa_passed,
            "status": "completed",
        });

        if run_error.is_none() && !request.dry_run {
            let mut last_failure_category = "qa_error";
            for iteration in 1..=request.max_iterations {
                iterations_run = iteration;

                let (test_status, test_error, test_report) = self.run_qa(QaKind::Test).await;
                let (lint_status, lint_error, lint_report) = self.run_qa(QaKind::Lint).await;

                let mut attempt = json!({
                    "iteration": iteration,
                    "test_status": test_status.as_str(),
                    "lint_status": lint_status.as_str(),
                    "test_report": test_report,
                    "lint_report": lint_report,
                });
                if let Some(err) = &test_error {
                    attempt["test_error"] = Value::String(err.to_string());
                }
                if let Some(err) = &lint_error {
                    attempt["lint_error"] = Value::String(err.to_string());
                }
                qa_attempts.push(attempt.clone());
                self.best_effort_decision(run, &step.step_id, "repair_loop_iteration", &attempt);

                if test_error.is_none() && lint_error.is_none() {
                    qa_passed = true;
                    toolhub_telemetry::inc_repair_iteration("pass");
                    break;
                }
                last_failure_category =
                    derive_qa_failure_category(test_error.as_ref(), lint_error.as_ref());
                toolhub_telemetry::inc_repair_iteration("fail");
            }

            if !qa_passed {
                result["status"] = Value::String("failed".to_string());
                result["qa_failure_reason"] = Value::String(format!(
                    "qa checks failed after {iterations_run} iteration(s)"
                ));
                result["qa_failure_category"] = Value::String(last_failure_category.to_string());

                match self
                    .code
                    .rollback(&request.base_branch, &request.head_branch, false)
                    .await
                {
                    Ok(rollback) => {
                        result["rollback_planned_commands"] =
                            serde_json::to_value(&rollback.planned_commands).unwrap_or(Value::Null);
                        toolhub_telemetry::inc_repair_rollback("ok");
                    }
                    Err(err) => {
                        result["rollback_error"] = Value::String(err.to_string());
                        toolhub_telemetry::inc_repair_rollback("fail");
                    }
                }
                run_error = Some(DomainError::Internal("qa checks failed".to_string()));
            }
        }

        result["iterations_run"] = json!(iterations_run);
        result["qa_passed"] = Value::Bool(qa_passed);
        if !qa_attempts.is_empty() {
            result["qa_attempts"] = Value::Array(qa_attempts);
        }

        if run_error.is_none() && !request.dry_run && qa_passed {
            match self
                .forge
                .create_pull_request(
                    &run.repo,
                    CreatePullRequestInput {
                        title: request.pr_title.clone(),
                        head: request.head_branch.clone(),
                        base: request.base_branch.clone(),
                        body: request.pr_body.clone(),
                    },
                )
                .await
            {
                Ok(pull_request) => {
                    result["pull_request"] =
                        serde_json::to_value(&pull_request).unwrap_or(Value::Null);
                }
                Err(err) => run_error = Some(err.into()),
            }
        }

        if run_error.is_some() {
            result["status"] = Value::String("failed".to_string());
        } else if request.dry_run {
            result["status"] = Value::String("dry_run".to_string());
        }

        let record = RecordInput::new(
            &run.run_id,
            tools::CODE_REPAIR_LOOP,
            repair_request_value(request),
            result.clone(),
        )
        .with_error(run_error.as_ref().map(ToString::to_string));
        let (tool_call, _) = self.audit.record(record).map_err(DomainError::from)?;

        let (decision_type, step_status, outcome_label) = if run_error.is_some() {
            ("repair_loop_failed", StepStatus::Failed, "failed")
        } else {
            ("repair_loop_completed", StepStatus::Completed, "completed")
        };
        self.best_effort_decision(run, &step.step_id, decision_type, &result);
        // Best-effort: the primary tool call is already durable.
        let _ = self.audit.finish_step(&step.step_id, step_status);
        toolhub_telemetry::inc_repair_completed(outcome_label);

        Ok(RepairOutcome {
            tool_call,
            result,
            error: run_error,
        })
    }

    /// Runs one QA kind, returning its status, error, and report value.
    async fn run_qa(&self, kind: QaKind) -> (QaStatus, Option<crate::core::qa::QaError>, Value) {
        match self.qa.run(kind, false).await {
            Ok(QaOutcome {
                report,
                error,
            }) => {
                let status = derive_qa_status(&report, error.as_ref(), false);
                toolhub_telemetry::inc_repair_qa_result(
                    kind.tool_name(),
                    qa_status_metric_label(status),
                );
                let report_value = serde_json::to_value(&report).unwrap_or(Value::Null);
                (status, error, report_value)
            }
            Err(err) => {
                let status = derive_qa_status(&Default::default(), Some(&err), false);
                toolhub_telemetry::inc_repair_qa_result(
                    kind.tool_name(),
                    qa_status_metric_label(status),
                );
                (status, Some(err), Value::Null)
            }
        }
    }

    /// Appends a decision, swallowing persistence failures.
    fn best_effort_decision(
        &self,
        run: &RunRecord,
        step_id: &crate::core::identifiers::StepId,
        decision_type: &str,
        payload: &Value,
    ) {
        let _ = self.audit.record_decision(
            &run.run_id,
            Some(step_id),
            "system",
            decision_type,
            Some(payload),
        );
    }
}

/// Serializes the repair request for the audit record.
fn repair_request_value(request: &RepairLoopRequest) -> Value {
    json!({
        "base_branch": request.base_branch,
        "head_branch": request.head_branch,
        "commit_message": request.commit_message,
        "pr_title": request.pr_title,
        "pr_body": request.pr_body,
        "files": request.files,
        "max_iterations": request.max_iterations,
        "dry_run": request.dry_run,
    })
}
