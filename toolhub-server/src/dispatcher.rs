// toolhub-server/src/dispatcher.rs
// ============================================================================
// Module: ToolHub Tool Dispatcher
// Description: The canonical per-tool execution chain shared by transports.
// Purpose: parse, validate, gate, replay, invoke, audit, and envelope.
// Dependencies: toolhub-core, toolhub-telemetry, serde, serde_json
// ============================================================================

//! ## Overview
//! Every tool runs the same chain: resolve run, policy check, replay probe,
//! external invocation, audit record, envelope. Dry runs skip the external
//! side effect but still persist request/response artifacts and a tool call,
//! so the audit trail is never gapped. Concurrent duplicate requests resolve
//! through the store's unique index: the loser re-probes and replays the
//! winner's response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use toolhub_core::ApprovalId;
use toolhub_core::ApprovalRecord;
use toolhub_core::ApprovalStatus;
use toolhub_core::ArtifactId;
use toolhub_core::ArtifactRecord;
use toolhub_core::AuditService;
use toolhub_core::BatchRequest;
use toolhub_core::CodeChangeRequest;
use toolhub_core::CodeChangeResult;
use toolhub_core::CodeRunner;
use toolhub_core::CreateIssueInput;
use toolhub_core::CreatePullRequestInput;
use toolhub_core::DomainError;
use toolhub_core::ExtraArtifact;
use toolhub_core::FileChange;
use toolhub_core::ForgeClient;
use toolhub_core::Policy;
use toolhub_core::QaArtifactRefs;
use toolhub_core::QaExecutor;
use toolhub_core::QaKind;
use toolhub_core::QaOutcome;
use toolhub_core::RecordInput;
use toolhub_core::RepairLoopEngine;
use toolhub_core::RepairLoopRequest;
use toolhub_core::RunId;
use toolhub_core::RunRecord;
use toolhub_core::RunService;
use toolhub_core::ToolCallFilter;
use toolhub_core::ToolCallRecord;
use toolhub_core::ToolEnvelope;
use toolhub_core::ToolMeta;
use toolhub_core::batch::BatchMode;
use toolhub_core::count_content_lines;
use toolhub_core::derive_qa_status;
use toolhub_core::generate_unified_diff;
use toolhub_core::make_issue_key;
use toolhub_core::make_pr_comment_key;
use toolhub_core::map_error;
use toolhub_core::process_issue_batch;
use toolhub_core::runtime::audit::AuditError;
use toolhub_core::tools;
use toolhub_core::validate_issue_input;

// ============================================================================
// SECTION: Build Info
// ============================================================================

/// Build metadata reported by `/version` and MCP `initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    /// Semantic version.
    pub version: String,
    /// Git commit the binary was built from.
    pub git_commit: String,
    /// Build timestamp.
    pub build_time: String,
    /// Public tool contract version.
    pub contract_version: String,
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Run creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRunRequest {
    /// Target repository (`owner/name`).
    pub repo: String,
    /// Free-form purpose.
    pub purpose: String,
}

/// Single issue creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIssueRequest {
    /// Issue title.
    pub title: String,
    /// Issue body.
    pub body: String,
    /// Issue labels.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Skip the external side effect when set.
    #[serde(default)]
    pub dry_run: bool,
}

/// PR comment creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrCommentRequest {
    /// Comment body.
    pub body: String,
    /// Skip the external side effect when set.
    #[serde(default)]
    pub dry_run: bool,
}

/// QA execution request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct QaRequest {
    /// Plan the command without executing when set.
    #[serde(default)]
    pub dry_run: bool,
}

/// Patch generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodePatchRequest {
    /// Repository-relative path.
    pub path: String,
    /// Original file content.
    #[serde(default)]
    pub original_content: String,
    /// Modified file content.
    #[serde(default)]
    pub modified_content: String,
    /// Marker carried through to the envelope meta.
    #[serde(default)]
    pub dry_run: bool,
}

/// Branch + PR creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeBranchPrRequest {
    /// Approval gating this write.
    pub approval_id: String,
    /// Branch to start from.
    pub base_branch: String,
    /// Branch to create and push.
    pub head_branch: String,
    /// Commit message.
    pub commit_message: String,
    /// PR title.
    pub pr_title: String,
    /// PR body.
    #[serde(default)]
    pub pr_body: String,
    /// Ordered file changes.
    pub files: Vec<FileChange>,
    /// Plan commands without executing when set.
    #[serde(default)]
    pub dry_run: bool,
}

/// Repair loop request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeRepairLoopRequest {
    /// Approval gating this write.
    pub approval_id: String,
    /// Branch to start from.
    pub base_branch: String,
    /// Branch to create and push.
    pub head_branch: String,
    /// Commit message.
    pub commit_message: String,
    /// PR title used on success.
    pub pr_title: String,
    /// PR body used on success.
    #[serde(default)]
    pub pr_body: String,
    /// Ordered file changes.
    pub files: Vec<FileChange>,
    /// QA retry cap; zero selects one iteration.
    #[serde(default)]
    pub max_iterations: u32,
    /// Plan commands without executing when set.
    #[serde(default)]
    pub dry_run: bool,
}

/// Approval creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateApprovalRequest {
    /// Free-form scope tag; `path_change` is reserved.
    pub scope: String,
    /// Paths the approval covers.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Arbitrary payload persisted as an artifact.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Approval resolution request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveApprovalRequest {
    /// Identifier of the approver deciding.
    pub approver: String,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Construction inputs for the dispatcher.
pub struct ToolDispatcherConfig {
    /// Run registry.
    pub runs: RunService,
    /// Audit engine.
    pub audit: AuditService,
    /// Process policy.
    pub policy: Arc<Policy>,
    /// Code-forge collaborator.
    pub forge: Arc<dyn ForgeClient>,
    /// QA collaborator.
    pub qa: Arc<dyn QaExecutor>,
    /// Git collaborator.
    pub code: Arc<dyn CodeRunner>,
    /// Batch error handling mode.
    pub batch_mode: BatchMode,
    /// Cap on repair loop iterations.
    pub repair_max_iterations: u32,
}

/// Drives every tool through the canonical execution chain.
pub struct ToolDispatcher {
    /// Run registry.
    runs: RunService,
    /// Audit engine.
    audit: AuditService,
    /// Process policy.
    policy: Arc<Policy>,
    /// Code-forge collaborator.
    forge: Arc<dyn ForgeClient>,
    /// QA collaborator.
    qa: Arc<dyn QaExecutor>,
    /// Git collaborator.
    code: Arc<dyn CodeRunner>,
    /// Batch error handling mode.
    batch_mode: BatchMode,
    /// Cap on repair loop iterations.
    repair_max_iterations: u32,
}

impl ToolDispatcher {
    /// Creates a dispatcher from its configuration.
    #[must_use]
    pub fn new(config: ToolDispatcherConfig) -> Self {
        Self {
            runs: config.runs,
            audit: config.audit,
            policy: config.policy,
            forge: config.forge,
            qa: config.qa,
            code: config.code,
            batch_mode: config.batch_mode,
            repair_max_iterations: config.repair_max_iterations,
        }
    }

    /// Returns the configured batch mode.
    #[must_use]
    pub const fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Creates a run after the repo allowlist check.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] on policy, validation, or store failure.
    pub fn create_run(&self, request: &CreateRunRequest) -> Result<RunRecord, DomainError> {
        self.policy.check_repo(&request.repo).map_err(DomainError::from)?;
        self.runs.create_run(&request.repo, &request.purpose)
    }

    /// Loads a run or fails with `run_not_found`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::RunNotFound`] when the run does not exist.
    pub fn require_run(&self, run_id: &RunId) -> Result<RunRecord, DomainError> {
        self.runs.require_run(run_id)
    }

    /// Lists runs, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the query fails.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, DomainError> {
        self.runs.list_runs(limit)
    }

    // ------------------------------------------------------------------
    // Issues
    // ------------------------------------------------------------------

    /// Creates a single issue with idempotent replay.
    ///
    /// A client-supplied key (the `Idempotency-Key` header) engages the
    /// request-equality replay path; derived keys cannot conflict by
    /// construction.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, upstream, and audit
    /// failures. Upstream failures still produce a `fail` tool call first.
    pub async fn create_issue(
        &self,
        run_id: &RunId,
        request: &CreateIssueRequest,
        client_key: Option<&str>,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.create_issue_inner(run_id, request, client_key).await;
        toolhub_telemetry::observe_tool_duration(tools::GITHUB_ISSUES_CREATE, started.elapsed());
        result
    }

    async fn create_issue_inner(
        &self,
        run_id: &RunId,
        request: &CreateIssueRequest,
        client_key: Option<&str>,
    ) -> Result<ToolEnvelope, DomainError> {
        let tool_name = tools::GITHUB_ISSUES_CREATE;
        let run = self.require_run(run_id)?;
        self.policy.check_tool(tool_name).map_err(DomainError::from)?;
        validate_issue_input(&request.title, &request.body, &request.labels)
            .map_err(|err| DomainError::Validation(err.to_string()))?;

        let request_value =
            serde_json::to_value(request).map_err(|err| DomainError::Internal(err.to_string()))?;
        let client_key = client_key.map(str::trim).filter(|key| !key.is_empty());
        let key = match client_key {
            Some(header) => header.to_string(),
            None => make_issue_key(
                run_id.as_str(),
                tool_name,
                &request.title,
                &request.body,
                &request.labels,
                None,
            )
            .map_err(|err| DomainError::Internal(err.to_string()))?,
        };

        let replay = if client_key.is_some() {
            self.audit
                .replay_response_with_request_check(run_id, tool_name, &key, &request_value)
        } else {
            self.audit.replay_response(run_id, tool_name, &key)
        }
        .map_err(DomainError::from)?;
        if let Some((tool_call, response)) = replay {
            return Ok(replayed_envelope(&run, &tool_call, response_field(&response, "issue")));
        }

        let mut issue = None;
        let mut forge_error = None;
        if !request.dry_run {
            match self
                .forge
                .create_issue(
                    &run.repo,
                    CreateIssueInput {
                        title: request.title.clone(),
                        body: request.body.clone(),
                        labels: request.labels.clone(),
                    },
                )
                .await
            {
                Ok(created) => issue = Some(created),
                Err(err) => forge_error = Some(err),
            }
        }

        let preview = json!({
            "repo": run.repo,
            "title": request.title,
            "body": request.body,
            "labels": request.labels,
        });
        let record = RecordInput::new(
            run_id,
            tool_name,
            request_value,
            json!({"issue": issue, "preview": preview}),
        )
        .with_key(&key)
        .with_error(forge_error.as_ref().map(ToString::to_string));
        let (tool_call, _) = match self.audit.record(record) {
            Ok(recorded) => recorded,
            Err(AuditError::Conflict(_)) => {
                // A concurrent identical request won the insert; replay it.
                let replay = self
                    .audit
                    .replay_response(run_id, tool_name, &key)
                    .map_err(DomainError::from)?;
                let Some((tool_call, response)) = replay else {
                    return Err(DomainError::Internal(
                        "tool call conflict without a replayable row".to_string(),
                    ));
                };
                return Ok(replayed_envelope(
                    &run,
                    &tool_call,
                    response_field(&response, "issue"),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(err) = forge_error {
            return Err(err.into());
        }

        let result = if request.dry_run {
            json!({"would_create": preview})
        } else {
            serde_json::to_value(&issue).map_err(|err| DomainError::Internal(err.to_string()))?
        };
        Ok(ToolEnvelope::success(
            ToolMeta::new(
                run_id.as_str(),
                tool_call.tool_call_id.as_str(),
                &tool_call.evidence_hash,
                request.dry_run,
            ),
            result,
        ))
    }

    /// Creates a batch of issues; the aggregate envelope carries empty
    /// tool call coordinates because evidence is per item.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, and audit failures.
    pub async fn batch_create_issues(
        &self,
        run_id: &RunId,
        request: &BatchRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.batch_create_issues_inner(run_id, request).await;
        toolhub_telemetry::observe_tool_duration(
            tools::GITHUB_ISSUES_BATCH_CREATE,
            started.elapsed(),
        );
        result
    }

    async fn batch_create_issues_inner(
        &self,
        run_id: &RunId,
        request: &BatchRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let run = self.require_run(run_id)?;
        self.policy.check_tool(tools::GITHUB_ISSUES_BATCH_CREATE).map_err(DomainError::from)?;
        let response =
            process_issue_batch(&self.audit, self.forge.as_ref(), &run, self.batch_mode, request)
                .await?;
        let ok = response.errors == 0;
        let result = serde_json::to_value(&response)
            .map_err(|err| DomainError::Internal(err.to_string()))?;
        let meta = ToolMeta::new(run_id.as_str(), "", "", request.dry_run);
        if ok {
            Ok(ToolEnvelope::success(meta, result))
        } else {
            let reason = response
                .failed_reason
                .unwrap_or_else(|| format!("{} item(s) failed", response.errors));
            Ok(ToolEnvelope::failure(meta, result, "batch_item_failed", &reason))
        }
    }

    // ------------------------------------------------------------------
    // Pull requests
    // ------------------------------------------------------------------

    /// Creates a PR comment with idempotent replay.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, upstream, and audit
    /// failures.
    pub async fn create_pr_comment(
        &self,
        run_id: &RunId,
        pr_number: u64,
        request: &PrCommentRequest,
        client_key: Option<&str>,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.create_pr_comment_inner(run_id, pr_number, request, client_key).await;
        toolhub_telemetry::observe_tool_duration(tools::GITHUB_PR_COMMENT_CREATE, started.elapsed());
        result
    }

    async fn create_pr_comment_inner(
        &self,
        run_id: &RunId,
        pr_number: u64,
        request: &PrCommentRequest,
        client_key: Option<&str>,
    ) -> Result<ToolEnvelope, DomainError> {
        let tool_name = tools::GITHUB_PR_COMMENT_CREATE;
        let run = self.require_run(run_id)?;
        self.policy.check_tool(tool_name).map_err(DomainError::from)?;
        if request.body.trim().is_empty() {
            return Err(DomainError::Validation("body is required".to_string()));
        }

        let request_value =
            serde_json::to_value(request).map_err(|err| DomainError::Internal(err.to_string()))?;
        let client_key = client_key.map(str::trim).filter(|key| !key.is_empty());
        let key = match client_key {
            Some(header) => header.to_string(),
            None => make_pr_comment_key(run_id.as_str(), tool_name, pr_number, &request.body)
                .map_err(|err| DomainError::Internal(err.to_string()))?,
        };

        let replay = if client_key.is_some() {
            self.audit
                .replay_response_with_request_check(run_id, tool_name, &key, &request_value)
        } else {
            self.audit.replay_response(run_id, tool_name, &key)
        }
        .map_err(DomainError::from)?;
        if let Some((tool_call, response)) = replay {
            return Ok(replayed_envelope(&run, &tool_call, response_field(&response, "comment")));
        }

        let mut comment = None;
        let mut forge_error = None;
        if !request.dry_run {
            match self.forge.create_pr_comment(&run.repo, pr_number, &request.body).await {
                Ok(created) => comment = Some(created),
                Err(err) => forge_error = Some(err),
            }
        }

        let preview = json!({
            "repo": run.repo,
            "pr_number": pr_number,
            "body": request.body,
        });
        let record = RecordInput::new(
            run_id,
            tool_name,
            request_value,
            json!({"comment": comment, "preview": preview}),
        )
        .with_key(&key)
        .with_error(forge_error.as_ref().map(ToString::to_string));
        let (tool_call, _) = match self.audit.record(record) {
            Ok(recorded) => recorded,
            Err(AuditError::Conflict(_)) => {
                let replay = self
                    .audit
                    .replay_response(run_id, tool_name, &key)
                    .map_err(DomainError::from)?;
                let Some((tool_call, response)) = replay else {
                    return Err(DomainError::Internal(
                        "tool call conflict without a replayable row".to_string(),
                    ));
                };
                return Ok(replayed_envelope(
                    &run,
                    &tool_call,
                    response_field(&response, "comment"),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(err) = forge_error {
            return Err(err.into());
        }

        let result = if request.dry_run {
            json!({"would_comment": preview})
        } else {
            serde_json::to_value(&comment).map_err(|err| DomainError::Internal(err.to_string()))?
        };
        Ok(ToolEnvelope::success(
            ToolMeta::new(
                run_id.as_str(),
                tool_call.tool_call_id.as_str(),
                &tool_call.evidence_hash,
                request.dry_run,
            ),
            result,
        ))
    }

    /// Reads pull request metadata; audited, never replayed.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, upstream, and audit failures.
    pub async fn get_pull_request(
        &self,
        run_id: &RunId,
        pr_number: u64,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.read_pull_request(run_id, pr_number, false).await;
        toolhub_telemetry::observe_tool_duration(tools::GITHUB_PR_GET, started.elapsed());
        result
    }

    /// Lists pull request files; audited, never replayed.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, upstream, and audit failures.
    pub async fn list_pull_request_files(
        &self,
        run_id: &RunId,
        pr_number: u64,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.read_pull_request(run_id, pr_number, true).await;
        toolhub_telemetry::observe_tool_duration(tools::GITHUB_PR_FILES_LIST, started.elapsed());
        result
    }

    async fn read_pull_request(
        &self,
        run_id: &RunId,
        pr_number: u64,
        files: bool,
    ) -> Result<ToolEnvelope, DomainError> {
        let tool_name =
            if files { tools::GITHUB_PR_FILES_LIST } else { tools::GITHUB_PR_GET };
        let run = self.require_run(run_id)?;
        self.policy.check_tool(tool_name).map_err(DomainError::from)?;

        let (response, forge_error) = if files {
            match self.forge.list_pull_request_files(&run.repo, pr_number).await {
                Ok(listed) => {
                    let count = listed.len();
                    (json!({"files": listed, "count": count}), None)
                }
                Err(err) => (Value::Null, Some(err)),
            }
        } else {
            match self.forge.get_pull_request(&run.repo, pr_number).await {
                Ok(pull_request) => (
                    serde_json::to_value(&pull_request)
                        .map_err(|err| DomainError::Internal(err.to_string()))?,
                    None,
                ),
                Err(err) => (Value::Null, Some(err)),
            }
        };

        let record = RecordInput::new(
            run_id,
            tool_name,
            json!({"pr_number": pr_number}),
            response.clone(),
        )
        .with_error(forge_error.as_ref().map(ToString::to_string));
        let (tool_call, _) = self.audit.record(record).map_err(DomainError::from)?;

        if let Some(err) = forge_error {
            return Err(err.into());
        }
        Ok(ToolEnvelope::success(
            ToolMeta::new(
                run_id.as_str(),
                tool_call.tool_call_id.as_str(),
                &tool_call.evidence_hash,
                false,
            ),
            response,
        ))
    }

    // ------------------------------------------------------------------
    // QA
    // ------------------------------------------------------------------

    /// Runs the configured QA command for a kind.
    ///
    /// QA configuration errors are transport errors; QA outcomes (timeout,
    /// failed command) are carried inside the envelope with `ok=false`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, configuration, and audit
    /// failures.
    pub async fn run_qa(
        &self,
        run_id: &RunId,
        kind: QaKind,
        request: &QaRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.run_qa_inner(run_id, kind, request).await;
        toolhub_telemetry::observe_tool_duration(kind.tool_name(), started.elapsed());
        result
    }

    async fn run_qa_inner(
        &self,
        run_id: &RunId,
        kind: QaKind,
        request: &QaRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let tool_name = kind.tool_name();
        self.require_run(run_id)?;
        self.policy.check_tool(tool_name).map_err(DomainError::from)?;
        let request_value =
            serde_json::to_value(request).map_err(|err| DomainError::Internal(err.to_string()))?;

        let outcome = match self.qa.run(kind, request.dry_run).await {
            Ok(outcome) => outcome,
            Err(config_error) => {
                // No report exists; still leave a failed tool call behind.
                let record = RecordInput::new(run_id, tool_name, request_value, Value::Null)
                    .with_error(Some(config_error.to_string()));
                self.audit.record(record).map_err(DomainError::from)?;
                return Err(DomainError::Qa(config_error));
            }
        };
        let QaOutcome {
            report,
            error,
        } = outcome;

        let report_value =
            serde_json::to_value(&report).map_err(|err| DomainError::Internal(err.to_string()))?;
        let report_bytes = serde_json::to_vec(&report_value)
            .map_err(|err| DomainError::Internal(err.to_string()))?;
        let extras = vec![
            ExtraArtifact {
                name: format!("{tool_name}.stdout.txt"),
                content_type: "text/plain".to_string(),
                body: report.stdout.clone().into_bytes(),
            },
            ExtraArtifact {
                name: format!("{tool_name}.stderr.txt"),
                content_type: "text/plain".to_string(),
                body: report.stderr.clone().into_bytes(),
            },
            ExtraArtifact {
                name: format!("{tool_name}.report.json"),
                content_type: "application/json".to_string(),
                body: report_bytes,
            },
        ];
        let record = RecordInput::new(
            run_id,
            tool_name,
            request_value,
            json!({"report": report_value}),
        )
        .with_error(error.as_ref().map(ToString::to_string))
        .with_extras(extras);
        let (tool_call, extra_ids) = self.audit.record(record).map_err(DomainError::from)?;

        let qa_artifacts = QaArtifactRefs {
            stdout_artifact_id: extra_ids.first().cloned(),
            stderr_artifact_id: extra_ids.get(1).cloned(),
            report_artifact_id: extra_ids.get(2).cloned(),
        };

        let status = derive_qa_status(&report, error.as_ref(), request.dry_run);
        let mut meta = ToolMeta::new(
            run_id.as_str(),
            tool_call.tool_call_id.as_str(),
            &tool_call.evidence_hash,
            request.dry_run,
        );
        meta.qa_artifacts = Some(qa_artifacts);
        let result = json!({"status": status.as_str(), "report": report_value});
        match error {
            None => Ok(ToolEnvelope::success(meta, result)),
            Some(qa_error) => Ok(ToolEnvelope::failure(
                meta,
                result,
                qa_error.code.as_str(),
                &qa_error.to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Code
    // ------------------------------------------------------------------

    /// Generates a unified diff without touching version control.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, and audit failures.
    pub async fn generate_patch(
        &self,
        run_id: &RunId,
        request: &CodePatchRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.generate_patch_inner(run_id, request).await;
        toolhub_telemetry::observe_tool_duration(tools::CODE_PATCH_GENERATE, started.elapsed());
        result
    }

    async fn generate_patch_inner(
        &self,
        run_id: &RunId,
        request: &CodePatchRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let tool_name = tools::CODE_PATCH_GENERATE;
        self.require_run(run_id)?;
        self.policy.check_tool(tool_name).map_err(DomainError::from)?;
        if request.path.trim().is_empty() {
            return Err(DomainError::Validation("path is required".to_string()));
        }

        let patch = generate_unified_diff(
            &request.path,
            &request.original_content,
            &request.modified_content,
        );
        let line_delta = count_content_lines(&request.modified_content)
            - count_content_lines(&request.original_content);
        let mut result = json!({
            "path": request.path,
            "patch": patch,
            "line_delta": line_delta,
        });

        let record = RecordInput::new(
            run_id,
            tool_name,
            serde_json::to_value(request)
                .map_err(|err| DomainError::Internal(err.to_string()))?,
            result.clone(),
        )
        .with_extras(vec![ExtraArtifact {
            name: format!("{tool_name}.patch.diff"),
            content_type: "text/x-diff".to_string(),
            body: patch.into_bytes(),
        }]);
        let (tool_call, extra_ids) = self.audit.record(record).map_err(DomainError::from)?;
        if let Some(patch_artifact_id) = extra_ids.first() {
            result["patch_artifact_id"] = Value::String(patch_artifact_id.clone());
        }

        Ok(ToolEnvelope::success(
            ToolMeta::new(
                run_id.as_str(),
                tool_call.tool_call_id.as_str(),
                &tool_call.evidence_hash,
                request.dry_run,
            ),
            result,
        ))
    }

    /// Creates a branch, commits, pushes, and opens a PR. Approval-gated.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, upstream, and audit
    /// failures. The approval and path checks run before any external call.
    pub async fn create_branch_pr(
        &self,
        run_id: &RunId,
        request: &CodeBranchPrRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.create_branch_pr_inner(run_id, request).await;
        toolhub_telemetry::observe_tool_duration(tools::CODE_BRANCH_PR_CREATE, started.elapsed());
        result
    }

    async fn create_branch_pr_inner(
        &self,
        run_id: &RunId,
        request: &CodeBranchPrRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let tool_name = tools::CODE_BRANCH_PR_CREATE;
        let run = self.require_run(run_id)?;
        self.policy.check_tool(tool_name).map_err(DomainError::from)?;
        self.verify_approval(run_id, &request.approval_id)?;
        self.check_file_paths(&request.files)?;

        let combined_patch = combined_diff(&request.files);
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

        let mut result = json!({
            "base_branch": request.base_branch,
            "head_branch": request.head_branch,
            "planned_commands": code_result.planned_commands,
            "commit_hash": code_result.commit_hash,
        });

        if run_error.is_none() && !request.dry_run {
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
                    result["pull_request"] = serde_json::to_value(&pull_request)
                        .map_err(|err| DomainError::Internal(err.to_string()))?;
                }
                Err(err) => run_error = Some(err.into()),
            }
        }

        let record = RecordInput::new(
            run_id,
            tool_name,
            serde_json::to_value(request)
                .map_err(|err| DomainError::Internal(err.to_string()))?,
            result.clone(),
        )
        .with_error(run_error.as_ref().map(ToString::to_string))
        .with_extras(vec![ExtraArtifact {
            name: format!("{tool_name}.patch.diff"),
            content_type: "text/x-diff".to_string(),
            body: combined_patch.into_bytes(),
        }]);
        let (tool_call, extra_ids) = self.audit.record(record).map_err(DomainError::from)?;
        if let Some(patch_artifact_id) = extra_ids.first() {
            result["patch_artifact_id"] = Value::String(patch_artifact_id.clone());
        }

        if let Some(err) = run_error {
            return Err(err);
        }
        Ok(ToolEnvelope::success(
            ToolMeta::new(
                run_id.as_str(),
                tool_call.tool_call_id.as_str(),
                &tool_call.evidence_hash,
                request.dry_run,
            ),
            result,
        ))
    }

    /// Runs the approval-gated repair loop.
    ///
    /// Post-gating failures are carried inside the envelope with `ok=false`
    /// so the recorded result stays attached to its evidence.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, and audit failures.
    pub async fn run_repair_loop(
        &self,
        run_id: &RunId,
        request: &CodeRepairLoopRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let started = Instant::now();
        let result = self.run_repair_loop_inner(run_id, request).await;
        toolhub_telemetry::observe_tool_duration(tools::CODE_REPAIR_LOOP, started.elapsed());
        result
    }

    async fn run_repair_loop_inner(
        &self,
        run_id: &RunId,
        request: &CodeRepairLoopRequest,
    ) -> Result<ToolEnvelope, DomainError> {
        let tool_name = tools::CODE_REPAIR_LOOP;
        let run = self.require_run(run_id)?;
        self.policy.check_tool(tool_name).map_err(DomainError::from)?;

        let max_iterations = if request.max_iterations == 0 { 1 } else { request.max_iterations };
        if max_iterations > self.repair_max_iterations {
            return Err(DomainError::Validation(format!(
                "max_iterations cannot exceed {}",
                self.repair_max_iterations
            )));
        }
        self.verify_approval(run_id, &request.approval_id)?;
        self.check_file_paths(&request.files)?;

        let engine = RepairLoopEngine {
            audit: &self.audit,
            forge: self.forge.as_ref(),
            qa: self.qa.as_ref(),
            code: self.code.as_ref(),
        };
        let loop_request = RepairLoopRequest {
            base_branch: request.base_branch.clone(),
            head_branch: request.head_branch.clone(),
            commit_message: request.commit_message.clone(),
            pr_title: request.pr_title.clone(),
            pr_body: request.pr_body.clone(),
            files: request.files.clone(),
            max_iterations,
            dry_run: request.dry_run,
        };
        let outcome = engine.execute(&run, &loop_request).await?;

        let meta = ToolMeta::new(
            run_id.as_str(),
            outcome.tool_call.tool_call_id.as_str(),
            &outcome.tool_call.evidence_hash,
            request.dry_run,
        );
        match outcome.error {
            None => Ok(ToolEnvelope::success(meta, outcome.result)),
            Some(err) => {
                let info = map_error(&err);
                Ok(ToolEnvelope::failure(meta, outcome.result, &info.code, &info.message))
            }
        }
    }

    // ------------------------------------------------------------------
    // Approvals
    // ------------------------------------------------------------------

    /// Creates an approval request for a run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, and audit failures.
    pub fn create_approval(
        &self,
        run_id: &RunId,
        request: &CreateApprovalRequest,
    ) -> Result<ApprovalRecord, DomainError> {
        self.require_run(run_id)?;
        if request.scope.trim().is_empty() {
            return Err(DomainError::Validation("scope is required".to_string()));
        }
        self.policy.check_paths(&request.paths).map_err(DomainError::from)?;
        if self.policy.requires_approval(&request.paths) && request.scope != "path_change" {
            return Err(DomainError::Validation(
                "scope must be path_change for approval-required paths".to_string(),
            ));
        }
        let payload = json!({"payload": request.payload, "paths": request.paths});
        self.audit
            .create_approval(run_id, &request.scope, Some(&payload))
            .map_err(DomainError::from)
    }

    /// Lists approvals for a run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the run is missing or the query fails.
    pub fn list_approvals(&self, run_id: &RunId) -> Result<Vec<ApprovalRecord>, DomainError> {
        self.require_run(run_id)?;
        self.audit.list_approvals(run_id).map_err(DomainError::from)
    }

    /// Loads one approval scoped to a run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ApprovalNotFound`] for missing or foreign-run
    /// approvals.
    pub fn get_approval(
        &self,
        run_id: &RunId,
        approval_id: &ApprovalId,
    ) -> Result<ApprovalRecord, DomainError> {
        self.require_run(run_id)?;
        let approval = self.audit.get_approval(approval_id).map_err(DomainError::from)?;
        match approval {
            Some(approval) if &approval.run_id == run_id => Ok(approval),
            _ => Err(DomainError::ApprovalNotFound),
        }
    }

    /// Resolves an approval to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] for gating, validation, and audit failures.
    pub fn resolve_approval(
        &self,
        run_id: &RunId,
        approval_id: &ApprovalId,
        status: ApprovalStatus,
        request: &ResolveApprovalRequest,
    ) -> Result<ApprovalRecord, DomainError> {
        self.get_approval(run_id, approval_id)?;
        if request.approver.trim().is_empty() {
            return Err(DomainError::Validation("approver is required".to_string()));
        }
        let resolved = self
            .audit
            .resolve_approval(approval_id, run_id, status, &request.approver)
            .map_err(DomainError::from)?;
        resolved.ok_or(DomainError::ApprovalNotFound)
    }

    // ------------------------------------------------------------------
    // Evidence reads
    // ------------------------------------------------------------------

    /// Lists tool calls for a run with filters.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the run is missing or the query fails.
    pub fn list_tool_calls(
        &self,
        run_id: &RunId,
        filter: &ToolCallFilter,
    ) -> Result<Vec<ToolCallRecord>, DomainError> {
        self.require_run(run_id)?;
        self.audit.list_tool_calls(run_id, filter).map_err(DomainError::from)
    }

    /// Lists artifacts for a run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the run is missing or the query fails.
    pub fn list_artifacts(&self, run_id: &RunId) -> Result<Vec<ArtifactRecord>, DomainError> {
        self.require_run(run_id)?;
        self.audit.list_artifacts(run_id).map_err(DomainError::from)
    }

    /// Loads artifact metadata scoped to a run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] labeled `artifact not found`
    /// when absent.
    pub fn get_artifact(
        &self,
        run_id: &RunId,
        artifact_id: &ArtifactId,
    ) -> Result<ArtifactRecord, DomainError> {
        self.require_run(run_id)?;
        self.audit
            .get_artifact_by_run(run_id, artifact_id)
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::Validation("artifact not found".to_string()))
    }

    /// Reads artifact content, capped to the given byte limit.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the artifact or blob is missing.
    pub fn read_artifact_content(
        &self,
        run_id: &RunId,
        artifact_id: &ArtifactId,
        max_bytes: usize,
    ) -> Result<(ArtifactRecord, Vec<u8>), DomainError> {
        let record = self.get_artifact(run_id, artifact_id)?;
        let mut bytes = self.audit.read_artifact_content(&record).map_err(DomainError::from)?;
        bytes.truncate(max_bytes);
        Ok((record, bytes))
    }

    // ------------------------------------------------------------------
    // Gating helpers
    // ------------------------------------------------------------------

    /// Verifies an approved, run-scoped approval before any external call.
    fn verify_approval(&self, run_id: &RunId, approval_id: &str) -> Result<(), DomainError> {
        if approval_id.trim().is_empty() {
            return Err(DomainError::Validation("approval_id is required".to_string()));
        }
        let approval = self
            .audit
            .get_approval(&ApprovalId::new(approval_id))
            .map_err(DomainError::from)?;
        let Some(approval) = approval else {
            return Err(DomainError::ApprovalNotFound);
        };
        if &approval.run_id != run_id {
            return Err(DomainError::ApprovalNotFound);
        }
        if approval.status != ApprovalStatus::Approved {
            return Err(DomainError::ApprovalNotApproved);
        }
        Ok(())
    }

    /// Checks every changed file path against the path policy.
    fn check_file_paths(&self, files: &[FileChange]) -> Result<(), DomainError> {
        let paths: Vec<&str> = files.iter().map(|file| file.path.as_str()).collect();
        self.policy.check_paths(&paths).map_err(DomainError::from)
    }
}

// ============================================================================
// SECTION: Envelope Helpers
// ============================================================================

/// Builds a replayed envelope from a recorded tool call.
fn replayed_envelope(run: &RunRecord, tool_call: &ToolCallRecord, result: Value) -> ToolEnvelope {
    let meta = ToolMeta::new(
        run.run_id.as_str(),
        tool_call.tool_call_id.as_str(),
        &tool_call.evidence_hash,
        false,
    )
    .replayed();
    ToolEnvelope::success(meta, result)
}

/// Extracts a named field from a recorded response payload.
fn response_field(response: &Value, field: &str) -> Value {
    response.get(field).cloned().unwrap_or(Value::Null)
}

/// Joins per-file unified diffs into one patch document.
fn combined_diff(files: &[FileChange]) -> String {
    let patches: Vec<String> = files
        .iter()
        .map(|file| {
            generate_unified_diff(
                &file.path,
                file.original_content.as_deref().unwrap_or_default(),
                &file.modified_content,
            )
        })
        .collect();
    patches.join("\n")
}

