// toolhub-core/src/runtime/batch.rs
// ============================================================================
// Module: ToolHub Batch Processor
// Description: Per-item audited iteration with strict/partial modes.
// Purpose: Drive N issue creations through the pipeline as one request.
// Dependencies: serde, serde_json, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Batches pre-validate every item before processing anything, so a single
//! invalid item rejects the whole batch atomically. Each item then gets its
//! own derived idempotency key (varied by index), its own replay probe, and
//! its own audited tool call. Strict mode stops at the first collaborator
//! error without rolling back items already created upstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::core::batch::BatchMode;
use crate::core::batch::BatchStatus;
use crate::core::batch::derive_batch_status;
use crate::core::errors::DomainError;
use crate::core::idempotency::MAX_BATCH_SIZE;
use crate::core::idempotency::make_issue_key;
use crate::core::idempotency::validate_issue_input;
use crate::core::records::RunRecord;
use crate::core::tools;
use crate::interfaces::CreateIssueInput;
use crate::interfaces::ForgeClient;
use crate::interfaces::Issue;
use crate::runtime::audit::AuditService;
use crate::runtime::audit::RecordInput;

// ============================================================================
// SECTION: Request and Response
// ============================================================================

/// One issue in a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueInput {
    /// Issue title.
    pub title: String,
    /// Issue body.
    pub body: String,
    /// Issue labels.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Batch creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    /// Ordered issues to create.
    pub issues: Vec<IssueInput>,
    /// Skip the external side effect when set.
    #[serde(default)]
    pub dry_run: bool,
}

/// Per-item outcome, encoded as a discriminated object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchItemResult {
    /// The item was created fresh (or previewed on dry-run).
    Created {
        /// Item index in the request.
        index: usize,
        /// Created issue; absent on dry-run.
        #[serde(skip_serializing_if = "Option::is_none")]
        issue: Option<Issue>,
    },
    /// The item replayed a previously recorded response.
    Replayed {
        /// Item index in the request.
        index: usize,
        /// Recorded issue; absent when the recorded call was a dry run.
        issue: Option<Issue>,
    },
    /// The collaborator rejected the item.
    Failed {
        /// Item index in the request.
        index: usize,
        /// Collaborator error message.
        error: String,
    },
}

/// Aggregate batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Derived aggregate status; never persisted.
    pub status: BatchStatus,
    /// Mode the batch ran under.
    pub mode: BatchMode,
    /// Total items in the request.
    pub total: usize,
    /// Items processed before any strict-mode stop.
    pub processed: usize,
    /// Items that failed.
    pub errors: usize,
    /// Items served from replay.
    pub replayed: usize,
    /// Items processed fresh (processed minus replayed).
    pub created_fresh: usize,
    /// Index of the item that stopped a strict batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<usize>,
    /// Collaborator error that stopped a strict batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    /// Per-item outcomes; truncated to `processed` on strict stops.
    pub results: Vec<BatchItemResult>,
}

// ============================================================================
// SECTION: Processor
// ============================================================================

/// Runs a batch of issue creations through the audited pipeline.
///
/// # Errors
///
/// Returns [`DomainError::Validation`] when pre-validation rejects the
/// batch, and [`DomainError::Internal`] when replay or audit persistence
/// fails. Per-item collaborator errors are reported inside the response.
pub async fn process_issue_batch(
    audit: &AuditService,
    forge: &dyn ForgeClient,
    run: &RunRecord,
    mode: BatchMode,
    request: &BatchRequest,
) -> Result<BatchResponse, DomainError> {
    if request.issues.is_empty() {
        return Err(DomainError::Validation("issues array is empty".to_string()));
    }
    if request.issues.len() > MAX_BATCH_SIZE {
        return Err(DomainError::Validation(format!("issues exceed {MAX_BATCH_SIZE} items")));
    }
    for (index, issue) in request.issues.iter().enumerate() {
        validate_issue_input(&issue.title, &issue.body, &issue.labels)
            .map_err(|err| DomainError::Validation(format!("issue {index}: {err}")))?;
    }

    let tool_name = tools::GITHUB_ISSUES_BATCH_CREATE;
    let total = request.issues.len();
    let mut results: Vec<BatchItemResult> = Vec::with_capacity(total);
    let mut replayed_count = 0usize;
    let mut error_count = 0usize;
    let mut processed = 0usize;

    for (index, item) in request.issues.iter().enumerate() {
        processed = index + 1;
        let key = make_issue_key(
            run.run_id.as_str(),
            tool_name,
            &item.title,
            &item.body,
            &item.labels,
            Some(index),
        )
        .map_err(|err| DomainError::Internal(err.to_string()))?;

        if let Some((_, response)) = audit
            .replay_response(&run.run_id, tool_name, &key)
            .map_err(DomainError::from)?
        {
            let issue = decode_recorded_issue(&response)?;
            results.push(BatchItemResult::Replayed {
                index,
                issue,
            });
            replayed_count += 1;
            continue;
        }

        let mut issue: Option<Issue> = None;
        let mut forge_error: Option<String> = None;
        if !request.dry_run {
            match forge
                .create_issue(
                    &run.repo,
                    CreateIssueInput {
                        title: item.title.clone(),
                        body: item.body.clone(),
                        labels: item.labels.clone(),
                    },
                )
                .await
            {
                Ok(created) => issue = Some(created),
                Err(err) => forge_error = Some(err.to_string()),
            }
        }

        let response = json!({
            "issue": issue,
            "preview": {
                "repo": run.repo,
                "title": item.title,
                "body": item.body,
                "labels": item.labels,
            },
        });
        let record = RecordInput::new(
            &run.run_id,
            tool_name,
            serde_json::to_value(item).map_err(|err| DomainError::Internal(err.to_string()))?,
            response,
        )
        .with_key(&key)
        .with_error(forge_error.clone());
        audit.record(record).map_err(DomainError::from)?;

        match forge_error {
            None => results.push(BatchItemResult::Created {
                index,
                issue,
            }),
            Some(reason) => {
                results.push(BatchItemResult::Failed {
                    index,
                    error: reason.clone(),
                });
                error_count += 1;
                if mode == BatchMode::Strict {
                    // A strict batch that stopped is a failed batch, whatever
                    // the per-item counters would derive.
                    return Ok(BatchResponse {
                        status: BatchStatus::Fail,
                        mode,
                        total,
                        processed,
                        errors: error_count,
                        replayed: replayed_count,
                        created_fresh: processed - replayed_count,
                        stopped_at: Some(index),
                        failed_reason: Some(reason),
                        results,
                    });
                }
            }
        }
    }

    Ok(BatchResponse {
        status: derive_batch_status(total, replayed_count, error_count),
        mode,
        total,
        processed,
        errors: error_count,
        replayed: replayed_count,
        created_fresh: total - replayed_count,
        stopped_at: None,
        failed_reason: None,
        results,
    })
}

/// Extracts the recorded issue from a replayed batch response payload.
fn decode_recorded_issue(response: &serde_json::Value) -> Result<Option<Issue>, DomainError> {
    let issue = response.get("issue").cloned().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(issue)
        .map_err(|err| DomainError::Internal(format!("decode replay response: {err}")))
}
