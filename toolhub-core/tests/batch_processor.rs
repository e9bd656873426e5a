// toolhub-core/tests/batch_processor.rs
// ============================================================================
// Module: Batch Processor Tests
// Description: Validate per-item audit, replay, and strict/partial modes.
// Purpose: Keep batch semantics exact under collaborator failures.
// Dependencies: toolhub-core, async-trait, tempfile, tokio
// ============================================================================

//! ## Overview
//! Batches reject atomically on invalid items, audit every processed item,
//! count replays separately from fresh creations, and stop at the first
//! error in strict mode without rolling back prior items.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;

use toolhub_core::BatchItemResult;
use toolhub_core::BatchStatus;
use toolhub_core::DomainError;
use toolhub_core::IssueInput;
use toolhub_core::ToolCallFilter;
use toolhub_core::batch::BatchMode;
use toolhub_core::process_issue_batch;
use toolhub_core::runtime::batch::BatchRequest;

use common::StubForge;
use common::fixture;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn issues(count: usize) -> Vec<IssueInput> {
    (0..count)
        .map(|index| IssueInput {
            title: format!("issue {index}"),
            body: "body".to_string(),
            labels: vec!["batch".to_string()],
        })
        .collect()
}

fn failing_forge(indices: &[usize]) -> StubForge {
    StubForge {
        fail_issue_calls: indices.iter().copied().collect::<BTreeSet<_>>(),
        ..StubForge::default()
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[tokio::test]
async fn empty_and_oversized_batches_are_rejected() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = StubForge::default();

    let empty = BatchRequest {
        issues: Vec::new(),
        dry_run: false,
    };
    let error = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &empty)
        .await
        .unwrap_err();
    assert!(matches!(error, DomainError::Validation(_)));

    let oversized = BatchRequest {
        issues: issues(51),
        dry_run: false,
    };
    let error = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &oversized)
        .await
        .unwrap_err();
    assert!(matches!(error, DomainError::Validation(_)));
}

#[tokio::test]
async fn one_invalid_item_rejects_the_whole_batch() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = StubForge::default();
    let mut request = BatchRequest {
        issues: issues(3),
        dry_run: false,
    };
    request.issues[1].title = "  ".to_string();

    let error = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &request)
        .await
        .unwrap_err();
    let DomainError::Validation(message) = error else {
        panic!("expected validation error");
    };
    assert!(message.starts_with("issue 1:"));
    // Atomic rejection: nothing was invoked or recorded.
    assert_eq!(forge.issue_calls.load(Ordering::SeqCst), 0);
    assert!(fx.audit.list_tool_calls(&run.run_id, &ToolCallFilter::default()).unwrap().is_empty());
}

// ============================================================================
// SECTION: Partial Mode
// ============================================================================

#[tokio::test]
async fn partial_mode_reports_per_item_outcomes() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = failing_forge(&[1]);
    let request = BatchRequest {
        issues: issues(3),
        dry_run: false,
    };

    let response = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &request)
        .await
        .unwrap();
    assert_eq!(response.status, BatchStatus::Partial);
    assert_eq!(response.total, 3);
    assert_eq!(response.processed, 3);
    assert_eq!(response.errors, 1);
    assert_eq!(response.replayed, 0);
    assert_eq!(response.created_fresh, 3);
    assert!(response.stopped_at.is_none());
    assert!(matches!(response.results[0], BatchItemResult::Created { .. }));
    assert!(matches!(
        response.results[1],
        BatchItemResult::Failed {
            index: 1,
            ..
        }
    ));
    assert!(matches!(response.results[2], BatchItemResult::Created { .. }));

    // Every processed item has a tool call, failed included.
    let calls = fx.audit.list_tool_calls(&run.run_id, &ToolCallFilter::default()).unwrap();
    assert_eq!(calls.len(), 3);
}

#[tokio::test]
async fn all_fresh_failures_derive_fail() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = failing_forge(&[0, 1, 2]);
    let request = BatchRequest {
        issues: issues(3),
        dry_run: false,
    };
    let response = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &request)
        .await
        .unwrap();
    assert_eq!(response.status, BatchStatus::Fail);
    assert_eq!(response.errors, 3);
}

// ============================================================================
// SECTION: Strict Mode
// ============================================================================

#[tokio::test]
async fn strict_mode_stops_at_first_error() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = failing_forge(&[1]);
    let request = BatchRequest {
        issues: issues(3),
        dry_run: false,
    };

    let response = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Strict, &request)
        .await
        .unwrap();
    assert_eq!(response.status, BatchStatus::Fail);
    assert_eq!(response.processed, 2);
    assert_eq!(response.stopped_at, Some(1));
    assert!(response.failed_reason.is_some());
    assert_eq!(response.results.len(), 2);
    assert!(matches!(response.results[0], BatchItemResult::Created { .. }));
    assert!(matches!(response.results[1], BatchItemResult::Failed { .. }));

    // No tool call rows exist for indices beyond the stop point.
    let calls = fx.audit.list_tool_calls(&run.run_id, &ToolCallFilter::default()).unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(forge.issue_calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// SECTION: Replay
// ============================================================================

#[tokio::test]
async fn repeated_batches_replay_instead_of_recreating() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = StubForge::default();
    let request = BatchRequest {
        issues: issues(2),
        dry_run: false,
    };

    let first = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &request)
        .await
        .unwrap();
    assert_eq!(first.replayed, 0);
    assert_eq!(first.created_fresh, 2);

    let second = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &request)
        .await
        .unwrap();
    assert_eq!(second.status, BatchStatus::Ok);
    assert_eq!(second.replayed, 2);
    assert_eq!(second.created_fresh, 0);
    assert!(second.results.iter().all(|item| matches!(item, BatchItemResult::Replayed { .. })));

    // The collaborator ran only for the first batch.
    assert_eq!(forge.issue_calls.load(Ordering::SeqCst), 2);

    // Replayed items return the recorded issues.
    let BatchItemResult::Replayed {
        issue, ..
    } = &second.results[0]
    else {
        panic!("expected replayed item");
    };
    assert_eq!(issue.as_ref().unwrap().number, 100);
}

#[tokio::test]
async fn identical_items_get_distinct_keys_by_index() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = StubForge::default();
    let request = BatchRequest {
        issues: vec![
            IssueInput {
                title: "same".to_string(),
                body: "same".to_string(),
                labels: Vec::new(),
            };
            2
        ],
        dry_run: false,
    };
    let response = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &request)
        .await
        .unwrap();
    assert_eq!(response.created_fresh, 2);
    assert_eq!(forge.issue_calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// SECTION: Dry Run
// ============================================================================

#[tokio::test]
async fn dry_run_audits_without_invoking_the_forge() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "batch").unwrap();
    let forge = StubForge::default();
    let request = BatchRequest {
        issues: issues(2),
        dry_run: true,
    };
    let response = process_issue_batch(&fx.audit, &forge, &run, BatchMode::Partial, &request)
        .await
        .unwrap();
    assert_eq!(response.status, BatchStatus::Ok);
    assert_eq!(forge.issue_calls.load(Ordering::SeqCst), 0);
    let calls = fx.audit.list_tool_calls(&run.run_id, &ToolCallFilter::default()).unwrap();
    assert_eq!(calls.len(), 2);
}
