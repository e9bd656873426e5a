// toolhub-core/tests/repair_loop.rs
// ============================================================================
// Module: Repair Loop Tests
// Description: Validate the bounded QA retry loop with rollback.
// Purpose: Keep iteration bounds, rollback, and the timeline exact.
// Dependencies: toolhub-core, async-trait, tempfile, tokio
// ============================================================================

//! ## Overview
//! The loop runs at most `max_iterations` QA pairs, rolls back on exhausted
//! failures, opens a PR on success, and leaves a step with a decision per
//! iteration plus start and completion markers.

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

use std::sync::atomic::Ordering;

use toolhub_core::AuditStore;
use toolhub_core::CallStatus;
use toolhub_core::FileChange;
use toolhub_core::RepairLoopEngine;
use toolhub_core::RepairLoopRequest;
use toolhub_core::StepStatus;
use toolhub_core::ToolCallFilter;

use common::ScriptedQa;
use common::StubCode;
use common::StubForge;
use common::StubQa;
use common::fixture;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn loop_request(max_iterations: u32, dry_run: bool) -> RepairLoopRequest {
    RepairLoopRequest {
        base_branch: "main".to_string(),
        head_branch: "fix/panic".to_string(),
        commit_message: "fix panic".to_string(),
        pr_title: "Fix panic".to_string(),
        pr_body: "details".to_string(),
        files: vec![FileChange {
            path: "src/lib.rs".to_string(),
            original_content: Some("old".to_string()),
            modified_content: "new".to_string(),
        }],
        max_iterations,
        dry_run,
    }
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[tokio::test]
async fn qa_pass_on_second_iteration_opens_a_pr() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "repair").unwrap();
    let forge = StubForge::default();
    // Iteration 1: test fails, lint passes. Iteration 2: both pass.
    let qa = StubQa::new(vec![
        ScriptedQa::Fail,
        ScriptedQa::Pass,
        ScriptedQa::Pass,
        ScriptedQa::Pass,
    ]);
    let code = StubCode::default();
    let engine = RepairLoopEngine {
        audit: &fx.audit,
        forge: &forge,
        qa: &qa,
        code: &code,
    };

    let outcome = engine.execute(&run, &loop_request(3, false)).await.unwrap();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.result["status"], "completed");
    assert_eq!(outcome.result["qa_passed"], true);
    assert_eq!(outcome.result["iterations_run"], 2);
    assert!(outcome.result["pull_request"].is_object());
    assert_eq!(outcome.tool_call.status, CallStatus::Ok);
    assert_eq!(forge.pr_calls.load(Ordering::SeqCst), 1);
    assert_eq!(code.rollback_calls.load(Ordering::SeqCst), 0);

    // One completed step; decisions cover start, both iterations, completion.
    let steps = fx.store.list_steps_by_run(&run.run_id).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Completed);
    let decisions = fx.store.list_decisions_by_run(&run.run_id).unwrap();
    let kinds: Vec<&str> = decisions.iter().map(|d| d.decision_type.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "repair_loop_started",
            "repair_loop_iteration",
            "repair_loop_iteration",
            "repair_loop_completed",
        ]
    );
}

// ============================================================================
// SECTION: Rollback
// ============================================================================

#[tokio::test]
async fn exhausted_qa_failures_roll_back() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "repair").unwrap();
    let forge = StubForge::default();
    let qa = StubQa::new(vec![ScriptedQa::Fail]);
    let code = StubCode::default();
    let engine = RepairLoopEngine {
        audit: &fx.audit,
        forge: &forge,
        qa: &qa,
        code: &code,
    };

    let outcome = engine.execute(&run, &loop_request(2, false)).await.unwrap();
    assert!(outcome.error.is_some());
    assert_eq!(outcome.result["status"], "failed");
    assert_eq!(outcome.result["qa_passed"], false);
    assert_eq!(outcome.result["iterations_run"], 2);
    assert!(outcome.result["rollback_planned_commands"].is_array());
    assert_eq!(outcome.tool_call.status, CallStatus::Fail);
    assert_eq!(code.rollback_calls.load(Ordering::SeqCst), 1);
    assert_eq!(forge.pr_calls.load(Ordering::SeqCst), 0);

    let steps = fx.store.list_steps_by_run(&run.run_id).unwrap();
    assert_eq!(steps[0].status, StepStatus::Failed);
    let decisions = fx.store.list_decisions_by_run(&run.run_id).unwrap();
    assert_eq!(decisions.last().unwrap().decision_type, "repair_loop_failed");
}

#[tokio::test]
async fn test_timeout_is_categorized() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "repair").unwrap();
    let forge = StubForge::default();
    // Test times out, lint passes, every iteration.
    let qa = StubQa::new(vec![ScriptedQa::Timeout, ScriptedQa::Pass]);
    let code = StubCode::default();
    let engine = RepairLoopEngine {
        audit: &fx.audit,
        forge: &forge,
        qa: &qa,
        code: &code,
    };
    let outcome = engine.execute(&run, &loop_request(1, false)).await.unwrap();
    assert_eq!(outcome.result["qa_failure_category"], "qa_timeout");
}

// ============================================================================
// SECTION: Bounds
// ============================================================================

#[tokio::test]
async fn qa_sub_calls_never_exceed_twice_the_iteration_cap() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "repair").unwrap();
    let forge = StubForge::default();
    let qa = StubQa::new(vec![ScriptedQa::Fail]);
    let code = StubCode::default();
    let engine = RepairLoopEngine {
        audit: &fx.audit,
        forge: &forge,
        qa: &qa,
        code: &code,
    };
    let max_iterations = 3;
    engine.execute(&run, &loop_request(max_iterations, false)).await.unwrap();
    assert!(qa.calls.load(Ordering::SeqCst) <= 2 * max_iterations as usize);
}

// ============================================================================
// SECTION: Dry Run
// ============================================================================

#[tokio::test]
async fn dry_run_plans_without_qa_or_pr() {
    let fx = fixture();
    let run = fx.runs.create_run("octo/demo", "repair").unwrap();
    let forge = StubForge::default();
    let qa = StubQa::passing();
    let code = StubCode::default();
    let engine = RepairLoopEngine {
        audit: &fx.audit,
        forge: &forge,
        qa: &qa,
        code: &code,
    };

    let outcome = engine.execute(&run, &loop_request(2, true)).await.unwrap();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.result["status"], "dry_run");
    assert_eq!(outcome.result["iterations_run"], 0);
    assert_eq!(qa.calls.load(Ordering::SeqCst), 0);
    assert_eq!(forge.pr_calls.load(Ordering::SeqCst), 0);

    // The dry run still left a tool call behind.
    let calls = fx.audit.list_tool_calls(&run.run_id, &ToolCallFilter::default()).unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status, CallStatus::Ok);
}
