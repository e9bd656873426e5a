// toolhub-codeops/tests/runner.rs
// ============================================================================
// Module: Git Runner Tests
// Description: Validate input validation and dry-run command planning.
// Purpose: Keep branch and path confinement rules exact.
// Dependencies: toolhub-codeops, toolhub-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! Dry runs plan the exact command sequence without touching git, which also
//! makes the validation rules observable without a repository.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use toolhub_codeops::GitRunner;
use toolhub_codeops::GitRunnerConfig;
use toolhub_core::CodeChangeRequest;
use toolhub_core::CodeOpsError;
use toolhub_core::CodeRunner;
use toolhub_core::FileChange;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn runner() -> GitRunner {
    GitRunner::new(GitRunnerConfig::default())
}

fn request(base: &str, head: &str, paths: &[&str]) -> CodeChangeRequest {
    CodeChangeRequest {
        base_branch: base.to_string(),
        head_branch: head.to_string(),
        commit_message: "apply change".to_string(),
        files: paths
            .iter()
            .map(|path| FileChange {
                path: (*path).to_string(),
                original_content: None,
                modified_content: "content".to_string(),
            })
            .collect(),
        dry_run: true,
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[tokio::test]
async fn branch_names_are_validated() {
    let runner = runner();
    for head in ["", "-leading-dash", "a..b", "spaced name", "sem;colon"] {
        let error = runner.execute(&request("main", head, &["src/lib.rs"])).await.unwrap_err();
        assert!(matches!(error, CodeOpsError::InvalidInput(_)), "head {head:?}");
    }
    runner.execute(&request("main", "fix/panic-2024.1", &["src/lib.rs"])).await.unwrap();
}

#[tokio::test]
async fn commit_message_and_files_are_required() {
    let runner = runner();
    let mut missing_message = request("main", "fix", &["src/lib.rs"]);
    missing_message.commit_message = "  ".to_string();
    assert!(matches!(
        runner.execute(&missing_message).await,
        Err(CodeOpsError::InvalidInput(_))
    ));

    let no_files = request("main", "fix", &[]);
    assert!(matches!(runner.execute(&no_files).await, Err(CodeOpsError::InvalidInput(_))));
}

#[tokio::test]
async fn file_paths_are_confined_to_the_work_tree() {
    let runner = runner();
    for path in ["/etc/passwd", "../escape.rs", "a/../../b", "", "."] {
        let error = runner.execute(&request("main", "fix", &[path])).await.unwrap_err();
        assert!(matches!(error, CodeOpsError::InvalidInput(_)), "path {path:?}");
    }
    runner.execute(&request("main", "fix", &["./src/ok.rs", "a/../b.rs"])).await.unwrap();
}

// ============================================================================
// SECTION: Dry-Run Planning
// ============================================================================

#[tokio::test]
async fn dry_run_plans_the_full_sequence() {
    let runner = runner();
    let result = runner.execute(&request("main", "fix/panic", &["src/a.rs", "src/b.rs"])).await.unwrap();
    assert!(result.commit_hash.is_none());

    let plan = result.planned_commands.join("\n");
    assert!(plan.contains("checkout \"main\""));
    assert!(plan.contains("checkout -b \"fix/panic\""));
    assert!(plan.contains("write \"src/a.rs\""));
    assert!(plan.contains("add \"src/b.rs\""));
    assert!(plan.contains("commit -m \"apply change\""));
    assert!(plan.contains("push -u \"origin\" \"fix/panic\""));

    // Two files: checkout x2 + (write + add) x2 + commit + push.
    assert_eq!(result.planned_commands.len(), 8);
}

#[tokio::test]
async fn rollback_dry_run_plans_branch_deletion() {
    let runner = runner();
    let result = runner.rollback("main", "fix/panic", true).await.unwrap();
    let plan = result.planned_commands.join("\n");
    assert!(plan.contains("checkout \"main\""));
    assert!(plan.contains("branch -D \"fix/panic\""));
    assert!(plan.contains("push \"origin\" --delete \"fix/panic\""));
}

#[tokio::test]
async fn rollback_validates_branches() {
    let runner = runner();
    assert!(matches!(
        runner.rollback("main", "bad name", true).await,
        Err(CodeOpsError::InvalidInput(_))
    ));
}
