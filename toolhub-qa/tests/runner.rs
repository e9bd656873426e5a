// toolhub-qa/tests/runner.rs
// ============================================================================
// Module: QA Runner Tests
// Description: Validate command admission, execution, and capping.
// Purpose: Keep the QA contract exact for statuses and error codes.
// Dependencies: toolhub-qa, toolhub-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! Admission tests cover the metacharacter ban, the executable allowlist,
//! and quoting; execution tests run real short-lived processes to cover
//! pass, fail, timeout, dry-run, and the concurrency cap.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use toolhub_core::QaErrorCode;
use toolhub_core::QaExecutor;
use toolhub_core::QaKind;
use toolhub_core::QaStatus;
use toolhub_core::derive_qa_status;
use toolhub_qa::QaBackend;
use toolhub_qa::QaRunner;
use toolhub_qa::QaRunnerConfig;
use toolhub_qa::split_command_line;
use toolhub_qa::truncate_output;
use toolhub_qa::validate_command_line;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn runner_config(test_cmd: &str, lint_cmd: &str, allowed: &[&str]) -> QaRunnerConfig {
    QaRunnerConfig {
        test_cmd: test_cmd.to_string(),
        lint_cmd: lint_cmd.to_string(),
        allowed_executables: allowed.iter().map(|exe| (*exe).to_string()).collect(),
        timeout: Duration::from_secs(5),
        ..QaRunnerConfig::default()
    }
}

// ============================================================================
// SECTION: Command Validation
// ============================================================================

#[test]
fn shell_operators_are_rejected() {
    for cmd in ["echo a && echo b", "echo a | cat", "echo $(id)", "echo `id`", "echo a; echo b"] {
        let error = validate_command_line(cmd).unwrap_err();
        assert_eq!(error.code, QaErrorCode::CommandInvalid, "cmd {cmd}");
    }
}

#[test]
fn empty_commands_are_rejected() {
    let error = validate_command_line("   ").unwrap_err();
    assert_eq!(error.code, QaErrorCode::CommandEmpty);
}

#[test]
fn split_honors_quotes_and_escapes() {
    assert_eq!(
        split_command_line("cargo test --package 'my pkg'").unwrap(),
        vec!["cargo", "test", "--package", "my pkg"]
    );
    assert_eq!(split_command_line("echo a\\ b").unwrap(), vec!["echo", "a b"]);
    assert_eq!(
        split_command_line("pytest -k \"name with space\"").unwrap(),
        vec!["pytest", "-k", "name with space"]
    );
    assert!(split_command_line("echo 'unterminated").is_err());
    assert!(split_command_line("echo trailing\\").is_err());
}

#[test]
fn construction_rejects_disallowed_executables() {
    let error = QaRunner::new(runner_config("rm -rf target", "echo ok", &["echo"])).unwrap_err();
    assert_eq!(error.code, QaErrorCode::CommandNotAllowed);
}

#[test]
fn backend_names_parse() {
    assert_eq!(QaBackend::parse("").unwrap(), QaBackend::Local);
    assert_eq!(QaBackend::parse("local").unwrap(), QaBackend::Local);
    assert_eq!(QaBackend::parse("sandbox").unwrap(), QaBackend::Sandbox);
    assert_eq!(QaBackend::parse("vm").unwrap_err().code, QaErrorCode::BackendInvalid);
}

// ============================================================================
// SECTION: Output Capping
// ============================================================================

#[test]
fn truncate_appends_notice_within_cap() {
    let (text, truncated) = truncate_output("short", 1024);
    assert_eq!(text, "short");
    assert!(!truncated);

    let long = "x".repeat(100);
    let (capped, truncated) = truncate_output(&long, 50);
    assert!(truncated);
    assert!(capped.len() <= 50);
    assert!(capped.ends_with("[output truncated]"));
}

#[test]
fn tiny_caps_still_truncate() {
    let (capped, truncated) = truncate_output("0123456789", 4);
    assert!(truncated);
    assert!(capped.len() <= 4);
}

// ============================================================================
// SECTION: Execution
// ============================================================================

#[tokio::test]
async fn passing_command_yields_pass_with_output() {
    let runner = QaRunner::new(runner_config("echo hello", "echo ok", &["echo"])).unwrap();
    let outcome = runner.run(QaKind::Test, false).await.unwrap();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.report.exit_code, 0);
    assert!(outcome.report.stdout.contains("hello"));
    assert_eq!(derive_qa_status(&outcome.report, outcome.error.as_ref(), false), QaStatus::Pass);
}

#[tokio::test]
async fn failing_command_yields_fail_with_exit_code() {
    let runner = QaRunner::new(runner_config("false", "echo ok", &["echo", "false"])).unwrap();
    let outcome = runner.run(QaKind::Test, false).await.unwrap();
    let error = outcome.error.clone().unwrap();
    assert_eq!(error.code, QaErrorCode::ExecutionFailed);
    assert_eq!(outcome.report.exit_code, 1);
    assert_eq!(derive_qa_status(&outcome.report, outcome.error.as_ref(), false), QaStatus::Fail);
}

#[tokio::test]
async fn timeout_is_reported_distinctly() {
    let config = QaRunnerConfig {
        timeout: Duration::from_millis(100),
        ..runner_config("sleep 5", "echo ok", &["echo", "sleep"])
    };
    let runner = QaRunner::new(config).unwrap();
    let outcome = runner.run(QaKind::Test, false).await.unwrap();
    let error = outcome.error.clone().unwrap();
    assert_eq!(error.code, QaErrorCode::Timeout);
    assert_eq!(outcome.report.exit_code, -1);
    assert_eq!(
        derive_qa_status(&outcome.report, outcome.error.as_ref(), false),
        QaStatus::Timeout
    );
}

#[tokio::test]
async fn dry_run_plans_without_executing() {
    let runner = QaRunner::new(runner_config("echo hello", "echo ok", &["echo"])).unwrap();
    let outcome = runner.run(QaKind::Lint, true).await.unwrap();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.report.command, "echo ok");
    assert_eq!(outcome.report.exit_code, 0);
    assert!(outcome.report.stdout.is_empty());
    assert_eq!(
        derive_qa_status(&outcome.report, outcome.error.as_ref(), true),
        QaStatus::DryRun
    );
}

#[tokio::test]
async fn concurrency_cap_rejects_excess_requests() {
    let config = QaRunnerConfig {
        max_concurrency: 1,
        ..runner_config("sleep 2", "echo ok", &["echo", "sleep"])
    };
    let runner = std::sync::Arc::new(QaRunner::new(config).unwrap());

    let busy = std::sync::Arc::clone(&runner);
    let handle = tokio::spawn(async move { busy.run(QaKind::Test, false).await });
    // Give the first command time to occupy the only slot.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let error = runner.run(QaKind::Lint, false).await.unwrap_err();
    assert_eq!(error.code, QaErrorCode::ConcurrencyExceeded);
    handle.await.unwrap().unwrap();
}
