// toolhub-server/tests/http_api.rs
// ============================================================================
// Module: HTTP API Tests
// Description: Drive the request/reply transport end to end.
// Purpose: Validate routes, headers, and envelope parity over HTTP.
// Dependencies: toolhub-server, toolhub-core, reqwest, tempfile, tokio
// ============================================================================

//! ## Overview
//! Binds the router on an ephemeral port and drives it with a real HTTP
//! client: health and version, run creation, idempotent issue creation with
//! replay headers, client-key conflicts, batch modes, unknown-field
//! rejection, and the request-id header.

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

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use toolhub_core::batch::BatchMode;
use toolhub_server::NoopLogSink;
use toolhub_server::build_router;

use common::Fixture;
use common::StubForge;
use common::StubQa;
use common::build_info;
use common::fixture;
use common::fixture_with;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Running server plus the client pointed at it.
struct Harness {
    /// Base URL of the bound server.
    base_url: String,
    /// HTTP client.
    client: reqwest::Client,
    /// Dispatcher fixture backing the server.
    fx: Fixture,
}

/// Binds the router on an ephemeral port.
async fn serve(fx: Fixture) -> Harness {
    let router = build_router(Arc::clone(&fx.dispatcher), build_info(), Arc::new(NoopLogSink));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Harness {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        fx,
    }
}

impl Harness {
    /// Creates a run and returns its identifier.
    async fn create_run(&self) -> String {
        let response = self
            .client
            .post(format!("{}/api/v1/runs", self.base_url))
            .json(&json!({"repo": "octo/demo", "purpose": "t"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        let run: Value = response.json().await.unwrap();
        run["run_id"].as_str().unwrap().to_string()
    }
}

// ============================================================================
// SECTION: Health and Version
// ============================================================================

#[tokio::test]
async fn healthz_version_and_metrics_respond() {
    let harness = serve(fixture(BatchMode::Partial)).await;

    let health = harness
        .client
        .get(format!("{}/healthz", harness.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);
    assert!(health.headers().contains_key("x-request-id"));
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let version = harness
        .client
        .get(format!("{}/version", harness.base_url))
        .send()
        .await
        .unwrap();
    let body: Value = version.json().await.unwrap();
    assert_eq!(body["contract_version"], "v1");
    assert_eq!(body["git_commit"], "deadbeef");

    let metrics = harness
        .client
        .get(format!("{}/metrics", harness.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(metrics.status(), 200);
    let text = metrics.text().await.unwrap();
    assert!(text.contains("# TYPE toolhub_tool_calls_total counter"));
}

// ============================================================================
// SECTION: Runs
// ============================================================================

#[tokio::test]
async fn run_lifecycle_over_http() {
    let harness = serve(fixture(BatchMode::Partial)).await;
    let run_id = harness.create_run().await;

    let fetched = harness
        .client
        .get(format!("{}/api/v1/runs/{run_id}", harness.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(fetched.status(), 200);
    let run: Value = fetched.json().await.unwrap();
    assert_eq!(run["repo"], "octo/demo");

    let missing = harness
        .client
        .get(format!("{}/api/v1/runs/unknown", harness.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["code"], "run_not_found");
}

#[tokio::test]
async fn forbidden_repos_are_rejected_with_stable_codes() {
    let harness = serve(fixture(BatchMode::Partial)).await;
    let response = harness
        .client
        .post(format!("{}/api/v1/runs", harness.base_url))
        .json(&json!({"repo": "octo/else", "purpose": "t"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "repo_not_allowed");
}

#[tokio::test]
async fn unknown_json_fields_are_rejected() {
    let harness = serve(fixture(BatchMode::Partial)).await;
    let response = harness
        .client
        .post(format!("{}/api/v1/runs", harness.base_url))
        .json(&json!({"repo": "octo/demo", "purpose": "t", "extra": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request_schema");
}

// ============================================================================
// SECTION: Idempotent Issues
// ============================================================================

#[tokio::test]
async fn issue_creation_replays_with_header_marker() {
    let harness = serve(fixture(BatchMode::Partial)).await;
    let run_id = harness.create_run().await;
    let issue_url = format!("{}/api/v1/runs/{run_id}/issues", harness.base_url);
    let payload = json!({"title": "t", "body": "b", "labels": ["a"]});

    let first = harness.client.post(&issue_url).json(&payload).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert!(!first.headers().contains_key("idempotency-replayed"));
    let first_body: Value = first.json().await.unwrap();
    assert_eq!(first_body["ok"], true);
    assert!(first_body["meta"].get("replayed").is_none());
    let number = first_body["result"]["number"].as_u64().unwrap();
    assert!(first_body["result"]["html_url"].is_string());

    let second = harness.client.post(&issue_url).json(&payload).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers().get("idempotency-replayed").unwrap(), "true");
    let second_body: Value = second.json().await.unwrap();
    assert_eq!(second_body["meta"]["replayed"], true);
    assert_eq!(second_body["result"]["number"].as_u64().unwrap(), number);
}

#[tokio::test]
async fn client_keys_conflict_with_409() {
    let harness = serve(fixture(BatchMode::Partial)).await;
    let run_id = harness.create_run().await;
    let issue_url = format!("{}/api/v1/runs/{run_id}/issues", harness.base_url);

    let first = harness
        .client
        .post(&issue_url)
        .header("Idempotency-Key", "k1")
        .json(&json!({"title": "A", "body": "b"}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = harness
        .client
        .post(&issue_url)
        .header("Idempotency-Key", "k1")
        .json(&json!({"title": "B", "body": "b"}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["code"], "idempotency_key_conflict");
}

// ============================================================================
// SECTION: Batches
// ============================================================================

#[tokio::test]
async fn partial_batches_report_per_item_outcomes() {
    let harness = serve(fixture_with(
        BatchMode::Partial,
        StubForge::failing(&[1]),
        StubQa::passing(),
    ))
    .await;
    let run_id = harness.create_run().await;

    let response = harness
        .client
        .post(format!("{}/api/v1/runs/{run_id}/issues/batch", harness.base_url))
        .json(&json!({
            "dry_run": false,
            "issues": [
                {"title": "a", "body": "b"},
                {"title": "c", "body": "d"},
                {"title": "e", "body": "f"},
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["meta"]["tool_call_id"], "");
    assert_eq!(body["meta"]["evidence_hash"], "");
    let result = &body["result"];
    assert_eq!(result["status"], "partial");
    assert_eq!(result["total"], 3);
    assert_eq!(result["processed"], 3);
    assert_eq!(result["errors"], 1);
    assert!(result["results"][1]["error"].is_string());
}

#[tokio::test]
async fn strict_batches_stop_at_the_first_error() {
    let harness = serve(fixture_with(
        BatchMode::Strict,
        StubForge::failing(&[1]),
        StubQa::passing(),
    ))
    .await;
    let run_id = harness.create_run().await;

    let response = harness
        .client
        .post(format!("{}/api/v1/runs/{run_id}/issues/batch", harness.base_url))
        .json(&json!({
            "dry_run": false,
            "issues": [
                {"title": "a", "body": "b"},
                {"title": "c", "body": "d"},
                {"title": "e", "body": "f"},
            ],
        }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let result = &body["result"];
    assert_eq!(result["status"], "fail");
    assert_eq!(result["stopped_at"], 1);
    assert_eq!(result["processed"], 2);
    assert_eq!(result["results"].as_array().unwrap().len(), 2);
    assert!(result["failed_reason"].is_string());

    // No evidence exists for items beyond the stop point.
    let calls = harness
        .client
        .get(format!("{}/api/v1/runs/{run_id}/tool-calls", harness.base_url))
        .send()
        .await
        .unwrap();
    let calls: Value = calls.json().await.unwrap();
    assert_eq!(calls.as_array().unwrap().len(), 2);
}

// ============================================================================
// SECTION: Evidence Reads
// ============================================================================

#[tokio::test]
async fn tool_calls_support_filters_and_artifacts_stream_content() {
    let harness = serve(fixture(BatchMode::Partial)).await;
    let run_id = harness.create_run().await;
    let issue_url = format!("{}/api/v1/runs/{run_id}/issues", harness.base_url);
    harness
        .client
        .post(&issue_url)
        .json(&json!({"title": "t", "body": "b"}))
        .send()
        .await
        .unwrap();

    let filtered = harness
        .client
        .get(format!(
            "{}/api/v1/runs/{run_id}/tool-calls?status=ok&tool_name=github.issues.create",
            harness.base_url
        ))
        .send()
        .await
        .unwrap();
    let filtered: Value = filtered.json().await.unwrap();
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let artifacts = harness
        .client
        .get(format!("{}/api/v1/runs/{run_id}/artifacts", harness.base_url))
        .send()
        .await
        .unwrap();
    let artifacts: Value = artifacts.json().await.unwrap();
    let first = &artifacts.as_array().unwrap()[0];
    let artifact_id = first["artifact_id"].as_str().unwrap();

    let metadata = harness
        .client
        .get(format!("{}/api/v1/runs/{run_id}/artifacts/{artifact_id}", harness.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(metadata.status(), 200);

    let content = harness
        .client
        .get(format!(
            "{}/api/v1/runs/{run_id}/artifacts/{artifact_id}/content",
            harness.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(content.status(), 200);
    let request_artifact: Value = content.json().await.unwrap();
    assert_eq!(request_artifact["title"], "t");
}

// ============================================================================
// SECTION: Approvals over HTTP
// ============================================================================

#[tokio::test]
async fn approval_routes_cover_the_lifecycle() {
    let harness = serve(fixture(BatchMode::Partial)).await;
    let run_id = harness.create_run().await;
    let approvals_url = format!("{}/api/v1/runs/{run_id}/approvals", harness.base_url);

    let created = harness
        .client
        .post(&approvals_url)
        .json(&json!({"scope": "path_change", "paths": ["src/lib.rs"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let approval: Value = created.json().await.unwrap();
    let approval_id = approval["approval_id"].as_str().unwrap();
    assert_eq!(approval["status"], "requested");

    let approved = harness
        .client
        .post(format!("{approvals_url}/{approval_id}/approve"))
        .json(&json!({"approver": "alice"}))
        .send()
        .await
        .unwrap();
    assert_eq!(approved.status(), 200);
    let approved: Value = approved.json().await.unwrap();
    assert_eq!(approved["status"], "approved");

    let listed = harness.client.get(&approvals_url).send().await.unwrap();
    let listed: Value = listed.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}
