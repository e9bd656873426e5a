// toolhub-server/src/http.rs
// ============================================================================
// Module: ToolHub HTTP API
// Description: Request/reply transport over axum.
// Purpose: Expose every dispatcher operation with stable routes and codes.
// Dependencies: toolhub-core, toolhub-telemetry, axum, serde_json, uuid
// ============================================================================

//! ## Overview
//! The HTTP transport enforces a 1 MiB body cap, rejects unknown JSON
//! fields, attaches a generated `X-Request-ID` to every response, and emits
//! one structured access-log line per request. The optional
//! `Idempotency-Key` header overrides derived keys and engages the
//! request-equality replay path; replayed responses carry
//! `Idempotency-Replayed: true`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::HeaderName;
use axum::http::header::HeaderValue;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use toolhub_core::ApprovalId;
use toolhub_core::ApprovalStatus;
use toolhub_core::ArtifactId;
use toolhub_core::BatchRequest;
use toolhub_core::CONTRACT_VERSION;
use toolhub_core::CallStatus;
use toolhub_core::DomainError;
use toolhub_core::QaKind;
use toolhub_core::RunId;
use toolhub_core::ToolCallFilter;
use toolhub_core::ToolEnvelope;
use toolhub_core::map_error;
use uuid::Uuid;

use crate::dispatcher::BuildInfo;
use crate::dispatcher::CodeBranchPrRequest;
use crate::dispatcher::CodePatchRequest;
use crate::dispatcher::CodeRepairLoopRequest;
use crate::dispatcher::CreateApprovalRequest;
use crate::dispatcher::CreateIssueRequest;
use crate::dispatcher::CreateRunRequest;
use crate::dispatcher::PrCommentRequest;
use crate::dispatcher::QaRequest;
use crate::dispatcher::ResolveApprovalRequest;
use crate::dispatcher::ToolDispatcher;
use crate::logging::RequestLogEvent;
use crate::logging::RequestLogSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted request body size.
const MAX_REQUEST_BODY_BYTES: usize = 1 << 20;
/// Maximum streamed artifact content size.
const MAX_ARTIFACT_CONTENT_BYTES: usize = 10 * 1024 * 1024;
/// Request id response header.
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
/// Replay marker response header.
const REPLAYED_HEADER: HeaderName = HeaderName::from_static("idempotency-replayed");
/// Client idempotency key request header.
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// ============================================================================
// SECTION: State and Router
// ============================================================================

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct AppState {
    /// Tool dispatcher.
    dispatcher: Arc<ToolDispatcher>,
    /// Build metadata for `/version`.
    build: BuildInfo,
    /// Access log sink.
    log: Arc<dyn RequestLogSink>,
}

/// Builds the full API router.
#[must_use]
pub fn build_router(
    dispatcher: Arc<ToolDispatcher>,
    build: BuildInfo,
    log: Arc<dyn RequestLogSink>,
) -> Router {
    let state = AppState {
        dispatcher,
        build,
        log,
    };
    Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/metrics", get(handle_metrics))
        .route("/version", get(handle_version))
        .route("/api/v1/runs", post(handle_create_run).get(handle_list_runs))
        .route("/api/v1/runs/{run_id}", get(handle_get_run))
        .route("/api/v1/runs/{run_id}/approvals", post(handle_create_approval).get(handle_list_approvals))
        .route("/api/v1/runs/{run_id}/approvals/{approval_id}", get(handle_get_approval))
        .route("/api/v1/runs/{run_id}/approvals/{approval_id}/approve", post(handle_approve_approval))
        .route("/api/v1/runs/{run_id}/approvals/{approval_id}/reject", post(handle_reject_approval))
        .route("/api/v1/runs/{run_id}/issues", post(handle_create_issue))
        .route("/api/v1/runs/{run_id}/issues/batch", post(handle_batch_create_issues))
        .route("/api/v1/runs/{run_id}/prs/{pr_number}", get(handle_get_pr))
        .route("/api/v1/runs/{run_id}/prs/{pr_number}/files", get(handle_list_pr_files))
        .route("/api/v1/runs/{run_id}/prs/{pr_number}/comment", post(handle_create_pr_comment))
        .route("/api/v1/runs/{run_id}/qa/test", post(handle_qa_test))
        .route("/api/v1/runs/{run_id}/qa/lint", post(handle_qa_lint))
        .route("/api/v1/runs/{run_id}/code/patch", post(handle_generate_patch))
        .route("/api/v1/runs/{run_id}/code/branch-pr", post(handle_branch_pr))
        .route("/api/v1/runs/{run_id}/code/repair-loop", post(handle_repair_loop))
        .route("/api/v1/runs/{run_id}/tool-calls", get(handle_list_tool_calls))
        .route("/api/v1/runs/{run_id}/artifacts", get(handle_list_artifacts))
        .route("/api/v1/runs/{run_id}/artifacts/{artifact_id}", get(handle_get_artifact))
        .route(
            "/api/v1/runs/{run_id}/artifacts/{artifact_id}/content",
            get(handle_get_artifact_content),
        )
        .layer(middleware::from_fn_with_state(state.clone(), request_id_and_log))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Attaches a request id, logs the request, and stamps the response header.
async fn request_id_and_log(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;
    let header_value = HeaderValue::from_str(&request_id)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    response.headers_mut().insert(REQUEST_ID_HEADER, header_value);

    state.log.record(&RequestLogEvent::new(
        "http_request",
        request_id,
        method,
        path,
        i64::from(response.status().as_u16()),
        started.elapsed().as_millis(),
    ));
    response
}

// ============================================================================
// SECTION: Response Helpers
// ============================================================================

/// Maps a domain error onto the transport.
fn error_response(error: &DomainError) -> Response {
    let info = map_error(error);
    let status = StatusCode::from_u16(info.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"code": info.code, "message": info.message}))).into_response()
}

/// Serializes an envelope, adding the replay marker header when needed.
fn envelope_response(envelope: ToolEnvelope) -> Response {
    let replayed = envelope.meta.replayed == Some(true);
    let mut response = (StatusCode::OK, Json(envelope)).into_response();
    if replayed {
        response.headers_mut().insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
    }
    response
}

/// Maps a JSON body rejection to `invalid_request_schema`.
fn body_error(rejection: &JsonRejection) -> Response {
    error_response(&DomainError::Validation(format!("invalid json: {rejection}")))
}

/// Extracts the client idempotency key header.
fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// ============================================================================
// SECTION: Health and Version
// ============================================================================

/// `GET /healthz`.
async fn handle_healthz() -> Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

/// `GET /metrics`.
async fn handle_metrics() -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        toolhub_telemetry::render_prometheus(),
    )
        .into_response()
}

/// `GET /version`.
async fn handle_version(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "version": state.build.version,
            "git_commit": state.build.git_commit,
            "build_time": state.build.build_time,
            "contract_version": CONTRACT_VERSION,
        })),
    )
        .into_response()
}

// ============================================================================
// SECTION: Runs
// ============================================================================

/// `POST /api/v1/runs`.
async fn handle_create_run(
    State(state): State<AppState>,
    body: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.create_run(&request) {
        Ok(run) => (StatusCode::CREATED, Json(run)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Query parameters for run listing.
#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    /// Maximum runs returned.
    #[serde(default)]
    limit: Option<usize>,
}

/// `GET /api/v1/runs`.
async fn handle_list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Response {
    match state.dispatcher.list_runs(query.limit.unwrap_or(0)) {
        Ok(runs) => (StatusCode::OK, Json(runs)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/v1/runs/{run_id}`.
async fn handle_get_run(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    match state.dispatcher.require_run(&RunId::new(run_id)) {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(err) => error_response(&err),
    }
}

// ============================================================================
// SECTION: Approvals
// ============================================================================

/// `POST /api/v1/runs/{run_id}/approvals`.
async fn handle_create_approval(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Result<Json<CreateApprovalRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.create_approval(&RunId::new(run_id), &request) {
        Ok(approval) => (StatusCode::CREATED, Json(approval)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/v1/runs/{run_id}/approvals`.
async fn handle_list_approvals(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    match state.dispatcher.list_approvals(&RunId::new(run_id)) {
        Ok(approvals) => (StatusCode::OK, Json(approvals)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/v1/runs/{run_id}/approvals/{approval_id}`.
async fn handle_get_approval(
    State(state): State<AppState>,
    Path((run_id, approval_id)): Path<(String, String)>,
) -> Response {
    match state.dispatcher.get_approval(&RunId::new(run_id), &ApprovalId::new(approval_id)) {
        Ok(approval) => (StatusCode::OK, Json(approval)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `POST /api/v1/runs/{run_id}/approvals/{approval_id}/approve`.
async fn handle_approve_approval(
    state: State<AppState>,
    path: Path<(String, String)>,
    body: Result<Json<ResolveApprovalRequest>, JsonRejection>,
) -> Response {
    resolve_approval(state, path, body, ApprovalStatus::Approved)
}

/// `POST /api/v1/runs/{run_id}/approvals/{approval_id}/reject`.
async fn handle_reject_approval(
    state: State<AppState>,
    path: Path<(String, String)>,
    body: Result<Json<ResolveApprovalRequest>, JsonRejection>,
) -> Response {
    resolve_approval(state, path, body, ApprovalStatus::Rejected)
}

/// Shared approval resolution handler.
fn resolve_approval(
    State(state): State<AppState>,
    Path((run_id, approval_id)): Path<(String, String)>,
    body: Result<Json<ResolveApprovalRequest>, JsonRejection>,
    status: ApprovalStatus,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.resolve_approval(
        &RunId::new(run_id),
        &ApprovalId::new(approval_id),
        status,
        &request,
    ) {
        Ok(approval) => (StatusCode::OK, Json(approval)).into_response(),
        Err(err) => error_response(&err),
    }
}

// ============================================================================
// SECTION: Issues
// ============================================================================

/// `POST /api/v1/runs/{run_id}/issues`.
async fn handle_create_issue(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<CreateIssueRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    let key = idempotency_key(&headers);
    match state.dispatcher.create_issue(&RunId::new(run_id), &request, key.as_deref()).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

/// `POST /api/v1/runs/{run_id}/issues/batch`.
async fn handle_batch_create_issues(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.batch_create_issues(&RunId::new(run_id), &request).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

// ============================================================================
// SECTION: Pull Requests
// ============================================================================

/// `GET /api/v1/runs/{run_id}/prs/{pr_number}`.
async fn handle_get_pr(
    State(state): State<AppState>,
    Path((run_id, pr_number)): Path<(String, String)>,
) -> Response {
    let Some(pr_number) = parse_pr_number(&pr_number) else {
        return error_response(&DomainError::Validation("invalid prNumber".to_string()));
    };
    match state.dispatcher.get_pull_request(&RunId::new(run_id), pr_number).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/v1/runs/{run_id}/prs/{pr_number}/files`.
async fn handle_list_pr_files(
    State(state): State<AppState>,
    Path((run_id, pr_number)): Path<(String, String)>,
) -> Response {
    let Some(pr_number) = parse_pr_number(&pr_number) else {
        return error_response(&DomainError::Validation("invalid prNumber".to_string()));
    };
    match state.dispatcher.list_pull_request_files(&RunId::new(run_id), pr_number).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

/// `POST /api/v1/runs/{run_id}/prs/{pr_number}/comment`.
async fn handle_create_pr_comment(
    State(state): State<AppState>,
    Path((run_id, pr_number)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Json<PrCommentRequest>, JsonRejection>,
) -> Response {
    let Some(pr_number) = parse_pr_number(&pr_number) else {
        return error_response(&DomainError::Validation("invalid prNumber".to_string()));
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    let key = idempotency_key(&headers);
    match state
        .dispatcher
        .create_pr_comment(&RunId::new(run_id), pr_number, &request, key.as_deref())
        .await
    {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

/// Parses a positive PR number from its path segment.
fn parse_pr_number(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|number| *number > 0)
}

// ============================================================================
// SECTION: QA and Code
// ============================================================================

/// `POST /api/v1/runs/{run_id}/qa/test`.
async fn handle_qa_test(
    state: State<AppState>,
    path: Path<String>,
    body: Result<Json<QaRequest>, JsonRejection>,
) -> Response {
    run_qa(state, path, body, QaKind::Test).await
}

/// `POST /api/v1/runs/{run_id}/qa/lint`.
async fn handle_qa_lint(
    state: State<AppState>,
    path: Path<String>,
    body: Result<Json<QaRequest>, JsonRejection>,
) -> Response {
    run_qa(state, path, body, QaKind::Lint).await
}

/// Shared QA handler.
async fn run_qa(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Result<Json<QaRequest>, JsonRejection>,
    kind: QaKind,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.run_qa(&RunId::new(run_id), kind, &request).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

/// `POST /api/v1/runs/{run_id}/code/patch`.
async fn handle_generate_patch(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Result<Json<CodePatchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.generate_patch(&RunId::new(run_id), &request).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

/// `POST /api/v1/runs/{run_id}/code/branch-pr`.
async fn handle_branch_pr(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Result<Json<CodeBranchPrRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.create_branch_pr(&RunId::new(run_id), &request).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

/// `POST /api/v1/runs/{run_id}/code/repair-loop`.
async fn handle_repair_loop(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Result<Json<CodeRepairLoopRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(&rejection),
    };
    match state.dispatcher.run_repair_loop(&RunId::new(run_id), &request).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => error_response(&err),
    }
}

// ============================================================================
// SECTION: Evidence Reads
// ============================================================================

/// Query parameters for tool call listing.
#[derive(Debug, Deserialize)]
struct ToolCallQuery {
    /// Restrict to one status (`ok` or `fail`).
    #[serde(default)]
    status: Option<String>,
    /// Restrict to one tool name.
    #[serde(default)]
    tool_name: Option<String>,
    /// Only calls created strictly after this RFC 3339 instant.
    #[serde(default)]
    created_after: Option<String>,
    /// Only calls created strictly before this RFC 3339 instant.
    #[serde(default)]
    created_before: Option<String>,
}

/// `GET /api/v1/runs/{run_id}/tool-calls`.
async fn handle_list_tool_calls(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<ToolCallQuery>,
) -> Response {
    let status = match &query.status {
        None => None,
        Some(raw) => match CallStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(&DomainError::Validation(format!(
                    "invalid status {raw:?}"
                )));
            }
        },
    };
    let created_after = match parse_query_time(query.created_after.as_deref()) {
        Ok(value) => value,
        Err(err) => return error_response(&err),
    };
    let created_before = match parse_query_time(query.created_before.as_deref()) {
        Ok(value) => value,
        Err(err) => return error_response(&err),
    };
    let filter = ToolCallFilter {
        status,
        tool_name: query.tool_name.clone(),
        created_after,
        created_before,
    };
    match state.dispatcher.list_tool_calls(&RunId::new(run_id), &filter) {
        Ok(calls) => (StatusCode::OK, Json(calls)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Parses an optional RFC 3339 query timestamp.
fn parse_query_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, DomainError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|time| Some(time.with_timezone(&Utc)))
        .map_err(|err| DomainError::Validation(format!("invalid timestamp {raw:?}: {err}")))
}

/// `GET /api/v1/runs/{run_id}/artifacts`.
async fn handle_list_artifacts(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    match state.dispatcher.list_artifacts(&RunId::new(run_id)) {
        Ok(artifacts) => (StatusCode::OK, Json(artifacts)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/v1/runs/{run_id}/artifacts/{artifact_id}`.
async fn handle_get_artifact(
    State(state): State<AppState>,
    Path((run_id, artifact_id)): Path<(String, String)>,
) -> Response {
    match state.dispatcher.get_artifact(&RunId::new(run_id), &ArtifactId::new(artifact_id)) {
        Ok(artifact) => (StatusCode::OK, Json(artifact)).into_response(),
        Err(DomainError::Validation(message)) if message == "artifact not found" => (
            StatusCode::NOT_FOUND,
            Json(json!({"code": "not_found", "message": message})),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/v1/runs/{run_id}/artifacts/{artifact_id}/content`.
async fn handle_get_artifact_content(
    State(state): State<AppState>,
    Path((run_id, artifact_id)): Path<(String, String)>,
) -> Response {
    match state.dispatcher.read_artifact_content(
        &RunId::new(run_id),
        &ArtifactId::new(artifact_id),
        MAX_ARTIFACT_CONTENT_BYTES,
    ) {
        Ok((record, bytes)) => {
            let content_type = if record.content_type.trim().is_empty() {
                "application/octet-stream".to_string()
            } else {
                record.content_type
            };
            (StatusCode::OK, [("Content-Type", content_type)], bytes).into_response()
        }
        Err(DomainError::Validation(message)) if message == "artifact not found" => (
            StatusCode::NOT_FOUND,
            Json(json!({"code": "not_found", "message": message})),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
