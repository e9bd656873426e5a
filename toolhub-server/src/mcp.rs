// toolhub-server/src/mcp.rs
// ============================================================================
// Module: ToolHub MCP Server
// Description: Line-delimited JSON-RPC 2.0 transport over TCP.
// Purpose: Expose the dispatcher to MCP clients with identical semantics.
// Dependencies: toolhub-core, tokio, serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! Each line on the socket is one JSON-RPC 2.0 request. `initialize`,
//! `tools/list`, and `tools/call` are the only recognized methods;
//! `tools/call` multiplexes to the dispatcher by tool name, so envelopes,
//! idempotency rules, and error codes match the HTTP transport exactly.
//! Parse errors yield `-32700` with a null id; oversized lines close the
//! connection after the same response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use toolhub_core::BatchRequest;
use toolhub_core::CONTRACT_VERSION;
use toolhub_core::DomainError;
use toolhub_core::QaKind;
use toolhub_core::RunId;
use toolhub_core::map_error;
use uuid::Uuid;

use crate::dispatcher::CodeBranchPrRequest;
use crate::dispatcher::CodePatchRequest;
use crate::dispatcher::CodeRepairLoopRequest;
use crate::dispatcher::CreateIssueRequest;
use crate::dispatcher::CreateRunRequest;
use crate::dispatcher::PrCommentRequest;
use crate::dispatcher::QaRequest;
use crate::dispatcher::ToolDispatcher;
use crate::logging::RequestLogEvent;
use crate::logging::RequestLogSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted line length in bytes.
const MAX_LINE_BYTES: usize = 1 << 20;
/// MCP protocol version reported by `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// SECTION: JSON-RPC Types
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier.
    #[serde(default)]
    id: Value,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Value,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    const fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    const fn error(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
            }),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
}

/// Tool call parameters for `tools/call`.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Line-delimited JSON-RPC server over TCP.
pub struct McpServer {
    /// Tool dispatcher shared with the HTTP transport.
    dispatcher: Arc<ToolDispatcher>,
    /// Request log sink.
    log: Arc<dyn RequestLogSink>,
}

impl McpServer {
    /// Creates an MCP server over the shared dispatcher.
    #[must_use]
    pub fn new(dispatcher: Arc<ToolDispatcher>, log: Arc<dyn RequestLogSink>) -> Self {
        Self {
            dispatcher,
            log,
        }
    }

    /// Accepts connections on the listener until it fails.
    ///
    /// # Errors
    ///
    /// Returns the accept-loop I/O error.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, _peer) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.handle_connection(stream).await;
            });
        }
    }

    /// Serves one connection line by line.
    async fn handle_connection(&self, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line: Vec<u8> = Vec::new();
        loop {
            line.clear();
            let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
            let read = match limited.read_until(b'\n', &mut line).await {
                Ok(0) => return,
                Ok(read) => read,
                Err(_) => return,
            };
            if read > MAX_LINE_BYTES {
                let response = JsonRpcResponse::error(
                    Value::Null,
                    -32700,
                    "parse error: line too long".to_string(),
                );
                let _ = write_response(&mut write_half, &response).await;
                return;
            }
            let trimmed = trim_line(&line);
            if trimmed.is_empty() {
                continue;
            }

            let response = self.handle_line(trimmed).await;
            if write_response(&mut write_half, &response).await.is_err() {
                return;
            }
        }
    }

    /// Parses and dispatches one request line.
    async fn handle_line(&self, line: &[u8]) -> JsonRpcResponse {
        let started = Instant::now();
        let request: JsonRpcRequest = match serde_json::from_slice(line) {
            Ok(request) => request,
            Err(_) => {
                return JsonRpcResponse::error(Value::Null, -32700, "parse error".to_string());
            }
        };
        let method = request.method.clone();
        let response = self.dispatch(request).await;
        let status = response.error.as_ref().map_or(0, |error| error.code);
        self.log.record(&RequestLogEvent::new(
            "mcp_request",
            Uuid::new_v4().to_string(),
            method,
            String::new(),
            status,
            started.elapsed().as_millis(),
        ));
        response
    }

    /// Routes a request to the recognized methods.
    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                request.id,
                -32600,
                "invalid json-rpc version".to_string(),
            );
        }
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::result(
                request.id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {"listChanged": false}},
                    "serverInfo": {
                        "name": "toolhub",
                        "version": env!("CARGO_PKG_VERSION"),
                        "contract_version": CONTRACT_VERSION,
                    },
                }),
            ),
            "tools/list" => {
                JsonRpcResponse::result(request.id, json!({"tools": tool_definitions()}))
            }
            "tools/call" => self.handle_tool_call(request.id, request.params).await,
            other => JsonRpcResponse::error(
                request.id,
                -32601,
                format!("method not found: {other}"),
            ),
        }
    }

    /// Handles a `tools/call` request.
    async fn handle_tool_call(&self, id: Value, params: Value) -> JsonRpcResponse {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(err) => {
                return JsonRpcResponse::error(id, -32602, format!("invalid params: {err}"));
            }
        };
        match self.call_tool(&params.name, params.arguments).await {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(ToolCallFailure::InvalidParams(message)) => {
                JsonRpcResponse::error(id, -32602, message)
            }
            Err(ToolCallFailure::Domain(error)) => {
                let info = map_error(&error);
                JsonRpcResponse::error(id, -32603, format!("{}: {}", info.code, info.message))
            }
        }
    }

    /// Multiplexes one tool call onto the dispatcher.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolCallFailure> {
        match name {
            "runs_create" => {
                let args: RunsCreateArgs = decode_args(arguments)?;
                let run = self
                    .dispatcher
                    .create_run(&CreateRunRequest {
                        repo: args.repo,
                        purpose: args.purpose,
                    })
                    .map_err(ToolCallFailure::from)?;
                serde_json::to_value(run)
                    .map_err(|err| ToolCallFailure::Domain(DomainError::Internal(err.to_string())))
            }
            "github_issues_create" => {
                let args: IssueCreateArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .create_issue(
                        &RunId::new(args.run_id),
                        &CreateIssueRequest {
                            title: args.title,
                            body: args.body,
                            labels: args.labels,
                            dry_run: args.dry_run,
                        },
                        None,
                    )
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            "github_issues_batch_create" => {
                let args: IssueBatchCreateArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .batch_create_issues(
                        &RunId::new(args.run_id),
                        &BatchRequest {
                            issues: args.issues,
                            dry_run: args.dry_run,
                        },
                    )
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            "github_pr_comment_create" => {
                let args: PrCommentArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .create_pr_comment(
                        &RunId::new(args.run_id),
                        args.pr_number,
                        &PrCommentRequest {
                            body: args.body,
                            dry_run: args.dry_run,
                        },
                        None,
                    )
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            "github_pr_get" => {
                let args: PrReadArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .get_pull_request(&RunId::new(args.run_id), args.pr_number)
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            "github_pr_files_list" => {
                let args: PrReadArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .list_pull_request_files(&RunId::new(args.run_id), args.pr_number)
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            "qa_test" => self.call_qa(QaKind::Test, arguments).await,
            "qa_lint" => self.call_qa(QaKind::Lint, arguments).await,
            "code_patch_generate" => {
                let args: CodePatchArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .generate_patch(
                        &RunId::new(args.run_id),
                        &CodePatchRequest {
                            path: args.path,
                            original_content: args.original_content,
                            modified_content: args.modified_content,
                            dry_run: args.dry_run,
                        },
                    )
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            "code_branch_pr_create" => {
                let args: CodeBranchPrArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .create_branch_pr(&RunId::new(args.run_id.clone()), &args.into_request())
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            "code_repair_loop" => {
                let args: CodeRepairLoopArgs = decode_args(arguments)?;
                let envelope = self
                    .dispatcher
                    .run_repair_loop(&RunId::new(args.run_id.clone()), &args.into_request())
                    .await
                    .map_err(ToolCallFailure::from)?;
                envelope_value(envelope)
            }
            other => Err(ToolCallFailure::InvalidParams(format!("unknown tool: {other}"))),
        }
    }

    /// Shared QA tool call handler.
    async fn call_qa(&self, kind: QaKind, arguments: Value) -> Result<Value, ToolCallFailure> {
        let args: QaArgs = decode_args(arguments)?;
        let envelope = self
            .dispatcher
            .run_qa(
                &RunId::new(args.run_id),
                kind,
                &QaRequest {
                    dry_run: args.dry_run,
                },
            )
            .await
            .map_err(ToolCallFailure::from)?;
        envelope_value(envelope)
    }
}

/// Writes one response line.
async fn write_response(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    response: &JsonRpcResponse,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(response).unwrap_or_else(|_| {
        b"{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{\"code\":-32603,\"message\":\"serialization failed\"}}"
            .to_vec()
    });
    payload.push(b'\n');
    writer.write_all(&payload).await
}

/// Strips the trailing newline (and carriage return) from a line.
fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

// ============================================================================
// SECTION: Tool Call Failures
// ============================================================================

/// Failure modes of a tool call at the JSON-RPC layer.
enum ToolCallFailure {
    /// Arguments failed to decode or validate.
    InvalidParams(String),
    /// The dispatcher surfaced a domain error.
    Domain(DomainError),
}

impl From<DomainError> for ToolCallFailure {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation(message) => Self::InvalidParams(message),
            DomainError::RunNotFound => Self::InvalidParams("run not found".to_string()),
            other => Self::Domain(other),
        }
    }
}

/// Decodes tool arguments into a typed struct.
fn decode_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, ToolCallFailure> {
    serde_json::from_value(arguments)
        .map_err(|err| ToolCallFailure::InvalidParams(err.to_string()))
}

/// Serializes an envelope as the JSON-RPC result payload.
fn envelope_value(envelope: toolhub_core::ToolEnvelope) -> Result<Value, ToolCallFailure> {
    serde_json::to_value(envelope)
        .map_err(|err| ToolCallFailure::Domain(DomainError::Internal(err.to_string())))
}

// ============================================================================
// SECTION: Tool Arguments
// ============================================================================

/// Arguments for `runs_create`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunsCreateArgs {
    /// Target repository (`owner/name`).
    repo: String,
    /// Free-form purpose.
    purpose: String,
}

/// Arguments for `github_issues_create`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IssueCreateArgs {
    /// Owning run identifier.
    run_id: String,
    /// Issue title.
    title: String,
    /// Issue body.
    body: String,
    /// Issue labels.
    #[serde(default)]
    labels: Vec<String>,
    /// Skip the external side effect when set.
    #[serde(default)]
    dry_run: bool,
}

/// Arguments for `github_issues_batch_create`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IssueBatchCreateArgs {
    /// Owning run identifier.
    run_id: String,
    /// Ordered issues to create.
    issues: Vec<toolhub_core::IssueInput>,
    /// Skip the external side effect when set.
    #[serde(default)]
    dry_run: bool,
}

/// Arguments for `github_pr_comment_create`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrCommentArgs {
    /// Owning run identifier.
    run_id: String,
    /// Pull request number.
    pr_number: u64,
    /// Comment body.
    body: String,
    /// Skip the external side effect when set.
    #[serde(default)]
    dry_run: bool,
}

/// Arguments for PR reads.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrReadArgs {
    /// Owning run identifier.
    run_id: String,
    /// Pull request number.
    pr_number: u64,
}

/// Arguments for QA tools.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QaArgs {
    /// Owning run identifier.
    run_id: String,
    /// Plan the command without executing when set.
    #[serde(default)]
    dry_run: bool,
}

/// Arguments for `code_patch_generate`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodePatchArgs {
    /// Owning run identifier.
    run_id: String,
    /// Repository-relative path.
    path: String,
    /// Original file content.
    #[serde(default)]
    original_content: String,
    /// Modified file content.
    #[serde(default)]
    modified_content: String,
    /// Marker carried through to the envelope meta.
    #[serde(default)]
    dry_run: bool,
}

/// Arguments for `code_branch_pr_create`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeBranchPrArgs {
    /// Owning run identifier.
    run_id: String,
    /// Approval gating this write.
    approval_id: String,
    /// Branch to start from.
    base_branch: String,
    /// Branch to create and push.
    head_branch: String,
    /// Commit message.
    commit_message: String,
    /// PR title.
    pr_title: String,
    /// PR body.
    #[serde(default)]
    pr_body: String,
    /// Ordered file changes.
    files: Vec<toolhub_core::FileChange>,
    /// Plan commands without executing when set.
    #[serde(default)]
    dry_run: bool,
}

impl CodeBranchPrArgs {
    /// Converts into the dispatcher request.
    fn into_request(self) -> CodeBranchPrRequest {
        CodeBranchPrRequest {
            approval_id: self.approval_id,
            base_branch: self.base_branch,
            head_branch: self.head_branch,
            commit_message: self.commit_message,
            pr_title: self.pr_title,
            pr_body: self.pr_body,
            files: self.files,
            dry_run: self.dry_run,
        }
    }
}

/// Arguments for `code_repair_loop`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeRepairLoopArgs {
    /// Owning run identifier.
    run_id: String,
    /// Approval gating this write.
    approval_id: String,
    /// Branch to start from.
    base_branch: String,
    /// Branch to create and push.
    head_branch: String,
    /// Commit message.
    commit_message: String,
    /// PR title used on success.
    pr_title: String,
    /// PR body used on success.
    #[serde(default)]
    pr_body: String,
    /// Ordered file changes.
    files: Vec<toolhub_core::FileChange>,
    /// QA retry cap; zero selects one iteration.
    #[serde(default)]
    max_iterations: u32,
    /// Plan commands without executing when set.
    #[serde(default)]
    dry_run: bool,
}

impl CodeRepairLoopArgs {
    /// Converts into the dispatcher request.
    fn into_request(self) -> CodeRepairLoopRequest {
        CodeRepairLoopRequest {
            approval_id: self.approval_id,
            base_branch: self.base_branch,
            head_branch: self.head_branch,
            commit_message: self.commit_message,
            pr_title: self.pr_title,
            pr_body: self.pr_body,
            files: self.files,
            max_iterations: self.max_iterations,
            dry_run: self.dry_run,
        }
    }
}

// ============================================================================
// SECTION: Tool Definitions
// ============================================================================

/// Fixed tool definitions reported by `tools/list`.
#[must_use]
pub fn tool_definitions() -> Value {
    let file_schema = json!({
        "type": "object",
        "properties": {
            "path": {"type": "string"},
            "original_content": {"type": "string"},
            "modified_content": {"type": "string"},
        },
        "required": ["path", "modified_content"],
    });
    json!([
        {
            "name": "runs_create",
            "description": "Create a new ToolHub run for a repository",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repo": {"type": "string", "description": "owner/repo"},
                    "purpose": {"type": "string", "description": "Why this run exists"},
                },
                "required": ["repo", "purpose"],
            },
        },
        {
            "name": "github_issues_create",
            "description": "Create a GitHub issue within a run",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "title": {"type": "string"},
                    "body": {"type": "string"},
                    "labels": {"type": "array", "items": {"type": "string"}},
                    "dry_run": {"type": "boolean"},
                },
                "required": ["run_id", "title", "body"],
            },
        },
        {
            "name": "github_issues_batch_create",
            "description": "Create multiple GitHub issues within a run",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "dry_run": {"type": "boolean"},
                    "issues": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": {"type": "string"},
                                "body": {"type": "string"},
                                "labels": {"type": "array", "items": {"type": "string"}},
                            },
                            "required": ["title", "body"],
                        },
                    },
                },
                "required": ["run_id", "issues"],
            },
        },
        {
            "name": "github_pr_comment_create",
            "description": "Create a PR summary comment within a run",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "pr_number": {"type": "integer"},
                    "body": {"type": "string"},
                    "dry_run": {"type": "boolean"},
                },
                "required": ["run_id", "pr_number", "body"],
            },
        },
        {
            "name": "github_pr_get",
            "description": "Get pull request metadata within a run",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "pr_number": {"type": "integer"},
                },
                "required": ["run_id", "pr_number"],
            },
        },
        {
            "name": "github_pr_files_list",
            "description": "List pull request files within a run",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "pr_number": {"type": "integer"},
                },
                "required": ["run_id", "pr_number"],
            },
        },
        {
            "name": "qa_test",
            "description": "Execute configured test command and capture output",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "dry_run": {"type": "boolean"},
                },
                "required": ["run_id"],
            },
        },
        {
            "name": "qa_lint",
            "description": "Execute configured lint command and capture output",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "dry_run": {"type": "boolean"},
                },
                "required": ["run_id"],
            },
        },
        {
            "name": "code_patch_generate",
            "description": "Generate unified patch/diff without modifying repository",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "path": {"type": "string"},
                    "original_content": {"type": "string"},
                    "modified_content": {"type": "string"},
                    "dry_run": {"type": "boolean"},
                },
                "required": ["run_id", "path", "original_content", "modified_content"],
            },
        },
        {
            "name": "code_branch_pr_create",
            "description": "Create branch, commit changes, push branch, and open PR (requires approved approval_id)",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "approval_id": {"type": "string"},
                    "base_branch": {"type": "string"},
                    "head_branch": {"type": "string"},
                    "commit_message": {"type": "string"},
                    "pr_title": {"type": "string"},
                    "pr_body": {"type": "string"},
                    "dry_run": {"type": "boolean"},
                    "files": {"type": "array", "items": file_schema.clone()},
                },
                "required": ["run_id", "approval_id", "base_branch", "head_branch", "commit_message", "pr_title", "files"],
            },
        },
        {
            "name": "code_repair_loop",
            "description": "Run controlled repair loop: branch/commit, QA retries, rollback on QA failure, and PR on success",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "run_id": {"type": "string"},
                    "approval_id": {"type": "string"},
                    "base_branch": {"type": "string"},
                    "head_branch": {"type": "string"},
                    "commit_message": {"type": "string"},
                    "pr_title": {"type": "string"},
                    "pr_body": {"type": "string"},
                    "max_iterations": {"type": "integer"},
                    "dry_run": {"type": "boolean"},
                    "files": {"type": "array", "items": file_schema},
                },
                "required": ["run_id", "approval_id", "base_branch", "head_branch", "commit_message", "pr_title", "files"],
            },
        },
    ])
}
