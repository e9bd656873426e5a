// toolhub-server/tests/mcp_transport.rs
// ============================================================================
// Module: MCP Transport Tests
// Description: Drive the line-delimited JSON-RPC socket end to end.
// Purpose: Validate protocol methods, error codes, and envelope parity.
// Dependencies: toolhub-server, toolhub-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! Connects to a bound MCP server and exchanges newline-delimited JSON-RPC:
//! initialize, tools/list, tools/call, parse errors, and unknown methods.
//! Tool results carry the same envelope the HTTP transport returns.

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
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use toolhub_core::batch::BatchMode;
use toolhub_server::McpServer;
use toolhub_server::NoopLogSink;

use common::Fixture;
use common::fixture;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// One line-delimited JSON-RPC client connection.
struct McpClient {
    /// Buffered reader half.
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    /// Writer half.
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl McpClient {
    /// Sends one raw line and reads one response line.
    async fn round_trip_raw(&mut self, line: &str) -> Value {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        let mut response = String::new();
        self.reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    /// Sends one JSON-RPC request and reads the response.
    async fn round_trip(&mut self, request: Value) -> Value {
        self.round_trip_raw(&request.to_string()).await
    }
}

/// Binds an MCP server and connects a client to it.
async fn connect(fx: &Fixture) -> McpClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(McpServer::new(Arc::clone(&fx.dispatcher), Arc::new(NoopLogSink)));
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    McpClient {
        reader: BufReader::new(read_half),
        writer: write_half,
    }
}

/// Builds a `tools/call` request.
fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments},
    })
}

// ============================================================================
// SECTION: Protocol Methods
// ============================================================================

#[tokio::test]
async fn initialize_reports_contract_version() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let response = client
        .round_trip(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
        .await;
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "toolhub");
    assert_eq!(response["result"]["serverInfo"]["contract_version"], "v1");
}

#[tokio::test]
async fn tools_list_reports_all_eleven_tools() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let response = client
        .round_trip(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 11);
    let names: Vec<&str> =
        tools.iter().map(|tool| tool["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"runs_create"));
    assert!(names.contains(&"github_issues_batch_create"));
    assert!(names.contains(&"code_repair_loop"));
}

#[tokio::test]
async fn parse_errors_yield_32700_with_null_id() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let response = client.round_trip_raw("{not json").await;
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["error"]["code"], -32700);
}

#[tokio::test]
async fn unknown_methods_yield_32601() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let response = client
        .round_trip(json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}))
        .await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn invalid_tool_params_yield_32602() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let response = client
        .round_trip(json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": 7}))
        .await;
    assert_eq!(response["error"]["code"], -32602);

    let response = client.round_trip(tool_call(5, "no_such_tool", json!({}))).await;
    assert_eq!(response["error"]["code"], -32602);
}

// ============================================================================
// SECTION: Tool Calls
// ============================================================================

#[tokio::test]
async fn runs_create_and_issue_create_share_http_semantics() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;

    let created = client
        .round_trip(tool_call(6, "runs_create", json!({"repo": "octo/demo", "purpose": "t"})))
        .await;
    let run_id = created["result"]["run_id"].as_str().unwrap().to_string();

    let arguments = json!({"run_id": run_id, "title": "t", "body": "b", "labels": ["a"]});
    let first = client.round_trip(tool_call(7, "github_issues_create", arguments.clone())).await;
    let envelope = &first["result"];
    assert_eq!(envelope["ok"], true);
    assert!(envelope["meta"]["evidence_hash"].as_str().unwrap().len() == 64);
    let number = envelope["result"]["number"].as_u64().unwrap();

    // The same arguments replay the recorded response, marked in meta.
    let second = client.round_trip(tool_call(8, "github_issues_create", arguments)).await;
    let envelope = &second["result"];
    assert_eq!(envelope["meta"]["replayed"], true);
    assert_eq!(envelope["result"]["number"].as_u64().unwrap(), number);
}

#[tokio::test]
async fn domain_failures_embed_the_stable_code() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let response = client
        .round_trip(tool_call(
            9,
            "runs_create",
            json!({"repo": "octo/forbidden", "purpose": "t"}),
        ))
        .await;
    let error = &response["error"];
    assert_eq!(error["code"], -32603);
    assert!(error["message"].as_str().unwrap().starts_with("repo_not_allowed:"));
}

#[tokio::test]
async fn missing_runs_are_invalid_params() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let response = client
        .round_trip(tool_call(
            10,
            "qa_test",
            json!({"run_id": "missing"}),
        ))
        .await;
    let error = &response["error"];
    assert_eq!(error["code"], -32602);
    assert_eq!(error["message"], "run not found");
}

#[tokio::test]
async fn dry_run_issue_preview_over_mcp() {
    let fx = fixture(BatchMode::Partial);
    let mut client = connect(&fx).await;
    let created = client
        .round_trip(tool_call(11, "runs_create", json!({"repo": "octo/demo", "purpose": "t"})))
        .await;
    let run_id = created["result"]["run_id"].as_str().unwrap().to_string();

    let response = client
        .round_trip(tool_call(
            12,
            "github_issues_create",
            json!({"run_id": run_id, "title": "t", "body": "b", "dry_run": true}),
        ))
        .await;
    let envelope = &response["result"];
    assert_eq!(envelope["ok"], true);
    assert_eq!(envelope["meta"]["dry_run"], true);
    assert_eq!(envelope["result"]["would_create"]["repo"], "octo/demo");
}
