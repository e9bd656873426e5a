// toolhub-server/src/lib.rs
// ============================================================================
// Module: ToolHub Server Library
// Description: Public API surface for the dispatcher and transports.
// Purpose: Expose the tool dispatcher, HTTP API, and MCP server.
// Dependencies: crate::{config, dispatcher, http, logging, mcp}
// ============================================================================

//! ## Overview
//! Both transports demultiplex onto one [`dispatcher::ToolDispatcher`], so
//! idempotency rules, envelopes, and error codes are identical over HTTP and
//! over the line-delimited JSON-RPC MCP socket.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod dispatcher;
pub mod http;
pub mod logging;
pub mod mcp;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CodeSettings;
pub use config::ConfigError;
pub use config::QaSettings;
pub use config::ServerConfig;
pub use dispatcher::BuildInfo;
pub use dispatcher::ToolDispatcher;
pub use dispatcher::ToolDispatcherConfig;
pub use http::build_router;
pub use logging::NoopLogSink;
pub use logging::RequestLogEvent;
pub use logging::RequestLogSink;
pub use logging::StderrLogSink;
pub use mcp::McpServer;
