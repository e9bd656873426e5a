// toolhub-server/src/logging.rs
// ============================================================================
// Module: ToolHub Request Logging
// Description: Structured request log events and pluggable sinks.
// Purpose: Emit one JSON line per transport request without hard deps.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Request logs are structured events routed through a small sink trait so
//! deployments can redirect them without redesign. Events never contain
//! request bodies, tokens, or private keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// One transport request, as logged.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEvent {
    /// Event identifier (`http_request` or `mcp_request`).
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier attached to the response.
    pub request_id: String,
    /// HTTP method or JSON-RPC method name.
    pub method: String,
    /// Request path or tool name.
    pub path: String,
    /// Response status (HTTP status or JSON-RPC error code, 0 for ok).
    pub status: i64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u128,
}

impl RequestLogEvent {
    /// Creates an event with a consistent timestamp.
    #[must_use]
    pub fn new(
        event: &'static str,
        request_id: String,
        method: String,
        path: String,
        status: i64,
        duration_ms: u128,
    ) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            request_id,
            method,
            path,
            status,
            duration_ms,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink for request log events.
pub trait RequestLogSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &RequestLogEvent);
}

/// Sink that writes JSON lines to stderr.
pub struct StderrLogSink;

impl RequestLogSink for StderrLogSink {
    fn record(&self, event: &RequestLogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// No-op sink for tests.
pub struct NoopLogSink;

impl RequestLogSink for NoopLogSink {
    fn record(&self, _event: &RequestLogEvent) {}
}
