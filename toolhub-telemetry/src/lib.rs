// toolhub-telemetry/src/lib.rs
// ============================================================================
// Module: ToolHub Telemetry Registry
// Description: Process-wide counters for tool calls, QA runs, and upstream errors.
// Purpose: Provide a single metrics registry with Prometheus text rendering.
// Dependencies: std
// ============================================================================

//! ## Overview
//! ToolHub keeps one process-wide metrics registry. Counters are incremented
//! from the audit engine, the code-forge client, the QA runner, and the repair
//! loop; the HTTP transport renders the registry as Prometheus text on
//! `/metrics`. Label sets are rendered in sorted order so output is
//! deterministic across processes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Histogram bucket boundaries for tool durations, in seconds.
const DURATION_BUCKETS: [f64; 8] = [0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];
/// Rendered labels for the duration buckets, including the overflow bucket.
const DURATION_BUCKET_LABELS: [&str; 9] =
    ["0.1", "0.5", "1", "2", "5", "10", "30", "60", "+Inf"];

/// Counter state guarded by the registry mutex.
#[derive(Default)]
struct RegistryInner {
    /// Tool call counts keyed by (tool, status).
    tool_calls: BTreeMap<(String, String), u64>,
    /// Tool duration histogram counts keyed by tool.
    tool_duration_buckets: BTreeMap<String, [u64; 9]>,
    /// Artifact write failures.
    artifact_write_failures: u64,
    /// QA command timeouts.
    qa_timeouts: u64,
    /// Code-forge API errors keyed by (operation, status code).
    forge_api_errors: BTreeMap<(String, u16), u64>,
    /// Repair loop iterations keyed by status.
    repair_iterations: BTreeMap<String, u64>,
    /// Repair loop QA results keyed by (kind, status).
    repair_qa_results: BTreeMap<(String, String), u64>,
    /// Repair loop completions keyed by outcome.
    repair_completed: BTreeMap<String, u64>,
    /// Repair loop rollbacks keyed by status.
    repair_rollbacks: BTreeMap<String, u64>,
}

/// Process-wide metrics registry.
struct Registry {
    /// Mutable counter state.
    inner: Mutex<RegistryInner>,
}

/// Returns the process-wide registry, initializing it on first use.
fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        inner: Mutex::new(RegistryInner::default()),
    })
}

// ============================================================================
// SECTION: Counter API
// ============================================================================

/// Increments the tool call counter for a tool/status pair.
pub fn inc_tool_call(tool: &str, status: &str) {
    if let Ok(mut inner) = registry().inner.lock() {
        *inner.tool_calls.entry((tool.to_string(), status.to_string())).or_insert(0) += 1;
    }
}

/// Records a tool call duration in the per-tool histogram.
pub fn observe_tool_duration(tool: &str, duration: Duration) {
    let seconds = duration.as_secs_f64();
    let mut index = DURATION_BUCKETS.len();
    for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
        if seconds <= *bound {
            index = i;
            break;
        }
    }
    if let Ok(mut inner) = registry().inner.lock() {
        let buckets = inner.tool_duration_buckets.entry(tool.to_string()).or_insert([0; 9]);
        buckets[index] += 1;
    }
}

/// Increments the artifact write failure counter.
pub fn inc_artifact_write_failure() {
    if let Ok(mut inner) = registry().inner.lock() {
        inner.artifact_write_failures += 1;
    }
}

/// Increments the QA timeout counter.
pub fn inc_qa_timeout() {
    if let Ok(mut inner) = registry().inner.lock() {
        inner.qa_timeouts += 1;
    }
}

/// Increments the code-forge API error counter for an operation/status pair.
pub fn inc_forge_api_error(operation: &str, status_code: u16) {
    if let Ok(mut inner) = registry().inner.lock() {
        *inner.forge_api_errors.entry((operation.to_string(), status_code)).or_insert(0) += 1;
    }
}

/// Increments the repair loop iteration counter for a status label.
pub fn inc_repair_iteration(status: &str) {
    if let Ok(mut inner) = registry().inner.lock() {
        *inner.repair_iterations.entry(status.to_string()).or_insert(0) += 1;
    }
}

/// Increments the repair loop QA result counter for a kind/status pair.
pub fn inc_repair_qa_result(kind: &str, status: &str) {
    if let Ok(mut inner) = registry().inner.lock() {
        *inner.repair_qa_results.entry((kind.to_string(), status.to_string())).or_insert(0) += 1;
    }
}

/// Increments the repair loop completion counter for an outcome label.
pub fn inc_repair_completed(outcome: &str) {
    if let Ok(mut inner) = registry().inner.lock() {
        *inner.repair_completed.entry(outcome.to_string()).or_insert(0) += 1;
    }
}

/// Increments the repair loop rollback counter for a status label.
pub fn inc_repair_rollback(status: &str) {
    if let Ok(mut inner) = registry().inner.lock() {
        *inner.repair_rollbacks.entry(status.to_string()).or_insert(0) += 1;
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the registry as Prometheus text exposition.
#[must_use]
pub fn render_prometheus() -> String {
    let Ok(inner) = registry().inner.lock() else {
        return String::new();
    };
    let mut out = String::new();

    let _ = writeln!(out, "# TYPE toolhub_tool_calls_total counter");
    for ((tool, status), count) in &inner.tool_calls {
        let _ = writeln!(
            out,
            "toolhub_tool_calls_total{{tool=\"{tool}\",status=\"{status}\"}} {count}"
        );
    }

    let _ = writeln!(out, "# TYPE toolhub_tool_duration_seconds_bucket counter");
    for (tool, buckets) in &inner.tool_duration_buckets {
        for (i, count) in buckets.iter().enumerate() {
            let le = DURATION_BUCKET_LABELS[i];
            let _ = writeln!(
                out,
                "toolhub_tool_duration_seconds_bucket{{tool=\"{tool}\",le=\"{le}\"}} {count}"
            );
        }
    }

    let _ = writeln!(out, "# TYPE toolhub_artifact_write_failures_total counter");
    let _ = writeln!(out, "toolhub_artifact_write_failures_total {}", inner.artifact_write_failures);

    let _ = writeln!(out, "# TYPE toolhub_qa_timeouts_total counter");
    let _ = writeln!(out, "toolhub_qa_timeouts_total {}", inner.qa_timeouts);

    let _ = writeln!(out, "# TYPE toolhub_github_api_errors_total counter");
    for ((operation, status_code), count) in &inner.forge_api_errors {
        let _ = writeln!(
            out,
            "toolhub_github_api_errors_total{{operation=\"{operation}\",status_code=\"{status_code}\"}} {count}"
        );
    }

    let _ = writeln!(out, "# TYPE toolhub_repair_loop_iterations_total counter");
    for (status, count) in &inner.repair_iterations {
        let _ = writeln!(out, "toolhub_repair_loop_iterations_total{{status=\"{status}\"}} {count}");
    }

    let _ = writeln!(out, "# TYPE toolhub_repair_loop_qa_results_total counter");
    for ((kind, status), count) in &inner.repair_qa_results {
        let _ = writeln!(
            out,
            "toolhub_repair_loop_qa_results_total{{kind=\"{kind}\",status=\"{status}\"}} {count}"
        );
    }

    let _ = writeln!(out, "# TYPE toolhub_repair_loop_completed_total counter");
    for (outcome, count) in &inner.repair_completed {
        let _ = writeln!(out, "toolhub_repair_loop_completed_total{{outcome=\"{outcome}\"}} {count}");
    }

    let _ = writeln!(out, "# TYPE toolhub_repair_loop_rollbacks_total counter");
    for (status, count) in &inner.repair_rollbacks {
        let _ = writeln!(out, "toolhub_repair_loop_rollbacks_total{{status=\"{status}\"}} {count}");
    }

    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_sorted_and_typed() {
        inc_tool_call("zz.tool", "ok");
        inc_tool_call("aa.tool", "fail");
        inc_forge_api_error("create issue", 422);
        observe_tool_duration("aa.tool", Duration::from_millis(50));
        let text = render_prometheus();
        let aa = text.find("toolhub_tool_calls_total{tool=\"aa.tool\"").unwrap();
        let zz = text.find("toolhub_tool_calls_total{tool=\"zz.tool\"").unwrap();
        assert!(aa < zz);
        assert!(text.contains("# TYPE toolhub_tool_calls_total counter"));
        assert!(text.contains(
            "toolhub_github_api_errors_total{operation=\"create issue\",status_code=\"422\"}"
        ));
        assert!(text.contains("toolhub_tool_duration_seconds_bucket{tool=\"aa.tool\",le=\"0.1\"} 1"));
    }
}
