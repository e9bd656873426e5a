// toolhub-core/tests/patch.rs
// ============================================================================
// Module: Patch Generation Tests
// Description: Validate whole-file unified diff rendering.
// Purpose: Keep patch artifacts stable and reviewable.
// Dependencies: toolhub-core
// ============================================================================

//! ## Overview
//! The generator emits one hunk removing every original line and adding every
//! modified line, with CRLF normalization and path cleanup.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use toolhub_core::count_content_lines;
use toolhub_core::generate_unified_diff;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn diff_has_git_headers_and_hunk() {
    let patch = generate_unified_diff("src/main.rs", "old\n", "new one\nnew two\n");
    assert!(patch.starts_with("diff --git a/src/main.rs b/src/main.rs\n"));
    assert!(patch.contains("--- a/src/main.rs\n"));
    assert!(patch.contains("+++ b/src/main.rs\n"));
    assert!(patch.contains("@@ -1,1 +1,2 @@\n"));
    assert!(patch.contains("-old\n"));
    assert!(patch.contains("+new one\n"));
    assert!(patch.contains("+new two\n"));
}

#[test]
fn diff_cleans_path_and_defaults_empty_paths() {
    let patch = generate_unified_diff("./lib.rs", "", "x");
    assert!(patch.starts_with("diff --git a/lib.rs b/lib.rs\n"));
    let fallback = generate_unified_diff("  ", "", "x");
    assert!(fallback.starts_with("diff --git a/unknown.txt b/unknown.txt\n"));
}

#[test]
fn empty_content_renders_zero_line_sides() {
    let patch = generate_unified_diff("a.txt", "", "one\n");
    assert!(patch.contains("@@ -1,0 +1,1 @@\n"));
}

#[test]
fn line_counts_normalize_crlf_and_trailing_newline() {
    assert_eq!(count_content_lines(""), 0);
    assert_eq!(count_content_lines("\n"), 0);
    assert_eq!(count_content_lines("a"), 1);
    assert_eq!(count_content_lines("a\n"), 1);
    assert_eq!(count_content_lines("a\r\nb\r\n"), 2);
    assert_eq!(count_content_lines("a\n\n"), 2);
}

#[test]
fn line_delta_matches_counts() {
    let original = "a\nb\n";
    let modified = "a\nb\nc\nd\n";
    let delta = count_content_lines(modified) - count_content_lines(original);
    assert_eq!(delta, 2);
}
