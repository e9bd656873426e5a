// toolhub-core/src/core/patch.rs
// ============================================================================
// Module: ToolHub Patch Generation
// Description: Whole-file unified diff rendering for audit previews.
// Purpose: Produce reviewable diffs without touching version control.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The patch generator renders a whole-file unified diff: one hunk that
//! removes every original line and adds every modified line. It exists for
//! audit previews and patch artifacts, not for minimal-diff application.

// ============================================================================
// SECTION: Diff Rendering
// ============================================================================

/// Renders a whole-file unified diff for one path.
#[must_use]
pub fn generate_unified_diff(path: &str, original_content: &str, modified_content: &str) -> String {
    let mut clean_path = path.trim();
    clean_path = clean_path.strip_prefix("./").unwrap_or(clean_path);
    if clean_path.is_empty() {
        clean_path = "unknown.txt";
    }

    let original_lines = split_lines(original_content);
    let modified_lines = split_lines(modified_content);

    let mut out = String::new();
    out.push_str(&format!("diff --git a/{clean_path} b/{clean_path}\n"));
    out.push_str(&format!("--- a/{clean_path}\n"));
    out.push_str(&format!("+++ b/{clean_path}\n"));
    out.push_str(&format!("@@ -1,{} +1,{} @@\n", original_lines.len(), modified_lines.len()));

    for line in &original_lines {
        out.push('-');
        out.push_str(line);
        out.push('\n');
    }
    for line in &modified_lines {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }

    out
}

/// Counts content lines using the diff line-splitting rules.
#[must_use]
pub fn count_content_lines(content: &str) -> i64 {
    split_lines(content).len() as i64
}

/// Splits content into lines, normalizing CRLF and ignoring one trailing newline.
fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line)).collect()
}
