// toolhub-core/src/core/policy.rs
// ============================================================================
// Module: ToolHub Policy
// Description: Repo/tool allowlists and path policy with immutable built-ins.
// Purpose: Decide whether a repo, tool, or file path may be touched.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Policy is populated once at startup from comma-separated environment
//! values and read-only thereafter. Empty allowlists deny everything. The
//! built-in forbidden path prefixes are always merged into any configured
//! set; configuration can extend the forbidden list but never shrink it.
//! Paths that cannot be canonicalized are treated as requiring approval.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Forbidden path prefixes that are always enforced.
const BUILTIN_FORBIDDEN_PREFIXES: [&str; 4] = [".github/", ".git/", "secrets/", ".env"];

// ============================================================================
// SECTION: Violations
// ============================================================================

/// Stable code identifying the kind of path policy violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyViolationCode {
    /// The canonical path matched a forbidden prefix.
    PathPolicyForbidden,
    /// The path matched an approval-required prefix.
    PathPolicyApprovalRequired,
    /// The path escaped the repository root.
    PathPolicyTraversal,
    /// The path was blank.
    PathPolicyEmpty,
}

impl PolicyViolationCode {
    /// Returns the stable wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PathPolicyForbidden => "path_policy_forbidden",
            Self::PathPolicyApprovalRequired => "path_policy_approval_required",
            Self::PathPolicyTraversal => "path_policy_traversal",
            Self::PathPolicyEmpty => "path_policy_empty",
        }
    }
}

/// Structured path policy violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    /// Violation code.
    pub code: PolicyViolationCode,
    /// Offending path as supplied by the caller.
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.code.as_str(), self.path, self.reason)
    }
}

impl std::error::Error for PolicyViolation {}

/// Policy check errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The repo is not in the allowlist, or the allowlist is empty.
    #[error("repo {0:?} not in allowlist")]
    RepoNotAllowed(String),
    /// The tool is not in the allowlist, or the allowlist is empty.
    #[error("tool {0:?} not in allowlist")]
    ToolNotAllowed(String),
    /// A path failed policy checks.
    #[error(transparent)]
    Violation(#[from] PolicyViolation),
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Repo/tool allowlists and path policy, immutable per process.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Allowed repositories (`owner/name`); empty means deny all.
    allowed_repos: BTreeSet<String>,
    /// Allowed canonical tool names; empty means deny all.
    allowed_tools: BTreeSet<String>,
    /// Forbidden path prefixes: built-ins plus configured extensions.
    forbidden_path_prefixes: Vec<String>,
    /// Path prefixes that require an approval before writes.
    approval_path_prefixes: Vec<String>,
}

impl Policy {
    /// Creates a policy from comma-separated allowlist strings.
    ///
    /// Empty strings mean "allow nothing".
    #[must_use]
    pub fn new(repo_csv: &str, tool_csv: &str) -> Self {
        Self {
            allowed_repos: parse_csv(repo_csv),
            allowed_tools: parse_csv(tool_csv),
            forbidden_path_prefixes: BUILTIN_FORBIDDEN_PREFIXES
                .iter()
                .map(|prefix| (*prefix).to_string())
                .collect(),
            approval_path_prefixes: Vec::new(),
        }
    }

    /// Replaces the path policy, merging built-ins into the forbidden set.
    pub fn set_path_policy(&mut self, forbidden_csv: &str, approval_csv: &str) {
        self.forbidden_path_prefixes =
            merge_unique_prefixes(&BUILTIN_FORBIDDEN_PREFIXES, &parse_prefixes_csv(forbidden_csv));
        self.approval_path_prefixes = parse_prefixes_csv(approval_csv);
    }

    /// Checks that the repo is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::RepoNotAllowed`] when the repo is absent from
    /// the allowlist or the allowlist is empty.
    pub fn check_repo(&self, repo: &str) -> Result<(), PolicyError> {
        if self.allowed_repos.is_empty() || !self.allowed_repos.contains(repo) {
            return Err(PolicyError::RepoNotAllowed(repo.to_string()));
        }
        Ok(())
    }

    /// Checks that the tool is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ToolNotAllowed`] when the tool is absent from
    /// the allowlist or the allowlist is empty.
    pub fn check_tool(&self, tool_name: &str) -> Result<(), PolicyError> {
        if self.allowed_tools.is_empty() || !self.allowed_tools.contains(tool_name) {
            return Err(PolicyError::ToolNotAllowed(tool_name.to_string()));
        }
        Ok(())
    }

    /// Checks every path against traversal rules and forbidden prefixes.
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyViolation`] encountered.
    pub fn check_paths<S: AsRef<str>>(&self, paths: &[S]) -> Result<(), PolicyViolation> {
        for raw in paths {
            let raw = raw.as_ref();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(PolicyViolation {
                    code: PolicyViolationCode::PathPolicyEmpty,
                    path: raw.to_string(),
                    reason: "path is empty".to_string(),
                });
            }
            let path = match canonicalize_path(trimmed) {
                Ok(path) => path,
                Err(reason) => {
                    return Err(PolicyViolation {
                        code: PolicyViolationCode::PathPolicyTraversal,
                        path: raw.to_string(),
                        reason,
                    });
                }
            };
            for prefix in &self.forbidden_path_prefixes {
                if matches_forbidden_prefix(&path, prefix) {
                    return Err(PolicyViolation {
                        code: PolicyViolationCode::PathPolicyForbidden,
                        path: raw.to_string(),
                        reason: format!("matched forbidden prefix {prefix:?}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns true when any path matches an approval prefix.
    ///
    /// Paths that cannot be canonicalized require approval (fail-safe).
    #[must_use]
    pub fn requires_approval<S: AsRef<str>>(&self, paths: &[S]) -> bool {
        for raw in paths {
            let Ok(path) = canonicalize_path(raw.as_ref()) else {
                return true;
            };
            for prefix in &self.approval_path_prefixes {
                if path.starts_with(prefix.as_str()) {
                    return true;
                }
            }
        }
        false
    }
}

// ============================================================================
// SECTION: Prefix Matching
// ============================================================================

/// Applies the forbidden-prefix matching semantics to a canonical path.
///
/// Prefixes ending in `/` and plain prefixes use string-prefix matching.
/// Dotfile prefixes (leading `.`, no trailing `/`) match the exact file and
/// any `prefix.<suffix>` variant, so `.env` blocks `.env.local` but not
/// `.environment`.
fn matches_forbidden_prefix(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    if prefix.starts_with('.') {
        return path == prefix || path.starts_with(&format!("{prefix}."));
    }
    path.starts_with(prefix)
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Resolves traversal sequences and rejects unsafe paths.
///
/// Collapses `.` and `..` segments, then strips any leading `/` or `./`.
/// Paths that escape the root or resolve to the root itself are rejected.
fn canonicalize_path(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty path".to_string());
    }
    if trimmed == ".." || trimmed.starts_with("..\\") {
        return Err("path traversal detected".to_string());
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err("path traversal detected".to_string());
                }
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err("path resolves to root".to_string());
    }
    Ok(segments.join("/"))
}

/// Normalizes a configured prefix value.
fn normalize_prefix(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("./").unwrap_or(value);
    value.strip_prefix('/').unwrap_or(value)
}

// ============================================================================
// SECTION: CSV Parsing
// ============================================================================

/// Parses a comma-separated allowlist into a set.
fn parse_csv(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses comma-separated path prefixes, normalizing each entry.
fn parse_prefixes_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(normalize_prefix)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merges base and extra prefixes, preserving order and deduplicating.
fn merge_unique_prefixes(base: &[&str], extra: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(base.len() + extra.len());
    for prefix in base.iter().map(|prefix| (*prefix).to_string()).chain(extra.iter().cloned()) {
        if seen.insert(prefix.clone()) {
            out.push(prefix);
        }
    }
    out
}
