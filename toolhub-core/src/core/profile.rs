// toolhub-core/src/core/profile.rs
// ============================================================================
// Module: ToolHub Environment Profiles
// Description: Per-environment default configuration values.
// Purpose: Provide dev/staging/prod defaults that explicit env overrides.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Profiles provide defaults only; explicit environment variables always win.
//! Prod tightens the path policy, shortens QA timeouts, switches batches to
//! strict mode, and lowers the repair iteration cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Profile Defaults
// ============================================================================

/// Environment-specific default configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDefaults {
    /// Profile name.
    pub name: &'static str,
    /// Default forbidden path prefixes (CSV; built-ins are merged in anyway).
    pub path_policy_forbidden_prefixes: &'static str,
    /// Default approval-required path prefixes (CSV).
    pub path_policy_approval_prefixes: &'static str,
    /// Default QA timeout in seconds.
    pub qa_timeout_seconds: u64,
    /// Default batch mode.
    pub batch_mode: &'static str,
    /// Default cap on repair loop iterations.
    pub repair_max_iterations: u32,
}

/// Profile loading errors.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown profile {name:?} (valid: dev, staging, prod)")]
pub struct ProfileError {
    /// Rejected profile name.
    pub name: String,
}

/// Returns profile defaults for the given name.
///
/// An empty name defaults to `dev`.
///
/// # Errors
///
/// Returns [`ProfileError`] for unknown names.
pub fn load_profile(name: &str) -> Result<ProfileDefaults, ProfileError> {
    let normalized = name.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "" | "dev" => Ok(ProfileDefaults {
            name: "dev",
            path_policy_forbidden_prefixes: ".github/,.git/,secrets/,.env",
            path_policy_approval_prefixes: "",
            qa_timeout_seconds: 600,
            batch_mode: "partial",
            repair_max_iterations: 3,
        }),
        "staging" => Ok(ProfileDefaults {
            name: "staging",
            path_policy_forbidden_prefixes: ".github/,.git/,secrets/,.env,infra/",
            path_policy_approval_prefixes: "db/init/",
            qa_timeout_seconds: 600,
            batch_mode: "partial",
            repair_max_iterations: 3,
        }),
        "prod" => Ok(ProfileDefaults {
            name: "prod",
            path_policy_forbidden_prefixes: ".github/,.git/,secrets/,.env,infra/,deploy/,terraform/",
            path_policy_approval_prefixes: "db/init/,db/migrations/",
            qa_timeout_seconds: 300,
            batch_mode: "strict",
            repair_max_iterations: 2,
        }),
        _ => Err(ProfileError {
            name: name.to_string(),
        }),
    }
}
