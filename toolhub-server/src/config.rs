// toolhub-server/src/config.rs
// ============================================================================
// Module: ToolHub Server Configuration
// Description: Environment-driven configuration with profile defaults.
// Purpose: Fail-closed parsing of every recognized environment option.
// Dependencies: toolhub-core, thiserror
// ============================================================================

//! ## Overview
//! Configuration starts from the profile selected by `TOOLHUB_PROFILE` and
//! applies explicit environment overrides on top; explicit values always
//! win. Invalid values fail startup rather than degrading silently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use toolhub_core::BatchMode;
use toolhub_core::ProfileDefaults;
use toolhub_core::load_profile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default HTTP bind address.
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
/// Default MCP bind address.
const DEFAULT_MCP_ADDR: &str = "0.0.0.0:8090";
/// Default SQLite database path.
const DEFAULT_DATABASE_PATH: &str = "toolhub.sqlite";
/// Default artifacts directory.
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
/// Upper bound accepted for `REPAIR_MAX_ITERATIONS`.
const REPAIR_ITERATIONS_MAX: u32 = 10;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed to parse or violated its bounds.
    #[error("invalid {name}: {detail}")]
    Invalid {
        /// Environment variable name.
        name: &'static str,
        /// Failure detail.
        detail: String,
    },
    /// A required value is missing.
    #[error("missing required {0}")]
    Missing(&'static str),
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// QA runner settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct QaSettings {
    /// Working directory for QA commands.
    pub work_dir: PathBuf,
    /// Configured test command.
    pub test_cmd: String,
    /// Configured lint command.
    pub lint_cmd: String,
    /// Hard timeout per command.
    pub timeout: Duration,
    /// Per-stream output cap in bytes.
    pub max_output_bytes: usize,
    /// Concurrency cap.
    pub max_concurrency: usize,
    /// Executable allowlist (empty selects runner defaults).
    pub allowed_executables: Vec<String>,
    /// Backend name (`local` or `sandbox`).
    pub backend: String,
    /// Sandbox image.
    pub sandbox_image: String,
    /// Sandbox docker binary.
    pub sandbox_docker_bin: String,
    /// Sandbox container work directory.
    pub sandbox_container_workdir: String,
}

/// Git runner settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct CodeSettings {
    /// Work tree the git runner operates in.
    pub work_dir: PathBuf,
    /// Remote pushed to.
    pub remote: String,
}

/// GitHub App identity settings.
#[derive(Debug, Clone)]
pub struct GithubSettings {
    /// App identifier.
    pub app_id: u64,
    /// Installation identifier; auto-discovered when absent.
    pub installation_id: Option<u64>,
    /// Path to the app private key PEM.
    pub private_key_path: PathBuf,
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Selected profile defaults.
    pub profile: ProfileDefaults,
    /// HTTP bind address.
    pub http_addr: String,
    /// MCP bind address.
    pub mcp_addr: String,
    /// SQLite database path.
    pub database_path: PathBuf,
    /// Artifacts root directory.
    pub artifacts_dir: PathBuf,
    /// Comma-separated repo allowlist.
    pub repo_allowlist: String,
    /// Comma-separated tool allowlist.
    pub tool_allowlist: String,
    /// Resolved forbidden path prefixes (CSV).
    pub forbidden_prefixes: String,
    /// Resolved approval path prefixes (CSV).
    pub approval_prefixes: String,
    /// Resolved batch mode.
    pub batch_mode: BatchMode,
    /// QA runner settings.
    pub qa: QaSettings,
    /// Git runner settings.
    pub code: CodeSettings,
    /// Repair loop iteration cap.
    pub repair_max_iterations: u32,
    /// GitHub identity, when configured.
    pub github: Option<GithubSettings>,
}

impl ServerConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Loads configuration through a lookup function (testable).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid values.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let profile_name = lookup("TOOLHUB_PROFILE").unwrap_or_default();
        let profile = load_profile(&profile_name).map_err(|err| ConfigError::Invalid {
            name: "TOOLHUB_PROFILE",
            detail: err.to_string(),
        })?;

        let batch_mode_raw =
            lookup("BATCH_MODE").unwrap_or_else(|| profile.batch_mode.to_string());
        let batch_mode: BatchMode =
            batch_mode_raw.parse().map_err(|err: toolhub_core::batch::BatchModeParseError| {
                ConfigError::Invalid {
                    name: "BATCH_MODE",
                    detail: err.to_string(),
                }
            })?;

        let qa_timeout_seconds = parse_positive_u64(
            lookup("QA_TIMEOUT_SECONDS"),
            profile.qa_timeout_seconds,
            "QA_TIMEOUT_SECONDS",
        )?;
        let qa_max_output_bytes =
            parse_positive_u64(lookup("QA_MAX_OUTPUT_BYTES"), 256 * 1024, "QA_MAX_OUTPUT_BYTES")?;
        let qa_max_concurrency =
            parse_positive_u64(lookup("QA_MAX_CONCURRENCY"), 2, "QA_MAX_CONCURRENCY")?;

        let repair_max_iterations = parse_positive_u64(
            lookup("REPAIR_MAX_ITERATIONS"),
            u64::from(profile.repair_max_iterations),
            "REPAIR_MAX_ITERATIONS",
        )?;
        let repair_max_iterations = u32::try_from(repair_max_iterations)
            .ok()
            .filter(|value| (1..=REPAIR_ITERATIONS_MAX).contains(value))
            .ok_or_else(|| ConfigError::Invalid {
                name: "REPAIR_MAX_ITERATIONS",
                detail: format!("must be between 1 and {REPAIR_ITERATIONS_MAX}"),
            })?;

        let github = match lookup("GITHUB_APP_ID") {
            None => None,
            Some(raw_app_id) => {
                let app_id =
                    raw_app_id.trim().parse::<u64>().map_err(|err| ConfigError::Invalid {
                        name: "GITHUB_APP_ID",
                        detail: err.to_string(),
                    })?;
                let installation_id = match lookup("GITHUB_INSTALLATION_ID") {
                    None => None,
                    Some(raw) => {
                        Some(raw.trim().parse::<u64>().map_err(|err| ConfigError::Invalid {
                            name: "GITHUB_INSTALLATION_ID",
                            detail: err.to_string(),
                        })?)
                    }
                };
                let private_key_path = lookup("GITHUB_PRIVATE_KEY_PATH")
                    .ok_or(ConfigError::Missing("GITHUB_PRIVATE_KEY_PATH"))?;
                Some(GithubSettings {
                    app_id,
                    installation_id,
                    private_key_path: PathBuf::from(private_key_path),
                })
            }
        };

        let qa_work_dir = lookup("QA_WORKDIR").unwrap_or_else(|| ".".to_string());
        Ok(Self {
            http_addr: lookup("TOOLHUB_HTTP_LISTEN")
                .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            mcp_addr: lookup("TOOLHUB_MCP_LISTEN")
                .unwrap_or_else(|| DEFAULT_MCP_ADDR.to_string()),
            database_path: PathBuf::from(
                lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            ),
            artifacts_dir: PathBuf::from(
                lookup("ARTIFACTS_DIR").unwrap_or_else(|| DEFAULT_ARTIFACTS_DIR.to_string()),
            ),
            repo_allowlist: lookup("REPO_ALLOWLIST").unwrap_or_default(),
            tool_allowlist: lookup("TOOL_ALLOWLIST").unwrap_or_default(),
            forbidden_prefixes: lookup("PATH_POLICY_FORBIDDEN_PREFIXES")
                .unwrap_or_else(|| profile.path_policy_forbidden_prefixes.to_string()),
            approval_prefixes: lookup("PATH_POLICY_APPROVAL_PREFIXES")
                .unwrap_or_else(|| profile.path_policy_approval_prefixes.to_string()),
            batch_mode,
            code: CodeSettings {
                work_dir: PathBuf::from(
                    lookup("CODE_WORKDIR").unwrap_or_else(|| qa_work_dir.clone()),
                ),
                remote: lookup("CODE_GIT_REMOTE").unwrap_or_else(|| "origin".to_string()),
            },
            qa: QaSettings {
                work_dir: PathBuf::from(qa_work_dir),
                test_cmd: lookup("QA_TEST_CMD").unwrap_or_else(|| "cargo test".to_string()),
                lint_cmd: lookup("QA_LINT_CMD").unwrap_or_else(|| "cargo clippy".to_string()),
                timeout: Duration::from_secs(qa_timeout_seconds),
                max_output_bytes: qa_max_output_bytes as usize,
                max_concurrency: qa_max_concurrency as usize,
                allowed_executables: lookup("QA_ALLOWED_EXECUTABLES")
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|item| !item.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                backend: lookup("QA_BACKEND").unwrap_or_else(|| "local".to_string()),
                sandbox_image: lookup("QA_SANDBOX_IMAGE").unwrap_or_default(),
                sandbox_docker_bin: lookup("QA_SANDBOX_DOCKER_BIN").unwrap_or_default(),
                sandbox_container_workdir: lookup("QA_SANDBOX_CONTAINER_WORKDIR")
                    .unwrap_or_default(),
            },
            repair_max_iterations,
            github,
            profile,
        })
    }
}

// ============================================================================
// SECTION: Parsing Helpers
// ============================================================================

/// Parses an optional positive integer, falling back to a default.
fn parse_positive_u64(
    value: Option<String>,
    default: u64,
    name: &'static str,
) -> Result<u64, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(default);
    }
    match trimmed.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        Ok(_) => Err(ConfigError::Invalid {
            name,
            detail: "must be greater than zero".to_string(),
        }),
        Err(err) => Err(ConfigError::Invalid {
            name,
            detail: err.to_string(),
        }),
    }
}
