// toolhub-qa/src/runner.rs
// ============================================================================
// Module: QA Runner
// Description: Allowlisted local command execution with caps and timeouts.
// Purpose: Run the configured test/lint commands and capture evidence.
// Dependencies: toolhub-core, toolhub-telemetry, tokio
// ============================================================================

//! ## Overview
//! Commands are server-configured, never user-supplied. Validation rejects
//! shell metacharacters and executables outside the allowlist before anything
//! is spawned. A semaphore caps concurrent executions; a task that cannot
//! acquire a slot before its request context expires fails with
//! `qa_concurrency_exceeded`. Timeouts are enforced with the runner's own
//! timer and reported distinctly from cancellation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use toolhub_core::QaError;
use toolhub_core::QaErrorCode;
use toolhub_core::QaExecutor;
use toolhub_core::QaKind;
use toolhub_core::QaOutcome;
use toolhub_core::QaReport;

use crate::sandbox::SandboxConfig;
use crate::sandbox::SandboxRunner;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// Default per-stream output cap in bytes.
const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;
/// Default concurrency cap.
const DEFAULT_MAX_CONCURRENCY: usize = 2;
/// Default executable allowlist.
const DEFAULT_ALLOWED_EXECUTABLES: [&str; 12] = [
    "cargo", "make", "pytest", "python", "python3", "npm", "npx", "yarn", "pnpm", "ruff",
    "eslint", "go",
];
/// Shell operators that are never allowed in a configured command.
const FORBIDDEN_TOKENS: [&str; 9] = ["&&", "||", ";", "|", "$(", "`", ">", "<", "\n"];
/// Truncation notice appended to capped output.
const TRUNCATION_NOTICE: &str = "\n[output truncated]";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Execution backend for QA commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QaBackend {
    /// Spawn the command directly on the host.
    #[default]
    Local,
    /// Wrap the command in a network-isolated docker container.
    Sandbox,
}

impl QaBackend {
    /// Parses the configured backend name.
    ///
    /// # Errors
    ///
    /// Returns [`QaError`] with `qa_backend_invalid` for unknown names.
    pub fn parse(value: &str) -> Result<Self, QaError> {
        match value.trim() {
            "" | "local" => Ok(Self::Local),
            "sandbox" => Ok(Self::Sandbox),
            other => Err(QaError::new(
                QaErrorCode::BackendInvalid,
                format!("unsupported qa backend: {other}"),
            )),
        }
    }
}

/// Configuration for the QA runner.
#[derive(Debug, Clone)]
pub struct QaRunnerConfig {
    /// Working directory commands run in.
    pub work_dir: PathBuf,
    /// Configured test command line.
    pub test_cmd: String,
    /// Configured lint command line.
    pub lint_cmd: String,
    /// Hard timeout per command.
    pub timeout: Duration,
    /// Per-stream output cap in bytes.
    pub max_output_bytes: usize,
    /// Concurrency cap across all QA requests.
    pub max_concurrency: usize,
    /// Execution backend.
    pub backend: QaBackend,
    /// Sandbox settings, used when the backend is `Sandbox`.
    pub sandbox: SandboxConfig,
    /// Allowed executables; empty selects the default allowlist.
    pub allowed_executables: Vec<String>,
}

impl Default for QaRunnerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            test_cmd: "cargo test".to_string(),
            lint_cmd: "cargo clippy".to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            backend: QaBackend::Local,
            sandbox: SandboxConfig::default(),
            allowed_executables: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Allowlisted QA command runner.
#[derive(Debug)]
pub struct QaRunner {
    /// Normalized configuration.
    config: QaRunnerConfig,
    /// Allowed executable set.
    allowed_executables: BTreeSet<String>,
    /// Concurrency semaphore.
    semaphore: Arc<Semaphore>,
    /// Sandbox runner when the backend is `Sandbox`.
    sandbox: Option<SandboxRunner>,
}

impl QaRunner {
    /// Builds a runner, validating both configured commands up front.
    ///
    /// # Errors
    ///
    /// Returns [`QaError`] when a configured command is empty, contains
    /// forbidden shell syntax, or names an executable outside the allowlist.
    pub fn new(mut config: QaRunnerConfig) -> Result<Self, QaError> {
        if config.work_dir.as_os_str().is_empty() {
            config.work_dir = PathBuf::from(".");
        }
        if config.timeout.is_zero() {
            config.timeout = DEFAULT_TIMEOUT;
        }
        if config.max_output_bytes == 0 {
            config.max_output_bytes = DEFAULT_MAX_OUTPUT_BYTES;
        }
        if config.max_concurrency == 0 {
            config.max_concurrency = DEFAULT_MAX_CONCURRENCY;
        }
        let allowed_executables: BTreeSet<String> = if config.allowed_executables.is_empty() {
            DEFAULT_ALLOWED_EXECUTABLES.iter().map(|exe| (*exe).to_string()).collect()
        } else {
            config
                .allowed_executables
                .iter()
                .map(|exe| exe.trim().to_string())
                .filter(|exe| !exe.is_empty())
                .collect()
        };
        validate_configured_command(&config.test_cmd, &allowed_executables)?;
        validate_configured_command(&config.lint_cmd, &allowed_executables)?;
        let sandbox = match config.backend {
            QaBackend::Local => None,
            QaBackend::Sandbox => Some(SandboxRunner::new(SandboxConfig {
                timeout: config.timeout,
                max_output_bytes: config.max_output_bytes,
                ..config.sandbox.clone()
            })),
        };
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Ok(Self {
            config,
            allowed_executables,
            semaphore,
            sandbox,
        })
    }

    /// Returns the sorted executable allowlist.
    #[must_use]
    pub fn allowed_executables(&self) -> Vec<String> {
        self.allowed_executables.iter().cloned().collect()
    }

    /// Returns the configured command line for a kind.
    fn command_for(&self, kind: QaKind) -> &str {
        match kind {
            QaKind::Test => &self.config.test_cmd,
            QaKind::Lint => &self.config.lint_cmd,
        }
    }

    /// Resolves the absolute working directory.
    fn abs_work_dir(&self) -> Result<String, QaError> {
        if self.config.work_dir.as_os_str().is_empty() {
            return Err(QaError::new(QaErrorCode::WorkdirInvalid, "qa workdir is empty"));
        }
        std::path::absolute(&self.config.work_dir)
            .map(|path| path.display().to_string())
            .map_err(|err| QaError::new(QaErrorCode::WorkdirInvalid, err.to_string()))
    }

    /// Executes a validated command on the host.
    async fn run_local(&self, command_line: &str, work_dir: &str) -> QaOutcome {
        let args = match split_command_line(command_line) {
            Ok(args) if !args.is_empty() => args,
            Ok(_) => {
                return QaOutcome {
                    report: QaReport::default(),
                    error: Some(QaError::new(QaErrorCode::CommandEmpty, "qa command is empty")),
                };
            }
            Err(err) => {
                return QaOutcome {
                    report: QaReport::default(),
                    error: Some(err),
                };
            }
        };

        let mut report = QaReport {
            command: command_line.to_string(),
            work_dir: work_dir.to_string(),
            output_limit_bytes: self.config.max_output_bytes,
            ..QaReport::default()
        };

        let mut command = Command::new(&args[0]);
        command.args(&args[1..]).current_dir(work_dir).kill_on_drop(true);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, command.output()).await;
        report.duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Err(_) => {
                report.exit_code = -1;
                toolhub_telemetry::inc_qa_timeout();
                let error = QaError::new(
                    QaErrorCode::Timeout,
                    format!("qa command timed out after {:?}", self.config.timeout),
                );
                QaOutcome {
                    report,
                    error: Some(error),
                }
            }
            Ok(Err(err)) => {
                report.exit_code = -1;
                QaOutcome {
                    report,
                    error: Some(QaError::new(
                        QaErrorCode::ExecutionFailed,
                        format!("qa command failed to start: {err}"),
                    )),
                }
            }
            Ok(Ok(output)) => {
                let (stdout, stdout_truncated) = truncate_output(
                    &String::from_utf8_lossy(&output.stdout),
                    self.config.max_output_bytes,
                );
                let (stderr, stderr_truncated) = truncate_output(
                    &String::from_utf8_lossy(&output.stderr),
                    self.config.max_output_bytes,
                );
                report.stdout = stdout;
                report.stderr = stderr;
                report.stdout_truncated = stdout_truncated;
                report.stderr_truncated = stderr_truncated;
                if output.status.success() {
                    QaOutcome {
                        report,
                        error: None,
                    }
                } else {
                    let exit_code = output.status.code().unwrap_or(-1);
                    report.exit_code = exit_code;
                    QaOutcome {
                        report,
                        error: Some(QaError::new(
                            QaErrorCode::ExecutionFailed,
                            format!("qa command failed with exit code {exit_code}"),
                        )),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl QaExecutor for QaRunner {
    async fn run(&self, kind: QaKind, dry_run: bool) -> Result<QaOutcome, QaError> {
        let Ok(_permit) = self.semaphore.clone().try_acquire_owned() else {
            return Err(QaError::new(
                QaErrorCode::ConcurrencyExceeded,
                "qa concurrency limit exceeded",
            ));
        };

        let command_line = self.command_for(kind).to_string();
        validate_command_line(&command_line)?;
        let args = split_command_line(&command_line)?;
        let Some(executable) = args.first() else {
            return Err(QaError::new(QaErrorCode::CommandEmpty, "qa command is empty"));
        };
        if !self.allowed_executables.contains(executable) {
            return Err(QaError::new(
                QaErrorCode::CommandNotAllowed,
                format!("qa executable {executable:?} is not in allowlist"),
            ));
        }
        let work_dir = self.abs_work_dir()?;

        if dry_run {
            return Ok(QaOutcome {
                report: QaReport {
                    command: command_line,
                    work_dir,
                    output_limit_bytes: self.config.max_output_bytes,
                    ..QaReport::default()
                },
                error: None,
            });
        }

        if let Some(sandbox) = &self.sandbox {
            return Ok(sandbox.run_command(&command_line, &work_dir).await);
        }
        Ok(self.run_local(&command_line, &work_dir).await)
    }
}

// ============================================================================
// SECTION: Command Validation
// ============================================================================

/// Validates a configured command against the allowlist at startup.
fn validate_configured_command(
    command_line: &str,
    allowed_executables: &BTreeSet<String>,
) -> Result<(), QaError> {
    validate_command_line(command_line)?;
    let args = split_command_line(command_line)?;
    let Some(executable) = args.first() else {
        return Err(QaError::new(QaErrorCode::CommandEmpty, "qa command is empty"));
    };
    if !allowed_executables.contains(executable) {
        return Err(QaError::new(
            QaErrorCode::CommandNotAllowed,
            format!("qa executable {executable:?} is not in allowlist"),
        ));
    }
    Ok(())
}

/// Rejects empty commands and shell metacharacters.
///
/// # Errors
///
/// Returns [`QaError`] with `qa_command_empty` or `qa_command_invalid`.
pub fn validate_command_line(command_line: &str) -> Result<(), QaError> {
    let trimmed = command_line.trim();
    if trimmed.is_empty() {
        return Err(QaError::new(QaErrorCode::CommandEmpty, "qa command is empty"));
    }
    for token in FORBIDDEN_TOKENS {
        if trimmed.contains(token) {
            return Err(QaError::new(
                QaErrorCode::CommandInvalid,
                format!("qa command contains forbidden shell operator {token:?}"),
            ));
        }
    }
    if trimmed.contains('\r') {
        return Err(QaError::new(
            QaErrorCode::CommandInvalid,
            "qa command contains forbidden shell operator \"\\r\"",
        ));
    }
    Ok(())
}

/// Splits a command line on whitespace, honoring quotes and escapes.
///
/// # Errors
///
/// Returns [`QaError`] with `qa_command_invalid` for unterminated quotes or
/// escapes.
pub fn split_command_line(input: &str) -> Result<Vec<String>, QaError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    let mut token = String::new();
    let mut quote: Option<char> = None;
    let mut escape = false;

    for c in trimmed.chars() {
        if escape {
            token.push(c);
            escape = false;
            continue;
        }
        if let Some(open) = quote {
            if c == open {
                quote = None;
            } else {
                token.push(c);
            }
            continue;
        }
        match c {
            '\\' => escape = true,
            '\'' | '"' => quote = Some(c),
            ' ' | '\t' => {
                if !token.is_empty() {
                    args.push(std::mem::take(&mut token));
                }
            }
            other => token.push(other),
        }
    }

    if escape {
        return Err(QaError::new(QaErrorCode::CommandInvalid, "unterminated escape in qa command"));
    }
    if quote.is_some() {
        return Err(QaError::new(QaErrorCode::CommandInvalid, "unterminated quote in qa command"));
    }
    if !token.is_empty() {
        args.push(token);
    }
    Ok(args)
}

/// Truncates output to the cap, appending the truncation notice.
#[must_use]
pub fn truncate_output(text: &str, max_bytes: usize) -> (String, bool) {
    if max_bytes == 0 || text.len() <= max_bytes {
        return (text.to_string(), false);
    }
    if max_bytes <= TRUNCATION_NOTICE.len() {
        let mut cut = max_bytes;
        while !TRUNCATION_NOTICE.is_char_boundary(cut) {
            cut -= 1;
        }
        return (TRUNCATION_NOTICE[..cut].to_string(), true);
    }
    let mut cut = max_bytes - TRUNCATION_NOTICE.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    (format!("{}{TRUNCATION_NOTICE}", &text[..cut]), true)
}
