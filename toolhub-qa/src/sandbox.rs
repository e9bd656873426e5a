// toolhub-qa/src/sandbox.rs
// ============================================================================
// Module: QA Sandbox Runner
// Description: Docker-wrapped QA command execution.
// Purpose: Run QA commands with no network and bounded resources.
// Dependencies: toolhub-core, toolhub-telemetry, tokio
// ============================================================================

//! ## Overview
//! The sandbox backend wraps the already-validated command in
//! `docker run --rm --network none --cpus 1 --memory 512m`, bind-mounting
//! the host work directory at the container work directory. Timeouts and
//! output caps match the local backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use tokio::process::Command;
use toolhub_core::QaError;
use toolhub_core::QaErrorCode;
use toolhub_core::QaOutcome;
use toolhub_core::QaReport;

use crate::runner::split_command_line;
use crate::runner::truncate_output;
use crate::runner::validate_command_line;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the sandbox backend.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Container image to run.
    pub image: String,
    /// Docker binary name or path.
    pub docker_binary: String,
    /// Work directory inside the container.
    pub container_work_dir: String,
    /// Hard timeout per command.
    pub timeout: Duration,
    /// Per-stream output cap in bytes.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "rust:1.88".to_string(),
            docker_binary: "docker".to_string(),
            container_work_dir: "/workspace".to_string(),
            timeout: Duration::from_secs(600),
            max_output_bytes: 256 * 1024,
        }
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Docker-wrapped QA command runner.
#[derive(Debug)]
pub struct SandboxRunner {
    /// Normalized configuration.
    config: SandboxConfig,
}

impl SandboxRunner {
    /// Creates a sandbox runner, normalizing empty config values.
    #[must_use]
    pub fn new(mut config: SandboxConfig) -> Self {
        if config.image.trim().is_empty() {
            config.image = "rust:1.88".to_string();
        }
        if config.docker_binary.trim().is_empty() {
            config.docker_binary = "docker".to_string();
        }
        if config.container_work_dir.trim().is_empty() {
            config.container_work_dir = "/workspace".to_string();
        }
        if config.timeout.is_zero() {
            config.timeout = Duration::from_secs(600);
        }
        if config.max_output_bytes == 0 {
            config.max_output_bytes = 256 * 1024;
        }
        Self {
            config,
        }
    }

    /// Runs a validated command inside the sandbox container.
    pub async fn run_command(&self, command_line: &str, host_work_dir: &str) -> QaOutcome {
        if let Err(err) = validate_command_line(command_line) {
            return QaOutcome {
                report: QaReport::default(),
                error: Some(err),
            };
        }
        let command_args = match split_command_line(command_line) {
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

        let mut docker_args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--network".to_string(),
            "none".to_string(),
            "--cpus".to_string(),
            "1".to_string(),
            "--memory".to_string(),
            "512m".to_string(),
            "-w".to_string(),
            self.config.container_work_dir.clone(),
            "-v".to_string(),
            format!("{host_work_dir}:{}:rw", self.config.container_work_dir),
            self.config.image.clone(),
        ];
        docker_args.extend(command_args);

        let mut report = QaReport {
            command: format!("{} {}", self.config.docker_binary, docker_args.join(" ")),
            work_dir: host_work_dir.to_string(),
            output_limit_bytes: self.config.max_output_bytes,
            ..QaReport::default()
        };

        let mut command = Command::new(&self.config.docker_binary);
        command.args(&docker_args).kill_on_drop(true);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, command.output()).await;
        report.duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Err(_) => {
                report.exit_code = -1;
                toolhub_telemetry::inc_qa_timeout();
                QaOutcome {
                    report,
                    error: Some(QaError::new(
                        QaErrorCode::Timeout,
                        format!("sandbox qa command timed out after {:?}", self.config.timeout),
                    )),
                }
            }
            Ok(Err(err)) => {
                report.exit_code = -1;
                QaOutcome {
                    report,
                    error: Some(QaError::new(
                        QaErrorCode::ExecutionFailed,
                        format!("sandbox qa command failed to start: {err}"),
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
                            format!("sandbox qa command failed with exit code {exit_code}"),
                        )),
                    }
                }
            }
        }
    }
}
