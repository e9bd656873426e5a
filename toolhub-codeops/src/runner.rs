// toolhub-codeops/src/runner.rs
// ============================================================================
// Module: Git Code Runner
// Description: Branch/commit/push execution with strict input validation.
// Purpose: Apply approved file changes through the git CLI.
// Dependencies: toolhub-core, tokio
// ============================================================================

//! ## Overview
//! Branch names are validated against a conservative character set before any
//! command is built; file paths are confined to the work tree. The planned
//! command list is always returned, and a dry run returns it without
//! executing anything. Rollback resets to the base branch and deletes the
//! head branch locally and on the remote.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use toolhub_core::CodeChangeRequest;
use toolhub_core::CodeChangeResult;
use toolhub_core::CodeOpsError;
use toolhub_core::CodeRunner;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the git runner.
#[derive(Debug, Clone)]
pub struct GitRunnerConfig {
    /// Work tree the runner operates in.
    pub work_dir: PathBuf,
    /// Remote pushed to; defaults to `origin`.
    pub remote: String,
}

impl Default for GitRunnerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            remote: "origin".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Git CLI-backed code runner.
pub struct GitRunner {
    /// Runner configuration.
    config: GitRunnerConfig,
}

impl GitRunner {
    /// Creates a runner, normalizing empty config values to defaults.
    #[must_use]
    pub fn new(mut config: GitRunnerConfig) -> Self {
        if config.work_dir.as_os_str().is_empty() {
            config.work_dir = PathBuf::from(".");
        }
        if config.remote.trim().is_empty() {
            config.remote = "origin".to_string();
        }
        Self {
            config,
        }
    }

    /// Resolves the absolute work tree path.
    fn abs_work_dir(&self) -> Result<PathBuf, CodeOpsError> {
        std::path::absolute(&self.config.work_dir)
            .map_err(|err| CodeOpsError::Git(format!("resolve workdir: {err}")))
    }
}

#[async_trait]
impl CodeRunner for GitRunner {
    async fn execute(&self, request: &CodeChangeRequest) -> Result<CodeChangeResult, CodeOpsError> {
        validate_branch(&request.base_branch)?;
        validate_branch(&request.head_branch)?;
        if request.commit_message.trim().is_empty() {
            return Err(CodeOpsError::InvalidInput("commit_message is required".to_string()));
        }
        if request.files.is_empty() {
            return Err(CodeOpsError::InvalidInput("files is required".to_string()));
        }

        let work_dir = self.abs_work_dir()?;
        let work_dir_display = work_dir.display().to_string();

        let mut commands = vec![
            format!("git -C {work_dir_display:?} checkout {:?}", request.base_branch),
            format!("git -C {work_dir_display:?} checkout -b {:?}", request.head_branch),
        ];
        let mut clean_paths = Vec::with_capacity(request.files.len());
        for file in &request.files {
            let clean_path = safe_relative_path(&file.path)?;
            commands.push(format!("write {clean_path:?}"));
            commands.push(format!("git -C {work_dir_display:?} add {clean_path:?}"));
            clean_paths.push(clean_path);
        }
        commands.push(format!(
            "git -C {work_dir_display:?} commit -m {:?}",
            request.commit_message
        ));
        commands.push(format!(
            "git -C {work_dir_display:?} push -u {:?} {:?}",
            self.config.remote, request.head_branch
        ));

        if request.dry_run {
            return Ok(CodeChangeResult {
                planned_commands: commands,
                commit_hash: None,
            });
        }

        run_git(&work_dir, &["checkout", &request.base_branch]).await?;
        run_git(&work_dir, &["checkout", "-b", &request.head_branch]).await?;

        for (file, clean_path) in request.files.iter().zip(&clean_paths) {
            let full = work_dir.join(clean_path);
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    CodeOpsError::Git(format!("mkdir for file {clean_path:?}: {err}"))
                })?;
            }
            tokio::fs::write(&full, &file.modified_content)
                .await
                .map_err(|err| CodeOpsError::Git(format!("write file {clean_path:?}: {err}")))?;
            run_git(&work_dir, &["add", clean_path]).await?;
        }

        run_git(&work_dir, &["commit", "-m", &request.commit_message]).await?;
        run_git(&work_dir, &["push", "-u", &self.config.remote, &request.head_branch]).await?;

        let head = run_git_output(&work_dir, &["rev-parse", "HEAD"]).await?;
        Ok(CodeChangeResult {
            planned_commands: commands,
            commit_hash: Some(head.trim().to_string()),
        })
    }

    async fn rollback(
        &self,
        base_branch: &str,
        head_branch: &str,
        dry_run: bool,
    ) -> Result<CodeChangeResult, CodeOpsError> {
        validate_branch(base_branch)?;
        validate_branch(head_branch)?;

        let work_dir = self.abs_work_dir()?;
        let work_dir_display = work_dir.display().to_string();
        let commands = vec![
            format!("git -C {work_dir_display:?} checkout {base_branch:?}"),
            format!("git -C {work_dir_display:?} branch -D {head_branch:?}"),
            format!(
                "git -C {work_dir_display:?} push {:?} --delete {head_branch:?}",
                self.config.remote
            ),
        ];

        if dry_run {
            return Ok(CodeChangeResult {
                planned_commands: commands,
                commit_hash: None,
            });
        }

        run_git(&work_dir, &["checkout", base_branch]).await?;
        run_git(&work_dir, &["branch", "-D", head_branch]).await?;
        run_git(&work_dir, &["push", &self.config.remote, "--delete", head_branch]).await?;
        Ok(CodeChangeResult {
            planned_commands: commands,
            commit_hash: None,
        })
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a branch name against a conservative character set.
pub fn validate_branch(name: &str) -> Result<(), CodeOpsError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CodeOpsError::InvalidInput("branch name is required".to_string()));
    }
    let safe_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'));
    if trimmed.starts_with('-') || trimmed.contains("..") || trimmed.contains(' ') || !safe_chars {
        return Err(CodeOpsError::InvalidInput(format!("invalid branch name: {name:?}")));
    }
    Ok(())
}

/// Confines a file path to the work tree.
pub fn safe_relative_path(path: &str) -> Result<String, CodeOpsError> {
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(CodeOpsError::InvalidInput("file path is required".to_string()));
    }
    if trimmed.starts_with('/') {
        return Err(CodeOpsError::InvalidInput(format!(
            "absolute file path is not allowed: {path:?}"
        )));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(CodeOpsError::InvalidInput(format!("unsafe file path: {path:?}")));
                }
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(CodeOpsError::InvalidInput(format!("unsafe file path: {path:?}")));
    }
    Ok(segments.join("/"))
}

// ============================================================================
// SECTION: Git Execution
// ============================================================================

/// Runs a git command, discarding output.
async fn run_git(work_dir: &Path, args: &[&str]) -> Result<(), CodeOpsError> {
    run_git_output(work_dir, args).await.map(|_| ())
}

/// Runs a git command and returns its combined output.
async fn run_git_output(work_dir: &Path, args: &[&str]) -> Result<String, CodeOpsError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(work_dir)
        .args(args)
        .output()
        .await
        .map_err(|err| CodeOpsError::Git(format!("git {}: {err}", args.join(" "))))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(CodeOpsError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(format!("{stdout}{stderr}"))
}
