// toolhub-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Helpers
// Description: Stub collaborators and dispatcher fixtures for transports.
// Purpose: Drive dispatcher, HTTP, and MCP tests without external systems.
// Dependencies: toolhub-server, toolhub-core, async-trait, tempfile
// ============================================================================

//! ## Overview
//! Builds a full dispatcher over the in-memory audit store with scripted
//! collaborators: the forge can fail selected calls, QA replays a scripted
//! outcome sequence, and the code stub records invocations.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tempfile::TempDir;
use toolhub_core::ArtifactStore;
use toolhub_core::AuditService;
use toolhub_core::AuditStore;
use toolhub_core::CodeChangeRequest;
use toolhub_core::CodeChangeResult;
use toolhub_core::CodeOpsError;
use toolhub_core::CodeRunner;
use toolhub_core::CreateIssueInput;
use toolhub_core::CreatePullRequestInput;
use toolhub_core::ForgeClient;
use toolhub_core::ForgeError;
use toolhub_core::InMemoryAuditStore;
use toolhub_core::Issue;
use toolhub_core::Policy;
use toolhub_core::PrComment;
use toolhub_core::PullRequest;
use toolhub_core::PullRequestFile;
use toolhub_core::QaError;
use toolhub_core::QaExecutor;
use toolhub_core::QaKind;
use toolhub_core::QaOutcome;
use toolhub_core::QaReport;
use toolhub_core::RepoName;
use toolhub_core::RunService;
use toolhub_core::batch::BatchMode;
use toolhub_core::interfaces::BranchRef;
use toolhub_server::BuildInfo;
use toolhub_server::ToolDispatcher;
use toolhub_server::ToolDispatcherConfig;

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Dispatcher fixture over the in-memory store.
pub struct Fixture {
    /// Dispatcher under test.
    pub dispatcher: Arc<ToolDispatcher>,
    /// Shared store handle for direct assertions.
    pub store: Arc<InMemoryAuditStore>,
    /// Scripted forge handle.
    pub forge: Arc<StubForge>,
    /// Scripted QA handle.
    pub qa: Arc<StubQa>,
    /// Recording code runner handle.
    pub code: Arc<StubCode>,
    /// Artifact blob directory; dropped with the fixture.
    pub temp: TempDir,
}

/// Builds a dispatcher fixture with every tool allowed.
pub fn fixture(mode: BatchMode) -> Fixture {
    fixture_with(mode, StubForge::default(), StubQa::passing())
}

/// Builds a dispatcher fixture with custom forge and QA stubs.
pub fn fixture_with(mode: BatchMode, forge: StubForge, qa: StubQa) -> Fixture {
    let store = Arc::new(InMemoryAuditStore::new());
    let shared: Arc<dyn AuditStore> = store.clone();
    let temp = TempDir::new().expect("artifact dir");
    let mut policy = Policy::new(
        "octo/demo",
        "runs.create,github.issues.create,github.issues.batch_create,\
         github.pr.comment.create,github.pr.get,github.pr.files.list,qa.test,qa.lint,\
         code.patch.generate,code.branch_pr.create,code.repair_loop",
    );
    policy.set_path_policy("", "db/init/");
    let policy = Arc::new(policy);

    let artifacts =
        ArtifactStore::new(Arc::clone(&shared), temp.path().to_path_buf()).expect("store init");
    let audit = AuditService::new(Arc::clone(&shared), artifacts, Arc::clone(&policy));
    let runs = RunService::new(Arc::clone(&shared));

    let forge = Arc::new(forge);
    let qa = Arc::new(qa);
    let code = Arc::new(StubCode::default());
    let dispatcher = Arc::new(ToolDispatcher::new(ToolDispatcherConfig {
        runs,
        audit,
        policy,
        forge: Arc::clone(&forge) as Arc<dyn ForgeClient>,
        qa: Arc::clone(&qa) as Arc<dyn QaExecutor>,
        code: Arc::clone(&code) as Arc<dyn CodeRunner>,
        batch_mode: mode,
        repair_max_iterations: 3,
    }));
    Fixture {
        dispatcher,
        store,
        forge,
        qa,
        code,
        temp,
    }
}

/// Build metadata used by transport fixtures.
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: "0.1.0".to_string(),
        git_commit: "deadbeef".to_string(),
        build_time: "2026-01-01T00:00:00Z".to_string(),
        contract_version: toolhub_core::CONTRACT_VERSION.to_string(),
    }
}

// ============================================================================
// SECTION: Forge Stub
// ============================================================================

/// Scripted forge collaborator.
#[derive(Default)]
pub struct StubForge {
    /// Issue creation calls (by order) that fail with HTTP 422.
    pub fail_issue_calls: BTreeSet<usize>,
    /// Issue creation call counter.
    pub issue_calls: AtomicUsize,
    /// PR creation call counter.
    pub pr_calls: AtomicUsize,
}

impl StubForge {
    /// Builds a forge failing the given issue calls (zero-based order).
    pub fn failing(indices: &[usize]) -> Self {
        Self {
            fail_issue_calls: indices.iter().copied().collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ForgeClient for StubForge {
    async fn create_issue(
        &self,
        _repo: &RepoName,
        input: CreateIssueInput,
    ) -> Result<Issue, ForgeError> {
        let call = self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_issue_calls.contains(&call) {
            return Err(ForgeError::Api {
                operation: "create issue".to_string(),
                status: 422,
                body: format!("rejected {:?}", input.title),
            });
        }
        Ok(Issue {
            number: 100 + call as u64,
            title: input.title,
            html_url: format!("https://example.test/issues/{}", 100 + call),
        })
    }

    async fn create_pr_comment(
        &self,
        _repo: &RepoName,
        pr_number: u64,
        body: &str,
    ) -> Result<PrComment, ForgeError> {
        Ok(PrComment {
            id: 1,
            body: body.to_string(),
            html_url: format!("https://example.test/pull/{pr_number}#comment-1"),
        })
    }

    async fn get_pull_request(
        &self,
        _repo: &RepoName,
        pr_number: u64,
    ) -> Result<PullRequest, ForgeError> {
        Ok(sample_pull_request(pr_number))
    }

    async fn list_pull_request_files(
        &self,
        _repo: &RepoName,
        _pr_number: u64,
    ) -> Result<Vec<PullRequestFile>, ForgeError> {
        Ok(vec![PullRequestFile {
            filename: "src/lib.rs".to_string(),
            status: "modified".to_string(),
            additions: 3,
            deletions: 1,
            changes: 4,
            blob_url: "https://example.test/blob".to_string(),
            raw_url: "https://example.test/raw".to_string(),
            patch: None,
            previous_filename: None,
        }])
    }

    async fn create_pull_request(
        &self,
        _repo: &RepoName,
        input: CreatePullRequestInput,
    ) -> Result<PullRequest, ForgeError> {
        self.pr_calls.fetch_add(1, Ordering::SeqCst);
        let mut pull_request = sample_pull_request(42);
        pull_request.title = input.title;
        Ok(pull_request)
    }
}

/// Builds a sample pull request response.
pub fn sample_pull_request(number: u64) -> PullRequest {
    PullRequest {
        number,
        title: format!("pr {number}"),
        state: "open".to_string(),
        draft: false,
        html_url: format!("https://example.test/pull/{number}"),
        merged: false,
        mergeable: Some(true),
        base: BranchRef {
            branch: "main".to_string(),
        },
        head: BranchRef {
            branch: "fix".to_string(),
        },
    }
}

// ============================================================================
// SECTION: QA Stub
// ============================================================================

/// One scripted QA outcome.
#[derive(Clone)]
pub enum ScriptedQa {
    /// Command passed.
    Pass,
    /// Command exited non-zero.
    Fail,
    /// Command timed out.
    Timeout,
}

/// QA collaborator replaying a scripted outcome sequence.
pub struct StubQa {
    /// Remaining scripted outcomes; the last entry repeats.
    script: Mutex<Vec<ScriptedQa>>,
    /// Total run invocations.
    pub calls: AtomicUsize,
}

impl StubQa {
    /// Builds a stub replaying the script in order.
    pub fn new(script: Vec<ScriptedQa>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Builds a stub that always passes.
    pub fn passing() -> Self {
        Self::new(vec![ScriptedQa::Pass])
    }

    /// Builds a stub that always fails.
    pub fn failing() -> Self {
        Self::new(vec![ScriptedQa::Fail])
    }
}

#[async_trait]
impl QaExecutor for StubQa {
    async fn run(&self, kind: QaKind, dry_run: bool) -> Result<QaOutcome, QaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let step = if script.len() > 1 { script.remove(0) } else { script[0].clone() };
        drop(script);

        let mut report = QaReport {
            command: format!("stub {kind}"),
            work_dir: "/work".to_string(),
            output_limit_bytes: 1024,
            ..QaReport::default()
        };
        if dry_run {
            return Ok(QaOutcome {
                report,
                error: None,
            });
        }
        match step {
            ScriptedQa::Pass => Ok(QaOutcome {
                report,
                error: None,
            }),
            ScriptedQa::Fail => {
                report.exit_code = 1;
                Ok(QaOutcome {
                    report,
                    error: Some(QaError::new(
                        toolhub_core::QaErrorCode::ExecutionFailed,
                        "qa command failed with exit code 1",
                    )),
                })
            }
            ScriptedQa::Timeout => {
                report.exit_code = -1;
                Ok(QaOutcome {
                    report,
                    error: Some(QaError::new(
                        toolhub_core::QaErrorCode::Timeout,
                        "qa command timed out",
                    )),
                })
            }
        }
    }
}

// ============================================================================
// SECTION: Code Stub
// ============================================================================

/// Git collaborator that records invocations.
#[derive(Default)]
pub struct StubCode {
    /// Execute invocation counter.
    pub execute_calls: AtomicUsize,
    /// Rollback invocation counter.
    pub rollback_calls: AtomicUsize,
}

#[async_trait]
impl CodeRunner for StubCode {
    async fn execute(&self, request: &CodeChangeRequest) -> Result<CodeChangeResult, CodeOpsError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CodeChangeResult {
            planned_commands: vec![
                format!("git checkout {:?}", request.base_branch),
                format!("git checkout -b {:?}", request.head_branch),
            ],
            commit_hash: if request.dry_run { None } else { Some("abc123".to_string()) },
        })
    }

    async fn rollback(
        &self,
        base_branch: &str,
        head_branch: &str,
        _dry_run: bool,
    ) -> Result<CodeChangeResult, CodeOpsError> {
        self.rollback_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CodeChangeResult {
            planned_commands: vec![
                format!("git checkout {base_branch:?}"),
                format!("git branch -D {head_branch:?}"),
            ],
            commit_hash: None,
        })
    }
}
