// toolhub-cli/src/main.rs
// ============================================================================
// Module: ToolHub CLI Entry Point
// Description: Startup wiring for the ToolHub gateway.
// Purpose: Load config, build collaborators, and serve both transports.
// Dependencies: clap, tokio, toolhub-*
// ============================================================================

//! ## Overview
//! `toolhub serve` loads environment configuration, opens the SQLite audit
//! store and the artifact directory, wires the GitHub, QA, and git
//! collaborators into one dispatcher, and serves the HTTP API and the MCP
//! socket until interrupted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use toolhub_codeops::GitRunner;
use toolhub_codeops::GitRunnerConfig;
use toolhub_core::ArtifactStore;
use toolhub_core::AuditService;
use toolhub_core::AuditStore;
use toolhub_core::CONTRACT_VERSION;
use toolhub_core::Policy;
use toolhub_core::RunService;
use toolhub_github::GithubClient;
use toolhub_github::GithubClientConfig;
use toolhub_qa::QaBackend;
use toolhub_qa::QaRunner;
use toolhub_qa::QaRunnerConfig;
use toolhub_qa::SandboxConfig;
use toolhub_server::BuildInfo;
use toolhub_server::McpServer;
use toolhub_server::ServerConfig;
use toolhub_server::StderrLogSink;
use toolhub_server::ToolDispatcher;
use toolhub_server::ToolDispatcherConfig;
use toolhub_server::build_router;
use toolhub_server::logging::RequestLogSink;
use toolhub_store_sqlite::SqliteAuditStore;
use toolhub_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "toolhub", version, about = "Controlled tool gateway for AI agents")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API and the MCP socket.
    Serve,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => match serve() {
            Ok(()) => ExitCode::SUCCESS,
            Err(message) => {
                eprintln!("toolhub: {message}");
                ExitCode::FAILURE
            }
        },
    }
}

/// Builds the runtime and serves until interrupted.
fn serve() -> Result<(), String> {
    let config = ServerConfig::from_env().map_err(|err| err.to_string())?;

    let store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&SqliteStoreConfig::new(config.database_path.clone()))
            .map_err(|err| err.to_string())?,
    );
    let mut policy = Policy::new(&config.repo_allowlist, &config.tool_allowlist);
    policy.set_path_policy(&config.forbidden_prefixes, &config.approval_prefixes);
    let policy = Arc::new(policy);

    let artifacts = ArtifactStore::new(Arc::clone(&store), config.artifacts_dir.clone())
        .map_err(|err| err.to_string())?;
    let audit = AuditService::new(Arc::clone(&store), artifacts, Arc::clone(&policy));
    let runs = RunService::new(Arc::clone(&store));

    let github_settings =
        config.github.as_ref().ok_or("GITHUB_APP_ID is required".to_string())?;
    let forge = Arc::new(
        GithubClient::new(GithubClientConfig::new(
            github_settings.app_id,
            github_settings.installation_id,
            github_settings.private_key_path.clone(),
        ))
        .map_err(|err| err.to_string())?,
    );

    let backend = QaBackend::parse(&config.qa.backend).map_err(|err| err.to_string())?;
    let qa = Arc::new(
        QaRunner::new(QaRunnerConfig {
            work_dir: config.qa.work_dir.clone(),
            test_cmd: config.qa.test_cmd.clone(),
            lint_cmd: config.qa.lint_cmd.clone(),
            timeout: config.qa.timeout,
            max_output_bytes: config.qa.max_output_bytes,
            max_concurrency: config.qa.max_concurrency,
            backend,
            sandbox: SandboxConfig {
                image: config.qa.sandbox_image.clone(),
                docker_binary: config.qa.sandbox_docker_bin.clone(),
                container_work_dir: config.qa.sandbox_container_workdir.clone(),
                timeout: config.qa.timeout,
                max_output_bytes: config.qa.max_output_bytes,
            },
            allowed_executables: config.qa.allowed_executables.clone(),
        })
        .map_err(|err| err.to_string())?,
    );

    let code = Arc::new(GitRunner::new(GitRunnerConfig {
        work_dir: config.code.work_dir.clone(),
        remote: config.code.remote.clone(),
    }));

    let dispatcher = Arc::new(ToolDispatcher::new(ToolDispatcherConfig {
        runs,
        audit,
        policy,
        forge,
        qa,
        code,
        batch_mode: config.batch_mode,
        repair_max_iterations: config.repair_max_iterations,
    }));

    let build = BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_commit: option_env!("TOOLHUB_GIT_COMMIT").unwrap_or_default().to_string(),
        build_time: option_env!("TOOLHUB_BUILD_TIME").unwrap_or_default().to_string(),
        contract_version: CONTRACT_VERSION.to_string(),
    };
    let log: Arc<dyn RequestLogSink> = Arc::new(StderrLogSink);

    let runtime = tokio::runtime::Runtime::new().map_err(|err| err.to_string())?;
    runtime.block_on(async move {
        let http_listener = tokio::net::TcpListener::bind(&config.http_addr)
            .await
            .map_err(|err| format!("http bind {}: {err}", config.http_addr))?;
        let mcp_listener = tokio::net::TcpListener::bind(&config.mcp_addr)
            .await
            .map_err(|err| format!("mcp bind {}: {err}", config.mcp_addr))?;

        let router = build_router(Arc::clone(&dispatcher), build, Arc::clone(&log));
        let mcp = Arc::new(McpServer::new(dispatcher, log));

        tokio::select! {
            result = axum::serve(http_listener, router) => {
                result.map_err(|err| format!("http server failed: {err}"))
            }
            result = mcp.serve(mcp_listener) => {
                result.map_err(|err| format!("mcp server failed: {err}"))
            }
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
