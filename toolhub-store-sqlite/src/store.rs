// toolhub-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Audit Store
// Description: Durable AuditStore backed by SQLite WAL.
// Purpose: Persist runs, artifacts, tool calls, steps, decisions, approvals.
// Dependencies: toolhub-core, rusqlite, chrono, thiserror
// ============================================================================

//! ## Overview
//! One connection guarded by a mutex serves all queries; atomicity comes from
//! single-row inserts. The unique partial index over
//! `(run_id, tool_name, idempotency_key)` for `ok` rows makes concurrent
//! duplicate inserts lose deterministically: the loser observes a conflict
//! and re-probes for the winner's row. Timestamps are stored as RFC 3339
//! text with fixed precision so string comparison orders correctly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use thiserror::Error;
use toolhub_core::ApprovalId;
use toolhub_core::ApprovalRecord;
use toolhub_core::ApprovalStatus;
use toolhub_core::ArtifactId;
use toolhub_core::ArtifactRecord;
use toolhub_core::AuditStore;
use toolhub_core::CallStatus;
use toolhub_core::DecisionId;
use toolhub_core::DecisionRecord;
use toolhub_core::RepoName;
use toolhub_core::RunId;
use toolhub_core::RunRecord;
use toolhub_core::StepId;
use toolhub_core::StepRecord;
use toolhub_core::StepStatus;
use toolhub_core::StoreError;
use toolhub_core::ToolCallFilter;
use toolhub_core::ToolCallId;
use toolhub_core::ToolCallRecord;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Ordered schema migrations applied at startup.
const MIGRATIONS: [(&str, &str); 1] = [(
    "001_init",
    "CREATE TABLE IF NOT EXISTS runs (
        run_id TEXT PRIMARY KEY,
        repo TEXT NOT NULL,
        purpose TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS artifacts (
        artifact_id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        name TEXT NOT NULL,
        uri TEXT NOT NULL,
        sha256 TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        content_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_artifacts_run_id ON artifacts (run_id);
    CREATE TABLE IF NOT EXISTS tool_calls (
        tool_call_id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        tool_name TEXT NOT NULL,
        idempotency_key TEXT,
        status TEXT NOT NULL,
        request_artifact_id TEXT,
        response_artifact_id TEXT,
        evidence_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tool_calls_run_id ON tool_calls (run_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_tool_calls_idempotency
        ON tool_calls (run_id, tool_name, idempotency_key)
        WHERE status = 'ok' AND idempotency_key IS NOT NULL;
    CREATE TABLE IF NOT EXISTS steps (
        step_id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        name TEXT NOT NULL,
        step_type TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT,
        finished_at TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS decisions (
        decision_id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        step_id TEXT,
        actor TEXT NOT NULL,
        decision_type TEXT NOT NULL,
        payload_artifact_id TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_decisions_run_id ON decisions (run_id);
    CREATE TABLE IF NOT EXISTS approvals (
        approval_id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL REFERENCES runs(run_id),
        scope TEXT NOT NULL,
        status TEXT NOT NULL,
        requested_at TEXT NOT NULL,
        approved_at TEXT,
        approver TEXT,
        created_at TEXT NOT NULL
    );",
)];

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` audit store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a config with default timeouts.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid stored data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed audit store.
pub struct SqliteAuditStore {
    /// Shared connection guarded by a mutex.
    connection: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Opens the store, applying pragmas and pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// migrated.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&config.path, flags)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = wal; PRAGMA synchronous = full;")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let store = Self {
            connection: Mutex::new(connection),
        };
        store.apply_migrations()?;
        Ok(store)
    }

    /// Applies pending schema migrations inside a transaction each.
    fn apply_migrations(&self) -> Result<(), SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        guard
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version TEXT PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        for (version, sql) in MIGRATIONS {
            let applied: Option<String> = guard
                .query_row(
                    "SELECT version FROM schema_migrations WHERE version = ?1",
                    params![version],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if applied.is_some() {
                continue;
            }
            let tx = guard.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(sql).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, format_time(Utc::now())],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Ok(())
    }

    /// Runs a closure against the locked connection.
    fn with_connection<T>(
        &self,
        run: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard =
            self.connection.lock().map_err(|_| StoreError::Db("mutex poisoned".to_string()))?;
        run(&guard)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Formats a timestamp as fixed-precision RFC 3339 text.
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses RFC 3339 text back into a UTC timestamp.
fn parse_time(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| StoreError::Invalid(format!("bad timestamp {text:?}: {err}")))
}

/// Parses optional RFC 3339 text.
fn parse_opt_time(text: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    text.map(|text| parse_time(&text)).transpose()
}

/// Maps a rusqlite error, detecting constraint violations as conflicts.
fn map_sql_error(error: &rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = error
        && failure.code == rusqlite::ErrorCode::ConstraintViolation
    {
        return StoreError::Conflict(error.to_string());
    }
    StoreError::Db(error.to_string())
}

/// Maps a row into a run record.
fn row_to_run(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Builds a run record from raw columns.
fn build_run(columns: (String, String, String, String)) -> Result<RunRecord, StoreError> {
    Ok(RunRecord {
        run_id: RunId::new(columns.0),
        repo: RepoName::new(columns.1),
        purpose: columns.2,
        created_at: parse_time(&columns.3)?,
    })
}

/// Raw tool call columns.
type ToolCallColumns = (
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
);

/// Maps a row into raw tool call columns.
fn row_to_tool_call(row: &Row<'_>) -> rusqlite::Result<ToolCallColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

/// Builds a tool call record from raw columns.
fn build_tool_call(columns: ToolCallColumns) -> Result<ToolCallRecord, StoreError> {
    let status = CallStatus::parse(&columns.4)
        .ok_or_else(|| StoreError::Invalid(format!("bad tool call status {:?}", columns.4)))?;
    Ok(ToolCallRecord {
        tool_call_id: ToolCallId::new(columns.0),
        run_id: RunId::new(columns.1),
        tool_name: columns.2,
        idempotency_key: columns.3,
        status,
        request_artifact_id: columns.5.map(ArtifactId::new),
        response_artifact_id: columns.6.map(ArtifactId::new),
        evidence_hash: columns.7,
        created_at: parse_time(&columns.8)?,
    })
}

/// SELECT column list shared by tool call queries.
const TOOL_CALL_COLUMNS: &str = "tool_call_id, run_id, tool_name, idempotency_key, status, \
                                 request_artifact_id, response_artifact_id, evidence_hash, \
                                 created_at";

// ============================================================================
// SECTION: AuditStore Implementation
// ============================================================================

impl AuditStore for SqliteAuditStore {
    fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO runs (run_id, repo, purpose, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    run.run_id.as_str(),
                    run.repo.as_str(),
                    run.purpose,
                    format_time(run.created_at)
                ],
            )
            .map_err(|err| map_sql_error(&err))?;
            Ok(())
        })
    }

    fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT run_id, repo, purpose, created_at FROM runs WHERE run_id = ?1",
                params![run_id.as_str()],
                row_to_run,
            )
            .optional()
            .map_err(|err| map_sql_error(&err))?
            .map(build_run)
            .transpose()
        })
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT run_id, repo, purpose, created_at FROM runs ORDER BY created_at DESC \
                     LIMIT ?1",
                )
                .map_err(|err| map_sql_error(&err))?;
            let rows = statement
                .query_map(params![limit as i64], row_to_run)
                .map_err(|err| map_sql_error(&err))?;
            let mut runs = Vec::new();
            for row in rows {
                runs.push(build_run(row.map_err(|err| map_sql_error(&err))?)?);
            }
            Ok(runs)
        })
    }

    fn insert_artifact(&self, artifact: &ArtifactRecord) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO artifacts (artifact_id, run_id, name, uri, sha256, size_bytes, \
                 content_type, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    artifact.artifact_id.as_str(),
                    artifact.run_id.as_str(),
                    artifact.name,
                    artifact.uri,
                    artifact.sha256,
                    artifact.size_bytes as i64,
                    artifact.content_type,
                    format_time(artifact.created_at)
                ],
            )
            .map_err(|err| map_sql_error(&err))?;
            Ok(())
        })
    }

    fn get_artifact(&self, artifact_id: &ArtifactId) -> Result<Option<ArtifactRecord>, StoreError> {
        self.with_connection(|conn| {
            query_artifact(
                conn,
                "SELECT artifact_id, run_id, name, uri, sha256, size_bytes, content_type, \
                 created_at FROM artifacts WHERE artifact_id = ?1",
                params![artifact_id.as_str()],
            )
        })
    }

    fn get_artifact_by_run(
        &self,
        run_id: &RunId,
        artifact_id: &ArtifactId,
    ) -> Result<Option<ArtifactRecord>, StoreError> {
        self.with_connection(|conn| {
            query_artifact(
                conn,
                "SELECT artifact_id, run_id, name, uri, sha256, size_bytes, content_type, \
                 created_at FROM artifacts WHERE run_id = ?1 AND artifact_id = ?2",
                params![run_id.as_str(), artifact_id.as_str()],
            )
        })
    }

    fn list_artifacts_by_run(&self, run_id: &RunId) -> Result<Vec<ArtifactRecord>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT artifact_id, run_id, name, uri, sha256, size_bytes, content_type, \
                     created_at FROM artifacts WHERE run_id = ?1 ORDER BY created_at",
                )
                .map_err(|err| map_sql_error(&err))?;
            let rows = statement
                .query_map(params![run_id.as_str()], row_to_artifact)
                .map_err(|err| map_sql_error(&err))?;
            let mut artifacts = Vec::new();
            for row in rows {
                artifacts.push(build_artifact(row.map_err(|err| map_sql_error(&err))?)?);
            }
            Ok(artifacts)
        })
    }

    fn insert_tool_call(&self, tool_call: &ToolCallRecord) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO tool_calls (tool_call_id, run_id, tool_name, idempotency_key, \
                 status, request_artifact_id, response_artifact_id, evidence_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    tool_call.tool_call_id.as_str(),
                    tool_call.run_id.as_str(),
                    tool_call.tool_name,
                    tool_call.idempotency_key,
                    tool_call.status.as_str(),
                    tool_call.request_artifact_id.as_ref().map(ArtifactId::as_str),
                    tool_call.response_artifact_id.as_ref().map(ArtifactId::as_str),
                    tool_call.evidence_hash,
                    format_time(tool_call.created_at)
                ],
            )
            .map_err(|err| map_sql_error(&err))?;
            Ok(())
        })
    }

    fn find_replayable_tool_call(
        &self,
        run_id: &RunId,
        tool_name: &str,
        idempotency_key: &str,
    ) -> Result<Option<ToolCallRecord>, StoreError> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {TOOL_CALL_COLUMNS} FROM tool_calls WHERE run_id = ?1 AND tool_name \
                     = ?2 AND idempotency_key = ?3 AND status = 'ok' ORDER BY created_at DESC \
                     LIMIT 1"
                ),
                params![run_id.as_str(), tool_name, idempotency_key],
                row_to_tool_call,
            )
            .optional()
            .map_err(|err| map_sql_error(&err))?
            .map(build_tool_call)
            .transpose()
        })
    }

    fn list_tool_calls_by_run(
        &self,
        run_id: &RunId,
        filter: &ToolCallFilter,
    ) -> Result<Vec<ToolCallRecord>, StoreError> {
        self.with_connection(|conn| {
            let mut sql =
                format!("SELECT {TOOL_CALL_COLUMNS} FROM tool_calls WHERE run_id = ?1");
            let mut args: Vec<String> = vec![run_id.as_str().to_string()];
            if let Some(status) = filter.status {
                args.push(status.as_str().to_string());
                sql.push_str(&format!(" AND status = ?{}", args.len()));
            }
            if let Some(tool_name) = &filter.tool_name {
                args.push(tool_name.clone());
                sql.push_str(&format!(" AND tool_name = ?{}", args.len()));
            }
            if let Some(after) = filter.created_after {
                args.push(format_time(after));
                sql.push_str(&format!(" AND created_at > ?{}", args.len()));
            }
            if let Some(before) = filter.created_before {
                args.push(format_time(before));
                sql.push_str(&format!(" AND created_at < ?{}", args.len()));
            }
            sql.push_str(" ORDER BY created_at");

            let mut statement = conn.prepare(&sql).map_err(|err| map_sql_error(&err))?;
            let rows = statement
                .query_map(rusqlite::params_from_iter(args.iter()), row_to_tool_call)
                .map_err(|err| map_sql_error(&err))?;
            let mut calls = Vec::new();
            for row in rows {
                calls.push(build_tool_call(row.map_err(|err| map_sql_error(&err))?)?);
            }
            Ok(calls)
        })
    }

    fn insert_step(&self, step: &StepRecord) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO steps (step_id, run_id, name, step_type, status, started_at, \
                 finished_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    step.step_id.as_str(),
                    step.run_id.as_str(),
                    step.name,
                    step.step_type,
                    step.status.as_str(),
                    step.started_at.map(format_time),
                    step.finished_at.map(format_time),
                    format_time(step.created_at)
                ],
            )
            .map_err(|err| map_sql_error(&err))?;
            Ok(())
        })
    }

    fn update_step_status(
        &self,
        step_id: &StepId,
        status: StepStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE steps SET status = ?2, finished_at = ?3 WHERE step_id = ?1",
                params![step_id.as_str(), status.as_str(), finished_at.map(format_time)],
            )
            .map_err(|err| map_sql_error(&err))?;
            Ok(())
        })
    }

    fn list_steps_by_run(&self, run_id: &RunId) -> Result<Vec<StepRecord>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT step_id, run_id, name, step_type, status, started_at, finished_at, \
                     created_at FROM steps WHERE run_id = ?1 ORDER BY created_at",
                )
                .map_err(|err| map_sql_error(&err))?;
            let rows = statement
                .query_map(params![run_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                })
                .map_err(|err| map_sql_error(&err))?;
            let mut steps = Vec::new();
            for row in rows {
                let columns = row.map_err(|err| map_sql_error(&err))?;
                let status = StepStatus::parse(&columns.4).ok_or_else(|| {
                    StoreError::Invalid(format!("bad step status {:?}", columns.4))
                })?;
                steps.push(StepRecord {
                    step_id: StepId::new(columns.0),
                    run_id: RunId::new(columns.1),
                    name: columns.2,
                    step_type: columns.3,
                    status,
                    started_at: parse_opt_time(columns.5)?,
                    finished_at: parse_opt_time(columns.6)?,
                    created_at: parse_time(&columns.7)?,
                });
            }
            Ok(steps)
        })
    }

    fn insert_decision(&self, decision: &DecisionRecord) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO decisions (decision_id, run_id, step_id, actor, decision_type, \
                 payload_artifact_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    decision.decision_id.as_str(),
                    decision.run_id.as_str(),
                    decision.step_id.as_ref().map(StepId::as_str),
                    decision.actor,
                    decision.decision_type,
                    decision.payload_artifact_id.as_ref().map(ArtifactId::as_str),
                    format_time(decision.created_at)
                ],
            )
            .map_err(|err| map_sql_error(&err))?;
            Ok(())
        })
    }

    fn list_decisions_by_run(&self, run_id: &RunId) -> Result<Vec<DecisionRecord>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT decision_id, run_id, step_id, actor, decision_type, \
                     payload_artifact_id, created_at FROM decisions WHERE run_id = ?1 ORDER BY \
                     created_at",
                )
                .map_err(|err| map_sql_error(&err))?;
            let rows = statement
                .query_map(params![run_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })
                .map_err(|err| map_sql_error(&err))?;
            let mut decisions = Vec::new();
            for row in rows {
                let columns = row.map_err(|err| map_sql_error(&err))?;
                decisions.push(DecisionRecord {
                    decision_id: DecisionId::new(columns.0),
                    run_id: RunId::new(columns.1),
                    step_id: columns.2.map(StepId::new),
                    actor: columns.3,
                    decision_type: columns.4,
                    payload_artifact_id: columns.5.map(ArtifactId::new),
                    created_at: parse_time(&columns.6)?,
                });
            }
            Ok(decisions)
        })
    }

    fn insert_approval(&self, approval: &ApprovalRecord) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO approvals (approval_id, run_id, scope, status, requested_at, \
                 approved_at, approver, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    approval.approval_id.as_str(),
                    approval.run_id.as_str(),
                    approval.scope,
                    approval.status.as_str(),
                    format_time(approval.requested_at),
                    approval.approved_at.map(format_time),
                    approval.approver,
                    format_time(approval.created_at)
                ],
            )
            .map_err(|err| map_sql_error(&err))?;
            Ok(())
        })
    }

    fn get_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Option<ApprovalRecord>, StoreError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT approval_id, run_id, scope, status, requested_at, approved_at, approver, \
                 created_at FROM approvals WHERE approval_id = ?1",
                params![approval_id.as_str()],
                row_to_approval,
            )
            .optional()
            .map_err(|err| map_sql_error(&err))?
            .map(build_approval)
            .transpose()
        })
    }

    fn list_approvals_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRecord>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT approval_id, run_id, scope, status, requested_at, approved_at, \
                     approver, created_at FROM approvals WHERE run_id = ?1 ORDER BY created_at",
                )
                .map_err(|err| map_sql_error(&err))?;
            let rows = statement
                .query_map(params![run_id.as_str()], row_to_approval)
                .map_err(|err| map_sql_error(&err))?;
            let mut approvals = Vec::new();
            for row in rows {
                approvals.push(build_approval(row.map_err(|err| map_sql_error(&err))?)?);
            }
            Ok(approvals)
        })
    }

    fn update_approval_decision(
        &self,
        approval_id: &ApprovalId,
        status: ApprovalStatus,
        approved_at: DateTime<Utc>,
        approver: &str,
    ) -> Result<bool, StoreError> {
        self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE approvals SET status = ?2, approved_at = ?3, approver = ?4 WHERE \
                     approval_id = ?1 AND status = 'requested'",
                    params![
                        approval_id.as_str(),
                        status.as_str(),
                        format_time(approved_at),
                        approver
                    ],
                )
                .map_err(|err| map_sql_error(&err))?;
            Ok(updated > 0)
        })
    }
}

// ============================================================================
// SECTION: Query Helpers
// ============================================================================

/// Raw artifact columns.
type ArtifactColumns = (String, String, String, String, String, i64, String, String);

/// Maps a row into raw artifact columns.
fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<ArtifactColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

/// Builds an artifact record from raw columns.
fn build_artifact(columns: ArtifactColumns) -> Result<ArtifactRecord, StoreError> {
    let size_bytes = u64::try_from(columns.5)
        .map_err(|_| StoreError::Invalid("negative artifact size".to_string()))?;
    Ok(ArtifactRecord {
        artifact_id: ArtifactId::new(columns.0),
        run_id: RunId::new(columns.1),
        name: columns.2,
        uri: columns.3,
        sha256: columns.4,
        size_bytes,
        content_type: columns.6,
        created_at: parse_time(&columns.7)?,
    })
}

/// Runs a single-row artifact query.
fn query_artifact(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Option<ArtifactRecord>, StoreError> {
    conn.query_row(sql, args, row_to_artifact)
        .optional()
        .map_err(|err| map_sql_error(&err))?
        .map(build_artifact)
        .transpose()
}

/// Raw approval columns.
type ApprovalColumns = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

/// Maps a row into raw approval columns.
fn row_to_approval(row: &Row<'_>) -> rusqlite::Result<ApprovalColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

/// Builds an approval record from raw columns.
fn build_approval(columns: ApprovalColumns) -> Result<ApprovalRecord, StoreError> {
    let status = ApprovalStatus::parse(&columns.3)
        .ok_or_else(|| StoreError::Invalid(format!("bad approval status {:?}", columns.3)))?;
    Ok(ApprovalRecord {
        approval_id: ApprovalId::new(columns.0),
        run_id: RunId::new(columns.1),
        scope: columns.2,
        status,
        requested_at: parse_time(&columns.4)?,
        approved_at: parse_opt_time(columns.5)?,
        approver: columns.6,
        created_at: parse_time(&columns.7)?,
    })
}
